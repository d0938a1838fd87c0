pub mod merger;
pub mod profile_model;
pub mod store;
