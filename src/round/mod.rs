pub mod error;
pub mod round;
pub mod round_model;
