pub mod applier;
pub mod extractor;
pub mod form_model;
pub mod page;
