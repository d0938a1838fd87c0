//! Fill web forms from a personal profile with the help of an LLM, and grow
//! that profile from filled-in forms and documents.
//!
//! A round runs Form Extractor → Prompt Builder → Model Gateway → Response
//! Parser, then either the Fill Applier (fill) or the Profile Merger (learn
//! and ingest). [`round::round::RoundRunner`] drives the whole flow.

pub mod cli;
pub mod form;
pub mod ingest;
pub mod model;
pub mod profile;
pub mod prompt;
pub mod report;
pub mod round;
pub mod trace;
