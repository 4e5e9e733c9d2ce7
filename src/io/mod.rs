//! Auxiliary-input readers and output writers

pub mod tide_model;
pub mod vector_output;

pub use tide_model::{retry_with_backoff, TideModelGrid, TideModelReader};
pub use vector_output::VectorWriter;
