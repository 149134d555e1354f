// src/config/mod.rs

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{definitions_to_charts, load_and_validate};
pub use model::ChartDefinition;
