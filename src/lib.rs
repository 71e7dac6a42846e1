pub mod client;
pub mod error;
pub mod integration;
pub mod llm;
pub mod messages;
pub mod resilience;
pub mod speech;
pub mod ui;

pub use error::{Result, TessaError};
