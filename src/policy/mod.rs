//! Policy Module
//!
//! The single `execute` entry point and the five request-serving strategies.

mod engine;
mod response;

pub use engine::PolicyEngine;
pub use response::{EngineResponse, ResponseSource};
