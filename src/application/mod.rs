// Application layer - use cases and orchestration

pub mod error;
pub mod generator;
pub mod service;

pub use error::*;
pub use generator::*;
pub use service::*;
