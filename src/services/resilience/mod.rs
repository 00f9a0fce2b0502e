pub mod circuit;

pub use circuit::{CallError, CircuitBreaker, CircuitConfig, CircuitSnapshot, CircuitState};
