pub mod coordinator;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod extractor;
pub mod literal;
pub mod runner;
pub mod validator;

#[cfg(test)]
mod engine_tests;

pub use coordinator::{Accepted, Coordinator, JudgeSettings};
pub use error::{ExtractionError, SubmitError, ValidationError};
pub use extractor::EntryPoint;
pub use literal::{literal_eval, parse_test_cases, LiteralError};
