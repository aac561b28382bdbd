pub mod error;
pub mod failure;

pub use error::ExecError;
pub use failure::FailureTracker;
