pub mod types;
pub mod classification;
pub mod retry;

pub use types::ConductorError;
pub use classification::ErrorClassification;
pub use retry::{RetryOutcome, RetryPolicy, with_retry};
