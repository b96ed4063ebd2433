pub mod truncation;

pub use truncation::{preview, truncate_error, truncate_output};
