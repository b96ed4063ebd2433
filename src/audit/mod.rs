pub mod tracer;
pub mod jsonl;

pub use jsonl::JsonlTracer;
pub use tracer::{RecordingTracer, TraceEvent, Tracer};
