pub mod task;

pub use task::TaskResult;
