pub mod context;
pub mod step;
pub mod engine;
pub mod definition;

pub use context::{WorkflowContext, WorkflowStatus, WorkflowStepRecord};
pub use definition::{StepDefinition, WorkflowDefinition, MAX_STEP_TIMEOUT_SECS};
pub use engine::{Workflow, WorkflowResult};
pub use step::{interpolate, AgentStep, FnStep, StepInput, StepLogic, StepOutput, WorkflowStep};
