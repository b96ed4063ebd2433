use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The structured result every task invocation produces, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Whether the agent completed the task.
    pub success: bool,
    /// Agent output, present on success.
    pub output: Option<Map<String, Value>>,
    /// Failure description, present on failure.
    pub error: Option<String>,
    /// Execution details such as agent identity and attempt count.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Wall-clock duration of the invocation in milliseconds.
    pub execution_time_ms: u64,
}

impl TaskResult {
    pub fn succeeded(output: Map<String, Value>, metadata: Map<String, Value>, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            metadata,
            execution_time_ms,
        }
    }

    pub fn failed(error: impl Into<String>, metadata: Map<String, Value>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            metadata,
            execution_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_result_shape() {
        let result = TaskResult::failed("boom", Map::new(), 12);
        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], "boom");
        assert!(v["output"].is_null());
        assert_eq!(v["execution_time_ms"], 12);
    }

    #[test]
    fn test_metadata_defaults_to_empty() {
        let result: TaskResult = serde_json::from_value(json!({
            "success": true, "output": {"response": "ok"}, "error": null, "execution_time_ms": 3
        })).unwrap();
        assert!(result.metadata.is_empty());
        assert_eq!(result.output.unwrap()["response"], "ok");
    }
}
