//! The classified result of one execution.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Returned in place of empty output for a successful script.
pub const NO_OUTPUT_MARKER: &str = "Code executed successfully but produced no output";

/// Returned when the caller cancels an execution.
pub const CANCELLED_MESSAGE: &str = "Code execution was cancelled";

/// Outcome of [`Sandbox::execute`](crate::Sandbox::execute).
///
/// Every call produces exactly one variant. Output captured before a timeout
/// or failure is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    /// The script ran to completion.
    Success {
        /// Everything the script printed, or [`NO_OUTPUT_MARKER`].
        output: String,
    },
    /// The script did not finish within the configured deadline.
    TimedOut {
        #[serde(rename = "timeout_ms", with = "duration_ms")]
        timeout: Duration,
    },
    /// The script raised an error, was rejected, or was cancelled.
    Failed {
        /// Description of the failure, with host paths redacted.
        error: String,
    },
}

impl ExecutionResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self::Success {
            output: output.into(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Captured output, for successful results.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Success { output } => Some(output),
            _ => None,
        }
    }

    /// Failure description, for failed results.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// The text handed back to the caller (same as `Display`).
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Seconds without a trailing `.0` for whole values: `30`, `0.25`.
pub fn format_secs(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        duration.as_secs().to_string()
    } else {
        duration.as_secs_f64().to_string()
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { output } => f.write_str(output),
            Self::TimedOut { timeout } => write!(
                f,
                "Error: Code execution timed out after {}s",
                format_secs(*timeout)
            ),
            Self::Failed { error } => write!(f, "Error executing code: {error}"),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(Duration::from_secs(30)), "30");
        assert_eq!(format_secs(Duration::from_millis(250)), "0.25");
        assert_eq!(format_secs(Duration::from_millis(1500)), "1.5");
    }

    #[test]
    fn test_display() {
        assert_eq!(ExecutionResult::success("hi\n").to_string(), "hi\n");
        assert_eq!(
            ExecutionResult::TimedOut {
                timeout: Duration::from_secs(30)
            }
            .to_string(),
            "Error: Code execution timed out after 30s"
        );
        assert_eq!(
            ExecutionResult::TimedOut {
                timeout: Duration::from_millis(1500)
            }
            .to_string(),
            "Error: Code execution timed out after 1.5s"
        );
        assert_eq!(
            ExecutionResult::failed("boom").message(),
            "Error executing code: boom"
        );
    }

    #[test]
    fn test_predicates() {
        let ok = ExecutionResult::success("x");
        assert!(ok.is_success() && !ok.is_failed() && !ok.is_timed_out());
        assert_eq!(ok.output(), Some("x"));
        assert_eq!(ok.error(), None);

        let failed = ExecutionResult::failed("bad");
        assert!(failed.is_failed());
        assert_eq!(failed.error(), Some("bad"));
    }

    #[test]
    fn test_serialization_shape() {
        let value = serde_json::to_value(ExecutionResult::TimedOut {
            timeout: Duration::from_secs(2),
        })
        .unwrap();
        assert_eq!(value, json!({"status": "timed_out", "timeout_ms": 2000}));

        let value = serde_json::to_value(ExecutionResult::success("hello\n")).unwrap();
        assert_eq!(value, json!({"status": "success", "output": "hello\n"}));

        let parsed: ExecutionResult =
            serde_json::from_value(json!({"status": "failed", "error": "x"})).unwrap();
        assert_eq!(parsed, ExecutionResult::failed("x"));
    }
}
