//! Sandboxed execution of short, untrusted Rhai scripts.
//!
//! A [`Sandbox`] runs a script string against a fixed capability
//! [`Allowlist`] plus a set of pre-authorized [`ServiceHandle`]s, under a
//! wall-clock deadline, with everything the script prints captured in memory.
//! Every call returns exactly one [`ExecutionResult`]: the captured text, a
//! timeout, or a failure description. Script errors never propagate as
//! host errors.
//!
//! # Security Model
//!
//! - **Allowlist**: the interpreter starts with no standard library. Only the
//!   configured [`Capability`] groups are registered; `import` and `eval` are
//!   disabled; undeclared variables fail at compile time.
//! - **Services**: the only way to reach the outside world is through the
//!   handles bound into the scope. They are constants and cannot be replaced.
//! - **Deadline**: pure computation loops are stopped by the interpreter's
//!   progress hook; a worker stuck in a blocking call is abandoned after a
//!   short grace period.
//! - **Not atomic**: service calls made before a timeout are not undone.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use corral_sandbox::{MemoryStore, Sandbox, SandboxConfig, ServiceSet};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let services = ServiceSet::new().with("kv", MemoryStore::new())?;
//!     let config = SandboxConfig::default().with_timeout(Duration::from_secs(5));
//!     let sandbox = Sandbox::new(config, services)?;
//!
//!     let result = sandbox
//!         .execute(r#"kv.set(#{ key: "n", value: 41 }); print(kv.get("n") + 1);"#)
//!         .await;
//!     println!("{result}");
//!
//!     Ok(())
//! }
//! ```

mod allowlist;
mod capture;
mod config;
mod deadline;
mod engine;
mod error;
mod outcome;
mod services;

pub use allowlist::{Allowlist, Capability, DISABLED_SYMBOLS, IsolatedScope, JSON_NAMESPACE};
pub use capture::{CapturedOutput, OutputCapture, OutputSink};
pub use config::{DEFAULT_ABANDON_GRACE, DEFAULT_TIMEOUT, ExecutionLimits, SandboxConfig};
pub use deadline::{Deadline, Interrupt, run_with_deadline};
pub use engine::Sandbox;
pub use error::{SandboxError, SandboxResult, ServiceError};
pub use outcome::{CANCELLED_MESSAGE, ExecutionResult, NO_OUTPUT_MARKER, format_secs};
pub use services::{
    HttpService, HttpServiceConfig, MemoryStore, Service, ServiceHandle, ServiceSet,
};
