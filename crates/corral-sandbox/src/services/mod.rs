//! Pre-authorized service handles.
//!
//! A service is the only way a script can reach anything outside its own
//! memory. The host constructs each handle with its credentials already
//! applied and binds it into the script scope under a fixed name; scripts
//! cannot create handles of their own or read the credentials inside them.
//!
//! In a script a handle is used with method-call syntax:
//!
//! ```text
//! kv.set(#{ key: "count", value: 1 });
//! let count = kv.get("count");
//! let repo = github.get("/repos/rust-lang/rust");
//! let raw = github.invoke("get", "/rate_limit");
//! ```
//!
//! Arguments cross the boundary as JSON values.

mod http;
mod memory;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use rhai::{Dynamic, Engine, EvalAltResult, Position};
use serde_json::Value;
use tracing::debug;

use crate::allowlist::JSON_NAMESPACE;
use crate::deadline::Deadline;
use crate::error::{SandboxError, SandboxResult, ServiceError};

pub use http::{HttpService, HttpServiceConfig};
pub use memory::MemoryStore;

/// Words that cannot be used as handle or method names.
const RESERVED: &[&str] = &[
    "as", "async", "await", "break", "call", "case", "catch", "const", "continue", "curry",
    "debug", "default", "do", "else", "eval", "export", "false", "fn", "for", "global", "go",
    "if", "import", "in", "is_def_fn", "is_def_var", "is_shared", "let", "loop", "match",
    "module", "new", "package", "print", "private", "protected", "public", "return", "shared",
    "spawn", "static", "super", "switch", "sync", "this", "thread", "throw", "true", "try",
    "type_of", "until", "use", "var", "while", "with", "yield", "Fn",
];

/// A capability exposed to scripts through a named handle.
///
/// `call` runs on the execution's worker thread, so implementations may
/// block. Async implementations drive their futures on the current Tokio
/// runtime handle.
pub trait Service: Send + Sync {
    /// Short kind name, e.g. `memory` or `http`.
    fn kind(&self) -> &str;

    /// Method names callable from scripts.
    fn methods(&self) -> &[&'static str];

    /// Invoke `method` with JSON arguments.
    fn call(&self, method: &str, args: Value) -> Result<Value, ServiceError>;
}

/// A named, shareable service instance.
#[derive(Clone)]
pub struct ServiceHandle {
    name: Arc<str>,
    service: Arc<dyn Service>,
}

impl ServiceHandle {
    pub fn new(name: impl Into<Arc<str>>, service: Arc<dyn Service>) -> Self {
        Self {
            name: name.into(),
            service,
        }
    }

    /// Binding name in the script scope.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        self.service.kind()
    }

    pub fn methods(&self) -> &[&'static str] {
        self.service.methods()
    }

    /// Call a method, rejecting names the service does not declare.
    pub fn call(&self, method: &str, args: Value) -> Result<Value, ServiceError> {
        if !self.service.methods().contains(&method) {
            return Err(ServiceError::UnknownMethod {
                service: self.name.to_string(),
                method: method.to_string(),
            });
        }
        self.service.call(method, args)
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("name", &self.name)
            .field("kind", &self.service.kind())
            .finish()
    }
}

impl fmt::Display for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} service '{}'>", self.service.kind(), self.name)
    }
}

/// The set of handles bound into every execution.
#[derive(Debug, Clone, Default)]
pub struct ServiceSet {
    handles: BTreeMap<String, ServiceHandle>,
}

impl ServiceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service under `name`.
    pub fn insert(&mut self, name: impl Into<String>, service: Arc<dyn Service>) -> SandboxResult<()> {
        let name = name.into();
        validate_name(&name)?;
        for method in service.methods() {
            validate_method(&name, method)?;
        }
        if self.handles.contains_key(&name) {
            return Err(SandboxError::DuplicateService(name));
        }
        let handle = ServiceHandle::new(name.as_str(), service);
        self.handles.insert(name, handle);
        Ok(())
    }

    /// Builder form of [`ServiceSet::insert`].
    pub fn with(mut self, name: impl Into<String>, service: impl Service + 'static) -> SandboxResult<Self> {
        self.insert(name, Arc::new(service))?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ServiceHandle> {
        self.handles.get(name)
    }

    /// Handles in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ServiceHandle> {
        self.handles.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_name(name: &str) -> SandboxResult<()> {
    let reason = if !is_identifier(name) {
        "must be an identifier (letters, digits, underscore; not starting with a digit)"
    } else if RESERVED.contains(&name) {
        "is a reserved word"
    } else if name == JSON_NAMESPACE {
        "collides with the json namespace"
    } else {
        return Ok(());
    };
    Err(SandboxError::InvalidServiceName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

fn validate_method(service: &str, method: &str) -> SandboxResult<()> {
    if is_identifier(method) && !RESERVED.contains(&method) {
        return Ok(());
    }
    Err(SandboxError::InvalidServiceName {
        name: service.to_string(),
        reason: format!("method '{method}' cannot be called from scripts"),
    })
}

/// Register the handle type and every declared method on `engine`.
pub(crate) fn register(engine: &mut Engine, services: &ServiceSet, deadline: &Deadline) {
    if services.is_empty() {
        return;
    }

    engine.register_type_with_name::<ServiceHandle>("ServiceHandle");
    engine.register_fn("to_string", |handle: ServiceHandle| handle.to_string());

    let mut registered = BTreeSet::new();
    for handle in services.iter() {
        for &method in handle.methods() {
            if !registered.insert(method) {
                continue;
            }

            let guard = deadline.clone();
            engine.register_fn(method, move |handle: ServiceHandle| {
                dispatch(&guard, &handle, method, Dynamic::UNIT)
            });

            let guard = deadline.clone();
            engine.register_fn(method, move |handle: ServiceHandle, args: Dynamic| {
                dispatch(&guard, &handle, method, args)
            });
        }
    }

    let guard = deadline.clone();
    engine.register_fn(
        "invoke",
        move |handle: ServiceHandle, method: &str, args: Dynamic| dispatch(&guard, &handle, method, args),
    );
}

fn dispatch(
    deadline: &Deadline,
    handle: &ServiceHandle,
    method: &str,
    args: Dynamic,
) -> Result<Dynamic, Box<EvalAltResult>> {
    if deadline.should_stop() {
        return Err(Box::new(EvalAltResult::ErrorTerminated(
            Dynamic::UNIT,
            Position::NONE,
        )));
    }

    let args: Value = rhai::serde::from_dynamic(&args)?;
    debug!(service = handle.name(), kind = handle.kind(), method, "service call");

    let value = handle
        .call(method, args)
        .map_err(|e| format!("{}.{}: {}", handle.name(), method, e))?;
    if deadline.should_stop() {
        return Err(Box::new(EvalAltResult::ErrorTerminated(
            Dynamic::UNIT,
            Position::NONE,
        )));
    }
    rhai::serde::to_dynamic(value)
}
