//! The capability allowlist: everything a script is able to call.
//!
//! Scripts run on an `Engine::new_raw()` interpreter, which has no standard
//! library, no print sink and no module loading. Only the capability groups
//! selected here are registered on it, plus the configured service handles.
//! Anything else does not exist from the script's point of view: unknown
//! variables fail to compile and unknown functions fail at run time.
//!
//! `import` and `eval` are disabled outright. Dynamic module loading is the
//! classic way out of an allowlist and nothing here needs it.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rhai::packages::{
    ArithmeticPackage, BasicArrayPackage, BasicIteratorPackage, BasicMapPackage,
    BasicMathPackage, BasicStringPackage, LogicPackage, MoreStringPackage, Package,
};
use rhai::plugin::*;
use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};

use crate::capture::OutputSink;
use crate::config::ExecutionLimits;
use crate::deadline::Deadline;
use crate::error::SandboxError;
use crate::services::{self, ServiceSet};

/// Symbols removed from the language.
pub const DISABLED_SYMBOLS: &[&str] = &["import", "eval"];

/// Namespace under which the `json` capability is registered.
pub const JSON_NAMESPACE: &str = "json";

/// Operations are polled against the deadline once per this many steps.
const PROGRESS_CHECK_INTERVAL: u64 = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────────────────────────────────────

/// A named group of operations that can be exposed to scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// Integer and float operators.
    Arithmetic,
    /// Comparisons, boolean logic, `min`/`max` of two numbers.
    Logic,
    /// String functions, `to_string` and the conversions `print` relies on.
    Strings,
    /// Array functions: `len`, `push`, `sort`, `map`, `filter`, `some`, ...
    Arrays,
    /// Object map functions: `keys`, `values`, `contains`, ...
    Maps,
    /// `range` and iteration over ranges and collections.
    Iteration,
    /// Numeric parsing and conversion: `to_int`, `to_float`, `parse_int`, ...
    Math,
    /// Aggregation helpers and type predicates.
    Builtins,
    /// `json::dumps`, `json::dumps_pretty` and `json::loads`.
    Json,
}

impl Capability {
    /// Every capability, in registration order.
    pub const ALL: [Capability; 9] = [
        Capability::Arithmetic,
        Capability::Logic,
        Capability::Strings,
        Capability::Arrays,
        Capability::Maps,
        Capability::Iteration,
        Capability::Math,
        Capability::Builtins,
        Capability::Json,
    ];

    /// Stable name used in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Arithmetic => "arithmetic",
            Capability::Logic => "logic",
            Capability::Strings => "strings",
            Capability::Arrays => "arrays",
            Capability::Maps => "maps",
            Capability::Iteration => "iteration",
            Capability::Math => "math",
            Capability::Builtins => "builtins",
            Capability::Json => "json",
        }
    }

    /// One-line description of what the group exposes.
    pub fn summary(&self) -> &'static str {
        match self {
            Capability::Arithmetic => "integer and float operators",
            Capability::Logic => "comparisons, boolean logic, min/max of two numbers",
            Capability::Strings => "string functions and to_string conversions",
            Capability::Arrays => "array functions (len, push, sort, map, filter, some, all)",
            Capability::Maps => "object map functions (keys, values, contains, remove)",
            Capability::Iteration => "range() and for-loop iteration",
            Capability::Math => "numeric parsing and conversion (to_int, to_float, parse_int)",
            Capability::Builtins => {
                "sum, min, max, sorted, enumerate, any, all, is_int/is_float/is_string/..."
            }
            Capability::Json => "json::dumps, json::dumps_pretty, json::loads",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SandboxError::UnknownCapability(s.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Allowlist
// ─────────────────────────────────────────────────────────────────────────────

type Installer = Arc<dyn Fn(&mut Engine) + Send + Sync>;

/// Immutable set of capabilities, built once and shared by every execution.
#[derive(Clone)]
pub struct Allowlist {
    capabilities: BTreeSet<Capability>,
    installers: Vec<Installer>,
}

impl Allowlist {
    /// Every capability group.
    pub fn standard() -> Self {
        Self::with_capabilities(Capability::ALL)
    }

    /// Only the given capability groups.
    pub fn with_capabilities(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        let capabilities: BTreeSet<Capability> = capabilities.into_iter().collect();
        let installers = capabilities.iter().map(|c| installer(*c)).collect();
        Self {
            capabilities,
            installers,
        }
    }

    /// Parse capability names (as found in configuration).
    pub fn from_names<I, S>(names: I) -> Result<Self, SandboxError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let capabilities = names
            .into_iter()
            .map(|n| n.as_ref().parse::<Capability>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::with_capabilities(capabilities))
    }

    /// The allowlisted groups, in a stable order.
    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }

    /// Whether a group is allowlisted.
    pub fn contains(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Language symbols that are switched off regardless of capabilities.
    pub fn disabled_symbols(&self) -> &'static [&'static str] {
        DISABLED_SYMBOLS
    }

    /// Build a fresh isolated scope for one execution.
    ///
    /// The returned interpreter holds only the allowlisted operations and the
    /// service-handle methods; the scope holds only the service handles,
    /// bound as constants.
    pub fn build(
        &self,
        services: &ServiceSet,
        sink: OutputSink,
        deadline: Deadline,
        limits: &ExecutionLimits,
    ) -> IsolatedScope {
        let mut engine = Engine::new_raw();

        for symbol in DISABLED_SYMBOLS {
            engine.disable_symbol(*symbol);
        }
        engine.set_strict_variables(true);
        apply_limits(&mut engine, limits);

        for install in &self.installers {
            install(&mut engine);
        }

        engine.on_print(move |text| sink.write_line(text));
        engine.on_debug(|text, _source, position| {
            tracing::debug!(target: "corral_sandbox::script", %position, "{}", text);
        });

        let progress = deadline.clone();
        engine.on_progress(move |ops| {
            if ops % PROGRESS_CHECK_INTERVAL == 0 && progress.should_stop() {
                Some(Dynamic::UNIT)
            } else {
                None
            }
        });

        services::register(&mut engine, services, &deadline);

        let mut scope = Scope::new();
        for handle in services.iter() {
            scope.push_constant(handle.name().to_string(), handle.clone());
        }

        IsolatedScope { engine, scope }
    }
}

impl fmt::Debug for Allowlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allowlist")
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl Default for Allowlist {
    fn default() -> Self {
        Self::standard()
    }
}

fn installer(capability: Capability) -> Installer {
    match capability {
        Capability::Arithmetic => package(ArithmeticPackage::new()),
        Capability::Logic => package(LogicPackage::new()),
        Capability::Strings => {
            let basic = BasicStringPackage::new();
            let more = MoreStringPackage::new();
            Arc::new(move |engine: &mut Engine| {
                basic.register_into_engine(engine);
                more.register_into_engine(engine);
            })
        }
        Capability::Arrays => package(BasicArrayPackage::new()),
        Capability::Maps => package(BasicMapPackage::new()),
        Capability::Iteration => package(BasicIteratorPackage::new()),
        Capability::Math => package(BasicMathPackage::new()),
        Capability::Builtins => {
            let module: rhai::Shared<Module> = exported_module!(builtins_module).into();
            Arc::new(move |engine: &mut Engine| {
                engine.register_global_module(module.clone());
            })
        }
        Capability::Json => {
            let module: rhai::Shared<Module> = exported_module!(json_module).into();
            Arc::new(move |engine: &mut Engine| {
                engine.register_static_module(JSON_NAMESPACE, module.clone());
            })
        }
    }
}

fn package<P: Package + Send + Sync + 'static>(pkg: P) -> Installer {
    Arc::new(move |engine: &mut Engine| {
        pkg.register_into_engine(engine);
    })
}

fn apply_limits(engine: &mut Engine, limits: &ExecutionLimits) {
    engine.set_max_operations(limits.max_operations);
    // Zero means "no calls at all" to rhai, not "unlimited".
    let call_levels = match limits.max_call_levels {
        0 => usize::MAX,
        levels => levels,
    };
    engine.set_max_call_levels(call_levels);
    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_function_expr_depth);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);
    engine.set_max_modules(0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Isolated scope
// ─────────────────────────────────────────────────────────────────────────────

/// Interpreter plus variable scope for exactly one execution.
pub struct IsolatedScope {
    engine: Engine,
    scope: Scope<'static>,
}

impl IsolatedScope {
    /// Compile `code` against this scope without running it.
    pub fn compile(&self, code: &str) -> Result<AST, Box<EvalAltResult>> {
        Ok(self.engine.compile_with_scope(&self.scope, code)?)
    }

    /// Compile and run `code`.
    pub fn run(&mut self, code: &str) -> Result<(), Box<EvalAltResult>> {
        let ast = self.compile(code)?;
        self.engine.run_ast_with_scope(&mut self.scope, &ast)
    }

    /// Names bound in the scope (the service handles).
    pub fn bindings(&self) -> Vec<String> {
        self.scope.iter().map(|(name, _, _)| name.to_string()).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builtins
// ─────────────────────────────────────────────────────────────────────────────

fn as_number(value: &Dynamic) -> Option<f64> {
    if let Ok(i) = value.as_int() {
        return Some(i as f64);
    }
    value.as_float().ok()
}

fn compare(a: &Dynamic, b: &Dynamic) -> Result<std::cmp::Ordering, String> {
    if let (Ok(x), Ok(y)) = (a.as_int(), b.as_int()) {
        return Ok(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x
            .partial_cmp(&y)
            .ok_or_else(|| "cannot order NaN".to_string());
    }
    if let (Ok(x), Ok(y)) = (a.as_bool(), b.as_bool()) {
        return Ok(x.cmp(&y));
    }
    if let (Ok(x), Ok(y)) = (a.as_char(), b.as_char()) {
        return Ok(x.cmp(&y));
    }
    if a.is_string() && b.is_string() {
        let x = a.clone().into_string().unwrap_or_default();
        let y = b.clone().into_string().unwrap_or_default();
        return Ok(x.cmp(&y));
    }
    Err(format!(
        "cannot compare {} with {}",
        a.type_name(),
        b.type_name()
    ))
}

fn extreme(values: &[Dynamic], name: &str, want: std::cmp::Ordering) -> Result<Dynamic, String> {
    let mut iter = values.iter();
    let mut best = iter
        .next()
        .ok_or_else(|| format!("{name}() arg is an empty array"))?;
    for value in iter {
        if compare(value, best)? == want {
            best = value;
        }
    }
    Ok(best.clone())
}

fn truthy_flags(values: &[Dynamic], name: &str) -> Result<Vec<bool>, String> {
    values
        .iter()
        .map(|v| {
            v.as_bool()
                .map_err(|_| format!("{name}() expects an array of booleans, found {}", v.type_name()))
        })
        .collect()
}

#[export_module]
mod builtins_module {
    use rhai::{Array, Dynamic, EvalAltResult, FLOAT, INT};

    /// Sum of an array of numbers: an integer unless any element is a float.
    #[rhai_fn(return_raw)]
    pub fn sum(values: Array) -> Result<Dynamic, Box<EvalAltResult>> {
        let mut int_total: INT = 0;
        let mut float_total: FLOAT = 0.0;
        let mut saw_float = false;

        for value in &values {
            if let Ok(i) = value.as_int() {
                int_total = int_total
                    .checked_add(i)
                    .ok_or_else(|| "sum() overflowed".to_string())?;
            } else if let Ok(f) = value.as_float() {
                float_total += f;
                saw_float = true;
            } else {
                return Err(format!("sum() cannot add {}", value.type_name()).into());
            }
        }

        if saw_float {
            Ok(Dynamic::from(float_total + int_total as FLOAT))
        } else {
            Ok(Dynamic::from(int_total))
        }
    }

    #[rhai_fn(name = "min", return_raw)]
    pub fn min_of(values: Array) -> Result<Dynamic, Box<EvalAltResult>> {
        Ok(super::extreme(&values, "min", std::cmp::Ordering::Less)?)
    }

    #[rhai_fn(name = "max", return_raw)]
    pub fn max_of(values: Array) -> Result<Dynamic, Box<EvalAltResult>> {
        Ok(super::extreme(&values, "max", std::cmp::Ordering::Greater)?)
    }

    /// A sorted copy of the array; the original is left untouched.
    #[rhai_fn(return_raw)]
    pub fn sorted(values: Array) -> Result<Array, Box<EvalAltResult>> {
        for pair in values.windows(2) {
            super::compare(&pair[0], &pair[1])?;
        }
        let mut values = values;
        values.sort_by(|a, b| super::compare(a, b).unwrap_or(std::cmp::Ordering::Equal));
        Ok(values)
    }

    /// `[[0, first], [1, second], ...]`
    pub fn enumerate(values: Array) -> Array {
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                let pair: Array = vec![Dynamic::from(i as INT), v];
                Dynamic::from_array(pair)
            })
            .collect()
    }

    #[rhai_fn(return_raw)]
    pub fn any(values: Array) -> Result<bool, Box<EvalAltResult>> {
        Ok(super::truthy_flags(&values, "any")?.into_iter().any(|b| b))
    }

    #[rhai_fn(return_raw)]
    pub fn all(values: Array) -> Result<bool, Box<EvalAltResult>> {
        Ok(super::truthy_flags(&values, "all")?.into_iter().all(|b| b))
    }

    pub fn is_int(value: Dynamic) -> bool {
        value.is_int()
    }

    pub fn is_float(value: Dynamic) -> bool {
        value.is_float()
    }

    pub fn is_string(value: Dynamic) -> bool {
        value.is_string()
    }

    pub fn is_bool(value: Dynamic) -> bool {
        value.is_bool()
    }

    pub fn is_array(value: Dynamic) -> bool {
        value.is_array()
    }

    pub fn is_map(value: Dynamic) -> bool {
        value.is_map()
    }

    pub fn is_unit(value: Dynamic) -> bool {
        value.is_unit()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON
// ─────────────────────────────────────────────────────────────────────────────

fn to_json_value(value: &Dynamic) -> Result<serde_json::Value, Box<EvalAltResult>> {
    rhai::serde::from_dynamic::<serde_json::Value>(value)
}

#[export_module]
mod json_module {
    use rhai::{Dynamic, EvalAltResult};

    #[rhai_fn(return_raw)]
    pub fn dumps(value: Dynamic) -> Result<String, Box<EvalAltResult>> {
        let json = super::to_json_value(&value)?;
        Ok(serde_json::to_string(&json).map_err(|e| format!("json::dumps: {e}"))?)
    }

    #[rhai_fn(return_raw)]
    pub fn dumps_pretty(value: Dynamic) -> Result<String, Box<EvalAltResult>> {
        let json = super::to_json_value(&value)?;
        Ok(serde_json::to_string_pretty(&json).map_err(|e| format!("json::dumps_pretty: {e}"))?)
    }

    #[rhai_fn(return_raw)]
    pub fn loads(text: &str) -> Result<Dynamic, Box<EvalAltResult>> {
        let json: serde_json::Value =
            serde_json::from_str(text).map_err(|e| format!("json::loads: {e}"))?;
        rhai::serde::to_dynamic(json)
    }
}
