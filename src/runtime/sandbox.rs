/// Resource-bounded Lua sandbox for function nodes
///
/// Every invocation gets a fresh Lua 5.4 VM with only the `table`, `string`
/// and `math` libraries loaded. Globals that reach the filesystem, the module
/// loader or dynamic code loading are removed. Each run is bounded three ways:
/// - memory: `Lua::set_memory_limit`
/// - instructions: a count hook aborts once the budget is spent
/// - wall clock: the same hook checks a deadline, and the blocking task is
///   additionally wrapped in `tokio::time::timeout`
///
/// Values cross the boundary as JSON: `input` (primary input), `inputs` (all
/// incoming outputs) and `context` (read-only snapshot) go in, the script's
/// return value comes back out.

use anyhow::Result;
use mlua::{HookTriggers, Lua, LuaOptions, LuaSerdeExt, SerializeOptions, StdLib, VmState};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Instructions between two hook invocations
const HOOK_INTERVAL: u32 = 1_000;

/// Deepest table nesting accepted in a script result
const MAX_RESULT_DEPTH: usize = 64;

/// Globals removed from every sandbox
const BLOCKED_GLOBALS: [&str; 10] = [
    "os",
    "io",
    "debug",
    "package",
    "require",
    "load",
    "loadstring",
    "dofile",
    "loadfile",
    "collectgarbage",
];

/// Resource limits applied to each script run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Maximum Lua heap size in bytes
    pub memory_bytes: usize,
    /// Maximum number of VM instructions
    pub instruction_limit: u64,
    /// Maximum wall-clock time
    pub timeout: Duration,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 16 * 1024 * 1024,
            instruction_limit: 10_000_000,
            timeout: Duration::from_millis(5_000),
        }
    }
}

/// Values exposed to a script
#[derive(Debug, Clone, Default)]
pub struct ScriptBindings {
    /// Primary input of the node (`input`)
    pub input: Value,
    /// Every incoming output in edge order (`inputs`)
    pub inputs: Vec<Value>,
    /// Snapshot of the execution context (`context`)
    pub context: Value,
}

/// Lua script runner with fixed resource limits
#[derive(Debug, Clone, Default)]
pub struct ScriptSandbox {
    limits: SandboxLimits,
}

impl ScriptSandbox {
    /// Create a sandbox with the given limits
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    /// Configured limits
    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Run a script on the blocking pool and return its result as JSON
    ///
    /// `timeout` can only shorten the configured wall-clock limit.
    pub async fn run(
        &self,
        code: &str,
        bindings: ScriptBindings,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let mut limits = self.limits.clone();
        if let Some(requested) = timeout {
            limits.timeout = limits.timeout.min(requested);
        }

        let code = code.to_string();
        let wall_clock = limits.timeout;
        tracing::debug!("🧠 Running Lua script ({} bytes) with limits {:?}", code.len(), limits);

        // The hook enforces the deadline inside the VM; this outer bound only
        // covers time spent outside Lua instructions.
        let task = tokio::task::spawn_blocking(move || run_script(&code, bindings, &limits));
        match tokio::time::timeout(wall_clock + Duration::from_millis(250), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(anyhow::anyhow!("Lua sandbox task failed: {}", join_error)),
            Err(_) => Err(anyhow::anyhow!(
                "Lua script timed out after {}ms",
                wall_clock.as_millis()
            )),
        }
    }
}

fn run_script(code: &str, bindings: ScriptBindings, limits: &SandboxLimits) -> Result<Value> {
    // STEP 1: fresh VM with a minimal standard library
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH,
        LuaOptions::new(),
    )
    .map_err(|e| anyhow::anyhow!("Failed to create Lua sandbox: {}", e))?;

    lua.set_memory_limit(limits.memory_bytes)
        .map_err(|e| anyhow::anyhow!("Failed to set Lua memory limit: {}", e))?;

    // STEP 2: instruction budget and deadline
    let instruction_limit = limits.instruction_limit;
    let deadline = Instant::now() + limits.timeout;
    let timeout_ms = limits.timeout.as_millis();
    let executed = AtomicU64::new(0);
    let _ = lua.set_hook(
        HookTriggers::new().every_nth_instruction(HOOK_INTERVAL),
        move |_lua, _debug| {
            let total = executed.fetch_add(HOOK_INTERVAL as u64, Ordering::Relaxed)
                + HOOK_INTERVAL as u64;
            if total > instruction_limit {
                return Err(mlua::Error::RuntimeError(format!(
                    "instruction limit of {} exceeded",
                    instruction_limit
                )));
            }
            if Instant::now() >= deadline {
                return Err(mlua::Error::RuntimeError(format!(
                    "script timed out after {}ms",
                    timeout_ms
                )));
            }
            Ok(VmState::Continue)
        },
    );

    // STEP 3: strip ambient capabilities
    let globals = lua.globals();
    for name in BLOCKED_GLOBALS {
        let _ = globals.set(name, mlua::Nil);
    }
    let print = lua
        .create_function(|_, parts: mlua::Variadic<String>| {
            tracing::debug!("🖨️ Lua print: {}", parts.join("\t"));
            Ok(())
        })
        .map_err(|e| anyhow::anyhow!("Failed to create Lua print: {}", e))?;
    globals
        .set("print", print)
        .map_err(|e| anyhow::anyhow!("Failed to install Lua print: {}", e))?;

    // STEP 4: inject bindings, JSON null becomes nil
    let options = SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false);
    for (name, value) in [
        ("input", &bindings.input),
        ("inputs", &Value::Array(bindings.inputs)),
        ("context", &bindings.context),
    ] {
        let lua_value = lua
            .to_value_with(value, options)
            .map_err(|e| anyhow::anyhow!("Failed to pass '{}' to Lua: {}", name, e))?;
        globals
            .set(name, lua_value)
            .map_err(|e| anyhow::anyhow!("Failed to set Lua global '{}': {}", name, e))?;
    }

    // STEP 5: run and convert the result
    let result: mlua::Value = lua
        .load(code)
        .set_name("function-node")
        .eval()
        .map_err(|e| anyhow::anyhow!("Lua script execution failed: {}", e))?;

    lua_to_json(result)
}

/// Convert a Lua value to JSON
///
/// Tables with contiguous positive integer keys become arrays, any other table
/// becomes an object. Functions, userdata and threads become null.
/// Self-referencing tables and nesting beyond `MAX_RESULT_DEPTH` are errors.
fn lua_to_json(lua_value: mlua::Value) -> Result<Value> {
    convert(lua_value, &mut Vec::new())
}

/// `path` holds the tables currently being converted, outermost first
fn convert(lua_value: mlua::Value, path: &mut Vec<*const std::ffi::c_void>) -> Result<Value> {
    match lua_value {
        mlua::Value::Nil => Ok(Value::Null),
        mlua::Value::Boolean(b) => Ok(Value::Bool(b)),
        mlua::Value::Integer(i) => Ok(Value::Number(serde_json::Number::from(i))),
        mlua::Value::Number(f) => Ok(serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        mlua::Value::String(s) => {
            let text = s
                .to_str()
                .map_err(|e| anyhow::anyhow!("Invalid UTF-8 in Lua string: {}", e))?;
            Ok(Value::String(text.to_string()))
        }
        mlua::Value::Table(table) => {
            let pointer = table.to_pointer();
            if path.contains(&pointer) {
                return Err(anyhow::anyhow!(
                    "Script result contains a table that references itself"
                ));
            }
            if path.len() >= MAX_RESULT_DEPTH {
                return Err(anyhow::anyhow!(
                    "Script result is nested deeper than {} tables",
                    MAX_RESULT_DEPTH
                ));
            }
            path.push(pointer);
            let converted = convert_table(table, path);
            path.pop();
            converted
        }
        _ => Ok(Value::Null),
    }
}

fn convert_table(table: mlua::Table, path: &mut Vec<*const std::ffi::c_void>) -> Result<Value> {
    let mut max_index = 0usize;
    let mut count = 0usize;
    let mut is_array = true;

    for pair in table.clone().pairs::<mlua::Value, mlua::Value>() {
        let (key, _) =
            pair.map_err(|e| anyhow::anyhow!("Failed to iterate Lua table: {}", e))?;
        count += 1;
        match key {
            mlua::Value::Integer(i) if i > 0 => max_index = max_index.max(i as usize),
            _ => {
                is_array = false;
                break;
            }
        }
    }

    if is_array && count > 0 && count == max_index {
        let mut items = Vec::with_capacity(max_index);
        for i in 1..=max_index {
            let item: mlua::Value = table
                .get(i)
                .map_err(|e| anyhow::anyhow!("Failed to read Lua table value: {}", e))?;
            items.push(convert(item, path)?);
        }
        return Ok(Value::Array(items));
    }

    let mut object = serde_json::Map::new();
    for pair in table.pairs::<mlua::Value, mlua::Value>() {
        let (key, value) =
            pair.map_err(|e| anyhow::anyhow!("Failed to iterate Lua table: {}", e))?;
        let key = match key {
            mlua::Value::String(s) => s
                .to_str()
                .map_err(|e| anyhow::anyhow!("Invalid UTF-8 in Lua key: {}", e))?
                .to_string(),
            mlua::Value::Integer(i) => i.to_string(),
            mlua::Value::Number(f) => f.to_string(),
            _ => continue,
        };
        object.insert(key, convert(value, path)?);
    }
    Ok(Value::Object(object))
}
