//! Module shims for bundle evaluation and component resolution.
//!
//! Each evaluation gets its own environment table whose reads fall through to
//! the sandbox globals. `define`, `require`, `module` and `exports` live only in
//! that table and only for the duration of the evaluation.

use mlua::{Lua, MultiValue, Table, Value};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::{SandboxError, SandboxResult};
use crate::lua_api::react_api::is_component;

/// Names installed into the bundle scope for one evaluation.
const LOADER_SHIMS: &[&str] = &["define", "require", "module", "exports"];

const SCOPE_CHUNK: &str = "local parent = ...\nreturn setmetatable({}, { __index = parent })";

/// Which convention produced the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Factory,
    PlainExport,
    Global,
    ComponentId,
}

#[derive(Debug, Clone)]
pub struct ComponentRef {
    value: Value,
    resolution: Resolution,
}

impl ComponentRef {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

/// Evaluates one bundle and resolves its component. Holds no state between loads.
pub struct ModuleLoader<'lua> {
    lua: &'lua Lua,
}

impl<'lua> ModuleLoader<'lua> {
    pub fn new(lua: &'lua Lua) -> Self {
        Self { lua }
    }

    pub fn load(&self, script: &str, expected_name: &str, expected_id: &str) -> SandboxResult<ComponentRef> {
        let lua = self.lua;
        let env: Table = lua
            .load(SCOPE_CHUNK)
            .set_name("=scope")
            .call(lua.globals())?;

        let exports = lua.create_table()?;
        let module = lua.create_table()?;
        module.set("exports", exports.clone())?;
        let factories: Arc<Mutex<Vec<Value>>> = Arc::default();

        env.raw_set("module", module.clone())?;
        env.raw_set("exports", exports.clone())?;
        env.raw_set("require", require_fn(lua, &env)?)?;
        env.raw_set("define", define_fn(lua, &env, Arc::clone(&factories))?)?;

        let evaluated = lua
            .load(script)
            .set_name("=bundle")
            .set_environment(env.clone())
            .eval::<MultiValue>();

        for name in LOADER_SHIMS {
            env.raw_set(*name, Value::Nil)?;
        }
        let returned = evaluated.map_err(|e| SandboxError::BundleEvaluation(e.to_string()))?;

        let registered = factories
            .lock()
            .map(|f| f.clone())
            .map_err(|_| SandboxError::BundleEvaluation("loader state poisoned".into()))?;
        for result in &registered {
            if let Some(value) = pick_export(lua, result, expected_name)? {
                return Ok(self.resolved(value, Resolution::Factory, expected_name));
            }
        }

        if let Some(result) = plain_export(returned, &module, &exports)? {
            if let Some(value) = pick_export(lua, &result, expected_name)? {
                return Ok(self.resolved(value, Resolution::PlainExport, expected_name));
            }
        }

        let scoped: Value = env.raw_get(expected_name)?;
        let global: Value = lua.globals().get(expected_name)?;
        for candidate in [scoped, global] {
            if is_component(lua, &candidate)? {
                return Ok(self.resolved(candidate, Resolution::Global, expected_name));
            }
        }

        if let Some(candidate) = walk_dotted(&env, expected_id)? {
            if is_component(lua, &candidate)? {
                return Ok(self.resolved(candidate, Resolution::ComponentId, expected_name));
            }
        }

        Err(SandboxError::ComponentNotFound {
            name: expected_name.to_string(),
            id: expected_id.to_string(),
        })
    }

    fn resolved(&self, value: Value, resolution: Resolution, name: &str) -> ComponentRef {
        debug!(component = %name, ?resolution, "component resolved");
        ComponentRef { value, resolution }
    }
}

fn require_fn(lua: &Lua, env: &Table) -> mlua::Result<mlua::Function> {
    let env = env.clone();
    lua.create_function(move |lua, name: String| resolve_dependency(lua, &env, &name))
}

/// `define(factory)`, `define(deps, factory)`, `define(name, deps, factory)`, `define(table)`.
fn define_fn(lua: &Lua, env: &Table, factories: Arc<Mutex<Vec<Value>>>) -> mlua::Result<mlua::Function> {
    let env = env.clone();
    lua.create_function(move |lua, args: MultiValue| {
        let mut args: Vec<Value> = args.into_iter().collect();
        let factory = args.pop().unwrap_or(Value::Nil);
        let deps: Vec<String> = match args.iter().find_map(|v| match v {
            Value::Table(t) => Some(t.clone()),
            _ => None,
        }) {
            Some(t) => t.sequence_values::<String>().collect::<mlua::Result<_>>()?,
            // CommonJS wrapper form
            None => vec!["require".into(), "exports".into(), "module".into()],
        };

        let result = match factory {
            Value::Function(f) => {
                let resolved = deps
                    .iter()
                    .map(|d| resolve_dependency(lua, &env, d))
                    .collect::<mlua::Result<Vec<_>>>()?;
                let out: Value = f.call(MultiValue::from_vec(resolved))?;
                if out.is_nil() && deps.iter().any(|d| d == "exports" || d == "module") {
                    let module: Table = env.raw_get("module")?;
                    module.get("exports")?
                } else {
                    out
                }
            }
            other => other,
        };

        if !result.is_nil() {
            factories
                .lock()
                .map_err(|_| mlua::Error::runtime("loader state poisoned"))?
                .push(result);
        }
        Ok(())
    })
}

/// Minimal resolver shared by `require` and `define` deps. Unknown names get an empty table.
fn resolve_dependency(lua: &Lua, env: &Table, name: &str) -> mlua::Result<Value> {
    let globals = lua.globals();
    match name {
        "react" | "react/jsx-runtime" => globals.get("React"),
        "react-dom" | "react-dom/client" => globals.get("ReactDOM"),
        "mendix" | "mx" => globals.get("mx"),
        "exports" | "module" | "require" => env.raw_get(name),
        _ => {
            debug!(dependency = %name, "unknown dependency, using empty table");
            Ok(Value::Table(lua.create_table()?))
        }
    }
}

/// First returned value, else `module.exports` when reassigned or filled.
fn plain_export(returned: MultiValue, module: &Table, exports: &Table) -> mlua::Result<Option<Value>> {
    if let Some(value) = returned.into_iter().next().filter(|v| !v.is_nil()) {
        return Ok(Some(value));
    }
    let current: Value = module.raw_get("exports")?;
    Ok(match current {
        Value::Nil => None,
        Value::Table(ref t) if t == exports => {
            if t.pairs::<Value, Value>().next().is_some() {
                Some(current)
            } else {
                None
            }
        }
        other => Some(other),
    })
}

/// Named key, then `default`, then the single function export, then the value itself.
fn pick_export(lua: &Lua, value: &Value, name: &str) -> mlua::Result<Option<Value>> {
    let table = match value {
        Value::Function(_) => return Ok(Some(value.clone())),
        Value::Table(t) => t,
        _ => return Ok(None),
    };

    for key in [name, "default"] {
        let candidate: Value = table.raw_get(key)?;
        if is_component(lua, &candidate)? {
            return Ok(Some(candidate));
        }
    }

    let mut functions = Vec::new();
    for pair in table.pairs::<Value, Value>() {
        let (_, v) = pair?;
        if let Value::Function(_) = v {
            functions.push(v);
        }
    }
    if functions.len() == 1 {
        return Ok(functions.pop());
    }

    if is_component(lua, value)? {
        return Ok(Some(value.clone()));
    }
    Ok(None)
}

fn walk_dotted(env: &Table, id: &str) -> mlua::Result<Option<Value>> {
    if id.is_empty() {
        return Ok(None);
    }
    let mut current = Value::Table(env.clone());
    for segment in id.split('.') {
        current = match current {
            Value::Table(t) => t.get(segment)?,
            _ => return Ok(None),
        };
    }
    Ok(if current.is_nil() { None } else { Some(current) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua_api;

    fn lua() -> Lua {
        let lua = Lua::new();
        lua_api::register_all(&lua).unwrap();
        lua
    }

    fn load(lua: &Lua, script: &str, name: &str, id: &str) -> SandboxResult<ComponentRef> {
        ModuleLoader::new(lua).load(script, name, id)
    }

    #[test]
    fn test_global_assignment() {
        let lua = lua();
        let c = load(&lua, "Foo = function(props) return props.label end", "Foo", "x.Foo").unwrap();
        assert_eq!(c.resolution(), Resolution::Global);
    }

    #[test]
    fn test_factory_wins_over_global() {
        let lua = lua();
        let script = r#"
            Foo = function() return "global" end
            define("foo", { "react" }, function(React)
                return { Foo = function() return "factory" end }
            end)
        "#;
        let c = load(&lua, script, "Foo", "x.Foo").unwrap();
        assert_eq!(c.resolution(), Resolution::Factory);
        let Value::Function(f) = c.value() else { panic!("expected function") };
        assert_eq!(f.call::<String>(()).unwrap(), "factory");
    }

    #[test]
    fn test_factory_default_and_single_export() {
        let lua = lua();
        let c = load(
            &lua,
            "define({}, function() return { default = function() return 1 end, helper = 2 } end)",
            "Foo",
            "",
        )
        .unwrap();
        assert_eq!(c.resolution(), Resolution::Factory);

        let c = load(
            &lua,
            "define(function(require, exports) exports.Widget = function() end end)",
            "Foo",
            "",
        )
        .unwrap();
        assert_eq!(c.resolution(), Resolution::Factory);
    }

    #[test]
    fn test_plain_exports() {
        let lua = lua();
        let c = load(&lua, "return function(props) return nil end", "Foo", "").unwrap();
        assert_eq!(c.resolution(), Resolution::PlainExport);

        let c = load(&lua, "module.exports = { Foo = function() end, Bar = function() end }", "Foo", "").unwrap();
        assert_eq!(c.resolution(), Resolution::PlainExport);

        let c = load(&lua, "exports.Foo = function() end", "Foo", "").unwrap();
        assert_eq!(c.resolution(), Resolution::PlainExport);
    }

    #[test]
    fn test_render_table_component() {
        let lua = lua();
        let c = load(&lua, "Foo = { render = function(props) return 'x' end }", "Foo", "").unwrap();
        assert_eq!(c.resolution(), Resolution::Global);
    }

    #[test]
    fn test_dotted_component_id() {
        let lua = lua();
        let script = "com = { example = { Gauge = function() end } }";
        let c = load(&lua, script, "Other", "com.example.Gauge").unwrap();
        assert_eq!(c.resolution(), Resolution::ComponentId);
    }

    #[test]
    fn test_not_found_and_evaluation_error() {
        let lua = lua();
        assert!(matches!(
            load(&lua, "local x = 1", "Foo", "com.example.Foo"),
            Err(SandboxError::ComponentNotFound { .. })
        ));
        assert!(matches!(
            load(&lua, "error('boom')", "Foo", ""),
            Err(SandboxError::BundleEvaluation(msg)) if msg.contains("boom")
        ));
        assert!(matches!(
            load(&lua, "this is not lua", "Foo", ""),
            Err(SandboxError::BundleEvaluation(_))
        ));
    }

    #[test]
    fn test_nothing_leaks_between_loads() {
        let lua = lua();
        load(&lua, "Foo = function() end\ndefine({}, function() return {} end)", "Foo", "").unwrap();

        let leaked: Value = lua.load("return define").eval().unwrap();
        assert!(leaked.is_nil());
        assert!(matches!(
            load(&lua, "Bar = 1", "Foo", ""),
            Err(SandboxError::ComponentNotFound { .. })
        ));
    }

    #[test]
    fn test_require_resolves_shims() {
        let lua = lua();
        let script = r#"
            local React = require("react")
            local unknown = require("left-pad")
            assert(type(React.createElement) == "function")
            assert(type(unknown) == "table")
            Foo = function() return React.createElement("div") end
        "#;
        assert!(load(&lua, script, "Foo", "").is_ok());
    }
}
