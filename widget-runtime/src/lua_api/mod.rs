pub mod context;
pub mod hooks;
pub mod mx_api;
pub mod props;
pub mod react_api;

use mlua::{DeserializeOptions, Lua, LuaSerdeExt, Result, SerializeOptions};
use serde_json::{Number, Value};

/// Register the `mx`, `React` and `ReactDOM` globals on the sandbox Lua state.
pub fn register_all(lua: &Lua) -> Result<()> {
    mx_api::register(lua)?;
    react_api::register(lua)?;
    Ok(())
}

/// JSON → Lua. `null` becomes `nil`.
pub fn json_to_lua(lua: &Lua, value: &Value) -> Result<mlua::Value> {
    let options = SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false);
    lua.to_value_with(value, options)
}

/// Lua → JSON. Functions and userdata are dropped; integral numbers stay integers.
pub fn lua_to_json(lua: &Lua, value: mlua::Value) -> Result<Value> {
    let options = DeserializeOptions::new().deny_unsupported_types(false);
    let json: Value = lua.from_value_with(value, options)?;
    Ok(normalize_numbers(json))
}

fn normalize_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Value::Number(Number::from(f as i64))
            }
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_numbers(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_round_trip_keeps_integers() {
        let lua = Lua::new();
        let value = json!({"name": "a", "count": 3, "ratio": 0.5, "tags": ["x", "y"]});
        let lua_value = json_to_lua(&lua, &value).unwrap();
        assert_eq!(lua_to_json(&lua, lua_value).unwrap(), value);
    }

    #[test]
    fn test_lua_numbers_normalized() {
        let lua = Lua::new();
        let v: mlua::Value = lua.load("return { n = 4, f = 1.25 }").eval().unwrap();
        assert_eq!(lua_to_json(&lua, v).unwrap(), json!({"n": 4, "f": 1.25}));
    }
}
