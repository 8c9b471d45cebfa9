//! Mapped props → the Lua table handed to the component.

use mlua::{Lua, MultiValue, Result, Table, Value};
use serde_json::Value as Json;

use super::context::context_mut;
use super::mx_api::{datasource_table, MxObject};
use super::{json_to_lua, lua_to_json};
use crate::mapping::{MappedProps, MappedValue};

pub fn build_props(lua: &Lua, props: &MappedProps) -> Result<Table> {
    build_record(lua, props, None)
}

fn build_record(lua: &Lua, props: &MappedProps, prefix: Option<&str>) -> Result<Table> {
    let t = lua.create_table()?;
    for (key, mapped) in props {
        let path = match prefix {
            Some(p) => format!("{}.{}", p, key),
            None => key.clone(),
        };
        t.set(key.as_str(), build_value(lua, mapped, &path)?)?;
    }
    Ok(t)
}

fn build_value(lua: &Lua, mapped: &MappedValue, path: &str) -> Result<Value> {
    let value = match mapped {
        MappedValue::Raw { value } => json_to_lua(lua, value)?,
        MappedValue::Datasource { key, .. } => Value::Table(datasource_table(lua, key)?),
        MappedValue::ListAttribute { field } => Value::Table(list_attribute(lua, field)?),
        MappedValue::EditableValue { value } => {
            let current = context_mut(lua)?
                .overrides
                .get(path)
                .cloned()
                .unwrap_or_else(|| value.clone());
            Value::Table(editable_value(lua, path, &current)?)
        }
        MappedValue::Expression { value } => {
            let t = lua.create_table()?;
            t.set("value", json_to_lua(lua, value)?)?;
            t.set("status", "available")?;
            Value::Table(t)
        }
        MappedValue::TextTemplate { value } => {
            let t = lua.create_table()?;
            t.set("value", value.as_str())?;
            t.set("status", "available")?;
            Value::Table(t)
        }
        MappedValue::ObjectList { items } => {
            let list = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{}[{}]", path, i);
                list.raw_set(i + 1, build_record(lua, item, Some(&item_path))?)?;
            }
            Value::Table(list)
        }
    };
    Ok(value)
}

/// `{ field, get(item) }`; `get` accepts both `attr.get(item)` and `attr:get(item)`.
fn list_attribute(lua: &Lua, field: &str) -> Result<Table> {
    let t = lua.create_table()?;
    t.set("field", field)?;
    let owned = field.to_string();
    t.set(
        "get",
        lua.create_function(move |lua, args: MultiValue| {
            let item = args.iter().find_map(|v| match v {
                Value::UserData(ud) => ud.borrow::<MxObject>().ok().map(|o| o.guid().to_string()),
                _ => None,
            });
            match item {
                Some(guid) => item_value(lua, guid, owned.clone()).map(Value::Table),
                None => Ok(Value::Nil),
            }
        })?,
    )?;
    Ok(t)
}

/// Editable view over one field of one mock object.
fn item_value(lua: &Lua, guid: String, field: String) -> Result<Table> {
    let current = {
        let ctx = context_mut(lua)?;
        ctx.store
            .object(&guid)
            .ok()
            .and_then(|o| o.get(&field).cloned())
            .unwrap_or(Json::Null)
    };
    let t = lua.create_table()?;
    t.set("value", json_to_lua(lua, &current)?)?;
    t.set("displayValue", display_value(&current))?;
    t.set("status", "available")?;
    t.set("readOnly", false)?;
    t.set(
        "setValue",
        lua.create_function(move |lua, args: MultiValue| {
            let next = lua_to_json(lua, last_arg(args))?;
            let mut ctx = context_mut(lua)?;
            ctx.store
                .set_attribute(&guid, &field, next)
                .map_err(mlua::Error::external)?;
            ctx.request_render();
            Ok(())
        })?,
    )?;
    Ok(t)
}

/// Writable wrapper around a free value; writes survive until the next host update.
fn editable_value(lua: &Lua, path: &str, current: &Json) -> Result<Table> {
    let t = lua.create_table()?;
    t.set("value", json_to_lua(lua, current)?)?;
    t.set("displayValue", display_value(current))?;
    t.set("status", "available")?;
    t.set("readOnly", false)?;
    let owned = path.to_string();
    t.set(
        "setValue",
        lua.create_function(move |lua, args: MultiValue| {
            let next = lua_to_json(lua, last_arg(args))?;
            let mut ctx = context_mut(lua)?;
            if ctx.overrides.get(&owned) != Some(&next) {
                ctx.overrides.insert(owned.clone(), next);
                ctx.request_render();
            }
            Ok(())
        })?,
    )?;
    Ok(t)
}

/// Value argument of a setter called with `.` or `:`.
fn last_arg(args: MultiValue) -> Value {
    args.into_iter().last().unwrap_or(Value::Nil)
}

fn display_value(value: &Json) -> String {
    match value {
        Json::Null => String::new(),
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}
