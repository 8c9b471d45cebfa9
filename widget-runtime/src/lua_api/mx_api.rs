use mlua::{AnyUserData, Function, Lua, MetaMethod, MultiValue, Result, Table, UserData, UserDataFields, UserDataMethods, Value};
use std::collections::BTreeSet;
use tracing::warn;

use super::context::{context_mut, DatasourceView};
use super::{json_to_lua, lua_to_json};
use crate::error::MockDataError;
use crate::mock_data::DatasourceStatus;

/// Handle to a mock object. Looks the object up on every access, so it never goes stale.
#[derive(Debug, Clone)]
pub struct MxObject {
    guid: String,
}

impl MxObject {
    pub fn new(guid: impl Into<String>) -> Self {
        Self { guid: guid.into() }
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }
}

impl UserData for MxObject {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("id", |_, this| Ok(this.guid.clone()));
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // obj:get(attr) -> value; staged change first, then committed data
        methods.add_method("get", |lua, this, attr: String| {
            let value = {
                let ctx = context_mut(lua)?;
                ctx.store
                    .object(&this.guid)
                    .ok()
                    .and_then(|o| o.get(&attr).cloned())
            };
            match value {
                Some(v) => json_to_lua(lua, &v),
                None => Ok(Value::Nil),
            }
        });

        // obj:set(attr, value): staged until mx.data.commit
        methods.add_method("set", |lua, this, (attr, value): (String, Value)| {
            let value = lua_to_json(lua, value)?;
            context_mut(lua)?
                .store
                .set_attribute(&this.guid, &attr, value)
                .map_err(mlua::Error::external)
        });

        methods.add_method("getGuid", |_, this, ()| Ok(this.guid.clone()));

        methods.add_method("getEntity", |lua, this, ()| {
            let ctx = context_mut(lua)?;
            Ok(ctx
                .store
                .object(&this.guid)
                .map(|o| o.entity.clone())
                .unwrap_or_default())
        });

        methods.add_method("isNew", |lua, this, ()| {
            let ctx = context_mut(lua)?;
            Ok(ctx.store.object(&this.guid).map(|o| o.is_new).unwrap_or(false))
        });

        methods.add_method("getAttributes", |lua, this, ()| {
            let names = {
                let ctx = context_mut(lua)?;
                ctx.store
                    .object(&this.guid)
                    .map(|o| o.attribute_names())
                    .unwrap_or_default()
            };
            lua.create_sequence_from(names)
        });

        methods.add_method("has", |lua, this, attr: String| {
            let ctx = context_mut(lua)?;
            Ok(ctx.store.object(&this.guid).map(|o| o.has(&attr)).unwrap_or(false))
        });

        methods.add_meta_method(MetaMethod::Eq, |_, this, other: AnyUserData| {
            Ok(other
                .borrow::<MxObject>()
                .map(|o| o.guid == this.guid)
                .unwrap_or(false))
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("MxObject({})", this.guid))
        });
    }
}

/// Register the `mx` table with the `mx.data` client API.
pub fn register(lua: &Lua) -> Result<()> {
    let mx = lua.create_table()?;
    let data = lua.create_table()?;

    // mx.data.get({ guid | guids, callback, error })
    data.set(
        "get",
        lua.create_function(|lua, args: Table| {
            let (callback, on_error) = callbacks(&args)?;

            if let Some(guids) = args.get::<Option<Table>>("guids")? {
                let wanted: Vec<String> = guids.sequence_values::<String>().collect::<Result<_>>()?;
                let found: Vec<MxObject> = {
                    let ctx = context_mut(lua)?;
                    wanted
                        .into_iter()
                        .filter(|g| ctx.store.contains(g))
                        .map(MxObject::new)
                        .collect()
                };
                if let Some(cb) = callback {
                    cb.call::<()>(lua.create_sequence_from(found)?)?;
                }
                return Ok(());
            }

            let guid = args.get::<Option<String>>("guid")?.unwrap_or_default();
            let exists = context_mut(lua)?.store.contains(&guid);
            if exists {
                if let Some(cb) = callback {
                    cb.call::<()>(MxObject::new(guid))?;
                }
                Ok(())
            } else {
                report(on_error, "get", MockDataError::ObjectNotFound { guid })
            }
        })?,
    )?;

    // mx.data.create({ entity, callback, error })
    data.set(
        "create",
        lua.create_function(|lua, args: Table| {
            let (callback, on_error) = callbacks(&args)?;
            let entity = args.get::<Option<String>>("entity")?.unwrap_or_default();
            let created = {
                let mut ctx = context_mut(lua)?;
                let created = ctx.store.create(&entity);
                if let Ok((_, key)) = &created {
                    ctx.emit_commit(key);
                    ctx.request_render();
                }
                created
            };
            match created {
                Ok((guid, _)) => {
                    if let Some(cb) = callback {
                        cb.call::<()>(MxObject::new(guid))?;
                    }
                    Ok(())
                }
                Err(e) => report(on_error, "create", e),
            }
        })?,
    )?;

    // mx.data.commit({ mxobj | mxobjs, callback, error })
    data.set(
        "commit",
        lua.create_function(|lua, args: Table| {
            let (callback, on_error) = callbacks(&args)?;
            let mut guids = Vec::new();
            if let Some(obj) = args.get::<Option<AnyUserData>>("mxobj")? {
                guids.push(obj.borrow::<MxObject>()?.guid.clone());
            }
            if let Some(list) = args.get::<Option<Table>>("mxobjs")? {
                for obj in list.sequence_values::<AnyUserData>() {
                    guids.push(obj?.borrow::<MxObject>()?.guid.clone());
                }
            }
            let failure = mutate_each(lua, &guids, |store, guid| store.commit(guid))?;
            finish(callback, on_error, "commit", failure)
        })?,
    )?;

    // mx.data.remove({ guid | guids, callback, error })
    data.set(
        "remove",
        lua.create_function(|lua, args: Table| {
            let (callback, on_error) = callbacks(&args)?;
            let mut guids = Vec::new();
            if let Some(guid) = args.get::<Option<String>>("guid")? {
                guids.push(guid);
            }
            if let Some(list) = args.get::<Option<Table>>("guids")? {
                for guid in list.sequence_values::<String>() {
                    guids.push(guid?);
                }
            }
            let failure = mutate_each(lua, &guids, |store, guid| store.remove(guid))?;
            finish(callback, on_error, "remove", failure)
        })?,
    )?;

    mx.set("data", data)?;
    lua.globals().set("mx", mx)?;
    Ok(())
}

fn callbacks(args: &Table) -> Result<(Option<Function>, Option<Function>)> {
    Ok((
        args.get::<Option<Function>>("callback")?,
        args.get::<Option<Function>>("error")?,
    ))
}

/// Apply `op` to every guid, then emit one commit per affected datasource.
/// Returns the first failure, if any.
fn mutate_each<F>(lua: &Lua, guids: &[String], mut op: F) -> Result<Option<MockDataError>>
where
    F: FnMut(&mut crate::mock_data::MockStore, &str) -> std::result::Result<String, MockDataError>,
{
    let mut ctx = context_mut(lua)?;
    let mut affected = BTreeSet::new();
    let mut failure = None;
    for guid in guids {
        match op(&mut ctx.store, guid) {
            Ok(key) => {
                affected.insert(key);
            }
            Err(e) => {
                failure.get_or_insert(e);
            }
        }
    }
    for key in &affected {
        ctx.emit_commit(key);
    }
    if !affected.is_empty() {
        ctx.request_render();
    }
    Ok(failure)
}

fn finish(
    callback: Option<Function>,
    on_error: Option<Function>,
    op: &str,
    failure: Option<MockDataError>,
) -> Result<()> {
    match failure {
        Some(e) => report(on_error, op, e),
        None => {
            if let Some(cb) = callback {
                cb.call::<()>(())?;
            }
            Ok(())
        }
    }
}

/// Deliver a data error to the bundle's own `error` callback, or log it.
fn report(on_error: Option<Function>, op: &str, err: MockDataError) -> Result<()> {
    match on_error {
        Some(cb) => cb.call::<()>(err.to_string()),
        None => {
            warn!(op = %op, error = %err, "mx.data call failed without an error callback");
            Ok(())
        }
    }
}

/// Lua view of one datasource, rebuilt on every render.
pub fn datasource_table(lua: &Lua, key: &str) -> Result<Table> {
    let (status, guids, schema, entity, view) = {
        let ctx = context_mut(lua)?;
        let view = ctx.views.get(key).copied().unwrap_or_default();
        match ctx.store.datasource(key) {
            Some(ds) => (
                ds.status,
                ds.item_guids().to_vec(),
                serde_json::to_value(&ds.schema).map_err(mlua::Error::external)?,
                ds.entity.clone(),
                view,
            ),
            None => (
                DatasourceStatus::Loading,
                Vec::new(),
                serde_json::Value::Object(Default::default()),
                ctx.store.entity_name(key),
                view,
            ),
        }
    };

    let total = guids.len();
    let start = view.offset.min(total);
    let end = view.limit.map(|l| (start + l).min(total)).unwrap_or(total);
    let shown: Vec<MxObject> = guids[start..end].iter().map(MxObject::new).collect();

    let t = lua.create_table()?;
    t.set("key", key)?;
    t.set("entity", entity)?;
    t.set("status", status.as_str())?;
    t.set("items", lua.create_sequence_from(shown)?)?;
    t.set("totalCount", total)?;
    t.set("hasMoreItems", end < total)?;
    t.set("offset", start)?;
    t.set("limit", view.limit.unwrap_or(total))?;
    t.set("attributeSchema", json_to_lua(lua, &schema)?)?;

    t.set(
        "reload",
        lua.create_function(|lua, _: MultiValue| {
            context_mut(lua)?.request_render();
            Ok(())
        })?,
    )?;

    let owned = key.to_string();
    t.set(
        "setLimit",
        lua.create_function(move |lua, args: MultiValue| {
            let limit = last_number(&args).map(|n| n.max(0.0) as usize);
            update_view(lua, &owned, |view| view.limit = limit)
        })?,
    )?;

    let owned = key.to_string();
    t.set(
        "setOffset",
        lua.create_function(move |lua, args: MultiValue| {
            let offset = last_number(&args).map(|n| n.max(0.0) as usize).unwrap_or(0);
            update_view(lua, &owned, |view| view.offset = offset)
        })?,
    )?;

    t.set("requestTotalCount", lua.create_function(|_, _: MultiValue| Ok(()))?)?;
    Ok(t)
}

fn update_view(lua: &Lua, key: &str, change: impl FnOnce(&mut DatasourceView)) -> Result<()> {
    let mut ctx = context_mut(lua)?;
    let before = ctx.views.get(key).copied().unwrap_or_default();
    let mut after = before;
    change(&mut after);
    if after != before {
        ctx.views.insert(key.to_string(), after);
        ctx.request_render();
    }
    Ok(())
}

/// Works for both `ds.setLimit(n)` and `ds:setLimit(n)`.
fn last_number(args: &MultiValue) -> Option<f64> {
    args.iter().rev().find_map(|v| match v {
        Value::Integer(i) => Some(*i as f64),
        Value::Number(n) => Some(*n),
        _ => None,
    })
}
