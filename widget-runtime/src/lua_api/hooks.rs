//! Component hooks. Slots are matched by call order within one render pass.

use mlua::{Function, Lua, Result, Table, Value};

use super::context::context_mut;

enum HookSlot {
    State { value: Value, setter: Function },
    Ref(Table),
    Memo { deps: Option<Vec<Value>>, value: Value },
    Effect { deps: Option<Vec<Value>>, cleanup: Option<Function> },
}

#[derive(Default)]
pub struct HookState {
    slots: Vec<HookSlot>,
    cursor: usize,
    pending: Vec<(usize, Function)>,
}

impl HookState {
    /// Rewind the cursor before rendering the tree again.
    pub fn begin_render(&mut self) {
        self.cursor = 0;
        self.pending.clear();
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn next_index(&mut self) -> usize {
        let idx = self.cursor;
        self.cursor += 1;
        idx
    }

    fn put(&mut self, idx: usize, slot: HookSlot) {
        if idx < self.slots.len() {
            self.slots[idx] = slot;
        } else {
            self.slots.push(slot);
        }
    }

    fn take_cleanups(&mut self) -> Vec<Function> {
        self.slots
            .iter_mut()
            .filter_map(|slot| match slot {
                HookSlot::Effect { cleanup, .. } => cleanup.take(),
                _ => None,
            })
            .collect()
    }
}

/// Install the hook functions on the `React` table.
pub fn register(lua: &Lua, react: &Table) -> Result<()> {
    // React.useState(initial) -> value, setValue
    react.set(
        "useState",
        lua.create_function(|lua, initial: Value| {
            let (idx, existing) = {
                let mut ctx = context_mut(lua)?;
                let idx = ctx.hooks.next_index();
                let existing = match ctx.hooks.slots.get(idx) {
                    Some(HookSlot::State { value, setter }) => Some((value.clone(), setter.clone())),
                    _ => None,
                };
                (idx, existing)
            };
            if let Some(state) = existing {
                return Ok(state);
            }

            let value = match initial {
                Value::Function(init) => init.call::<Value>(())?,
                other => other,
            };
            let setter = lua.create_function(move |lua, next: Value| {
                let current = {
                    let ctx = context_mut(lua)?;
                    match ctx.hooks.slots.get(idx) {
                        Some(HookSlot::State { value, .. }) => value.clone(),
                        _ => Value::Nil,
                    }
                };
                let next = match next {
                    Value::Function(update) => update.call::<Value>(current.clone())?,
                    other => other,
                };
                if next == current {
                    return Ok(());
                }
                let mut ctx = context_mut(lua)?;
                if let Some(HookSlot::State { value, .. }) = ctx.hooks.slots.get_mut(idx) {
                    *value = next;
                }
                ctx.request_render();
                Ok(())
            })?;

            context_mut(lua)?.hooks.put(
                idx,
                HookSlot::State {
                    value: value.clone(),
                    setter: setter.clone(),
                },
            );
            Ok((value, setter))
        })?,
    )?;

    // React.useRef(initial) -> { current }
    react.set(
        "useRef",
        lua.create_function(|lua, initial: Value| {
            let (idx, existing) = {
                let mut ctx = context_mut(lua)?;
                let idx = ctx.hooks.next_index();
                let existing = match ctx.hooks.slots.get(idx) {
                    Some(HookSlot::Ref(t)) => Some(t.clone()),
                    _ => None,
                };
                (idx, existing)
            };
            if let Some(t) = existing {
                return Ok(t);
            }
            let t = lua.create_table()?;
            t.set("current", initial)?;
            context_mut(lua)?.hooks.put(idx, HookSlot::Ref(t.clone()));
            Ok(t)
        })?,
    )?;

    // React.useMemo(factory, deps) -> value
    react.set(
        "useMemo",
        lua.create_function(|lua, (factory, deps): (Function, Option<Table>)| {
            let deps = deps_of(deps)?;
            let (idx, cached) = memo_lookup(lua, &deps)?;
            if let Some(value) = cached {
                return Ok(value);
            }
            let value = factory.call::<Value>(())?;
            context_mut(lua)?.hooks.put(
                idx,
                HookSlot::Memo {
                    deps,
                    value: value.clone(),
                },
            );
            Ok(value)
        })?,
    )?;

    // React.useCallback(fn, deps) -> fn
    react.set(
        "useCallback",
        lua.create_function(|lua, (callback, deps): (Function, Option<Table>)| {
            let deps = deps_of(deps)?;
            let (idx, cached) = memo_lookup(lua, &deps)?;
            if let Some(value) = cached {
                return Ok(value);
            }
            let value = Value::Function(callback);
            context_mut(lua)?.hooks.put(
                idx,
                HookSlot::Memo {
                    deps,
                    value: value.clone(),
                },
            );
            Ok(value)
        })?,
    )?;

    // React.useEffect(effect, deps): runs after paint when deps changed
    let use_effect = lua.create_function(|lua, (effect, deps): (Function, Option<Table>)| {
        let deps = deps_of(deps)?;
        let mut ctx = context_mut(lua)?;
        let hooks = &mut ctx.hooks;
        let idx = hooks.next_index();
        let seen = matches!(hooks.slots.get(idx), Some(HookSlot::Effect { .. }));
        if !seen {
            hooks.put(idx, HookSlot::Effect { deps, cleanup: None });
            hooks.pending.push((idx, effect));
            return Ok(());
        }
        if let Some(HookSlot::Effect { deps: old, .. }) = hooks.slots.get_mut(idx) {
            if deps.is_none() || *old != deps {
                *old = deps;
                hooks.pending.push((idx, effect));
            }
        }
        Ok(())
    })?;
    react.set("useEffect", use_effect.clone())?;
    react.set("useLayoutEffect", use_effect)?;

    Ok(())
}

fn deps_of(deps: Option<Table>) -> Result<Option<Vec<Value>>> {
    deps.map(|t| t.sequence_values::<Value>().collect::<Result<Vec<_>>>())
        .transpose()
}

/// Claim the next slot; returns the cached memo value when deps are unchanged.
fn memo_lookup(lua: &Lua, deps: &Option<Vec<Value>>) -> Result<(usize, Option<Value>)> {
    let mut ctx = context_mut(lua)?;
    let idx = ctx.hooks.next_index();
    let cached = match ctx.hooks.slots.get(idx) {
        Some(HookSlot::Memo { deps: old, value }) if deps.is_some() && old == deps => {
            Some(value.clone())
        }
        _ => None,
    };
    Ok((idx, cached))
}

/// Run effects queued by the last render: previous cleanup first, then the effect.
pub fn run_effects(lua: &Lua) -> Result<()> {
    let pending = std::mem::take(&mut context_mut(lua)?.hooks.pending);
    for (idx, effect) in pending {
        let previous = match context_mut(lua)?.hooks.slots.get_mut(idx) {
            Some(HookSlot::Effect { cleanup, .. }) => cleanup.take(),
            _ => None,
        };
        if let Some(cleanup) = previous {
            cleanup.call::<()>(())?;
        }
        if let Value::Function(cleanup) = effect.call::<Value>(())? {
            if let Some(HookSlot::Effect { cleanup: slot, .. }) = context_mut(lua)?.hooks.slots.get_mut(idx) {
                *slot = Some(cleanup);
            }
        }
    }
    Ok(())
}

/// Run every outstanding effect cleanup. Used when the sandbox shuts down.
pub fn run_cleanups(lua: &Lua) -> Result<()> {
    let cleanups = context_mut(lua)?.hooks.take_cleanups();
    for cleanup in cleanups {
        cleanup.call::<()>(())?;
    }
    Ok(())
}
