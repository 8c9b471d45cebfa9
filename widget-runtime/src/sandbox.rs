//! The isolated execution context: one Luau VM on its own thread per generation.

use mlua::{Lua, VmState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

use crate::bridge::{HostMessage, SandboxInbox, SandboxMessage, SandboxPort};
use crate::bundle::BundleHandle;
use crate::config::SandboxConfig;
use crate::error::{SandboxError, SandboxResult};
use crate::lua_api::context::{context_mut, paint, SandboxContext};
use crate::lua_api::{self, hooks, props, react_api};
use crate::mapping::{datasource_sources, MappedProps};
use crate::mock_data::{MockStore, SyncOutcome};
use crate::render::{Frame, Surface};
use crate::shim::{ComponentRef, ModuleLoader};

/// Globals shadowed in the sandbox on top of Luau's own sandboxing.
const BLOCKED_GLOBALS: &[&str] = &["loadstring", "getfenv", "setfenv"];

/// Wall-clock budget for one entry into bundle code, checked by the VM interrupt.
pub struct ScriptBudget {
    epoch: Instant,
    limit_ms: u64,
    /// Milliseconds since `epoch`; 0 when no bundle code is running.
    deadline_ms: AtomicU64,
}

impl ScriptBudget {
    pub fn new(limit_ms: u64) -> Self {
        Self {
            epoch: Instant::now(),
            limit_ms,
            deadline_ms: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Start the clock. The budget is disarmed when the guard drops.
    pub fn arm(&self) -> BudgetGuard<'_> {
        self.deadline_ms
            .store(self.now_ms() + self.limit_ms.max(1), Ordering::Relaxed);
        BudgetGuard { budget: self }
    }

    pub fn expired(&self) -> bool {
        let deadline = self.deadline_ms.load(Ordering::Relaxed);
        deadline != 0 && self.now_ms() > deadline
    }
}

pub struct BudgetGuard<'a> {
    budget: &'a ScriptBudget,
}

impl Drop for BudgetGuard<'_> {
    fn drop(&mut self) {
        self.budget.deadline_ms.store(0, Ordering::Relaxed);
    }
}

/// Sandboxed Luau state: read-only builtins, print routed to tracing, time budget, heap limit.
pub fn create_sandbox_state(config: &SandboxConfig, budget: Arc<ScriptBudget>) -> mlua::Result<Lua> {
    let lua = Lua::new();
    lua.sandbox(true)?;

    let globals = lua.globals();
    globals.set(
        "print",
        lua.create_function(|_, args: mlua::Variadic<mlua::Value>| {
            let line = args
                .iter()
                .map(|v| v.to_string().unwrap_or_else(|_| v.type_name().to_string()))
                .collect::<Vec<_>>()
                .join("\t");
            info!(target: "widget_sandbox::print", "{}", line);
            Ok(())
        })?,
    )?;
    for name in BLOCKED_GLOBALS {
        let blocked = name.to_string();
        globals.set(
            *name,
            lua.create_function(move |_, _: mlua::MultiValue| -> mlua::Result<()> {
                Err(mlua::Error::runtime(format!("{} is not available in the widget sandbox", blocked)))
            })?,
        )?;
    }

    lua.set_interrupt(move |_| {
        if budget.expired() {
            return Err(mlua::Error::runtime("script exceeded its time budget"));
        }
        Ok(VmState::Continue)
    });
    lua.set_memory_limit(config.memory_limit_bytes)?;
    Ok(lua)
}

/// Start the sandbox thread for one generation.
pub fn spawn_sandbox(
    bundle: BundleHandle,
    config: SandboxConfig,
    surface: Arc<dyn Surface>,
    port: SandboxPort,
    inbox: SandboxInbox,
) -> SandboxResult<JoinHandle<()>> {
    let name = format!("widget-sandbox-{}", port.generation().value());
    let handle = std::thread::Builder::new()
        .name(name)
        .spawn(move || run_sandbox(bundle, config, surface, port, inbox))?;
    Ok(handle)
}

fn run_sandbox(
    bundle: BundleHandle,
    config: SandboxConfig,
    surface: Arc<dyn Surface>,
    port: SandboxPort,
    mut inbox: SandboxInbox,
) {
    let span = info_span!("sandbox", generation = %port.generation(), bundle = %bundle.id());
    let _enter = span.enter();

    let budget = Arc::new(ScriptBudget::new(config.script_timeout_ms));
    let (lua, component) = match boot(&bundle, &config, &surface, &port, Arc::clone(&budget)) {
        Ok(booted) => booted,
        Err(e) => {
            fail(&surface, &port, &e);
            return;
        }
    };
    info!(component = %bundle.component_name(), "sandbox ready");
    port.post(SandboxMessage::IframeReady);

    let mut last_applied: Option<HostMessage> = None;
    while let Some(envelope) = inbox.blocking_recv() {
        // Last write wins: only the newest queued update is rendered.
        let mut latest = envelope;
        while let Ok(next) = inbox.try_recv() {
            latest = next;
        }
        if latest.generation != port.generation() {
            debug!(got = %latest.generation, "message for another generation dropped");
            continue;
        }
        if last_applied.as_ref() == Some(&latest.message) {
            debug!("identical update skipped");
            continue;
        }
        if let Err(e) = apply(&lua, &component, &latest.message, &config, &budget) {
            fail(&surface, &port, &e);
        }
        last_applied = Some(latest.message);
    }

    let _guard = budget.arm();
    if let Err(e) = hooks::run_cleanups(&lua) {
        warn!(error = %e, "effect cleanup failed during teardown");
    }
    debug!("sandbox stopped");
}

fn boot(
    bundle: &BundleHandle,
    config: &SandboxConfig,
    surface: &Arc<dyn Surface>,
    port: &SandboxPort,
    budget: Arc<ScriptBudget>,
) -> SandboxResult<(Lua, ComponentRef)> {
    let lua = create_sandbox_state(config, Arc::clone(&budget))?;
    lua.set_app_data(SandboxContext::new(
        port.clone(),
        MockStore::new(config.entity_module.clone(), config.identity_key.clone()),
        Arc::clone(surface),
        bundle.stylesheet().to_string(),
    ));
    lua_api::register_all(&lua)?;

    let component = {
        let _guard = budget.arm();
        ModuleLoader::new(&lua).load(
            bundle.script(),
            bundle.component_name(),
            bundle.component_id(),
        )?
    };
    Ok((lua, component))
}

fn apply(
    lua: &Lua,
    component: &ComponentRef,
    message: &HostMessage,
    config: &SandboxConfig,
    budget: &ScriptBudget,
) -> SandboxResult<()> {
    let HostMessage::UpdateProperties { properties, spec } = message;
    {
        let mut ctx = context_mut(lua)?;
        ctx.overrides.clear();
        for key in spec.datasource_keys() {
            ctx.store.register(&key);
        }
        for (key, source) in datasource_sources(properties) {
            match ctx.store.sync_datasource(&key, source.as_deref()) {
                Ok(SyncOutcome::Synced { added, evicted }) => {
                    debug!(datasource = %key, added, evicted, "datasource synced");
                }
                Ok(SyncOutcome::Unchanged) => {}
                Err(e) => warn!(datasource = %key, error = %e, "datasource unavailable"),
            }
        }
    }
    render_cycle(lua, component, properties, config.max_rerenders, budget)
}

/// Render, paint, run effects; repeat while hooks or data mutations ask for it.
fn render_cycle(
    lua: &Lua,
    component: &ComponentRef,
    properties: &MappedProps,
    max_rerenders: usize,
    budget: &ScriptBudget,
) -> SandboxResult<()> {
    context_mut(lua)?.take_render_request();
    for pass in 0..=max_rerenders {
        {
            let _guard = budget.arm();
            let props = props::build_props(lua, properties).map_err(render_error)?;
            let root = react_api::render_component(lua, component.value(), props).map_err(render_error)?;
            paint(lua, root)?;
            hooks::run_effects(lua).map_err(render_error)?;
        }
        if !context_mut(lua)?.take_render_request() {
            debug!(passes = pass + 1, "render settled");
            return Ok(());
        }
    }
    warn!(max_rerenders, "re-render limit reached, keeping last frame");
    Ok(())
}

fn render_error(e: mlua::Error) -> SandboxError {
    SandboxError::Render(e.to_string())
}

/// Contain a failure: error panel on the surface, notification to the host.
fn fail(surface: &Arc<dyn Surface>, port: &SandboxPort, error: &SandboxError) {
    let kind = error.kind();
    let message = error.to_string();
    warn!(?kind, error = %message, "sandbox failure contained");
    surface.paint(Frame::ErrorPanel {
        generation: port.generation(),
        kind,
        message: message.clone(),
    });
    port.post(SandboxMessage::SandboxFailed { kind, message });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_disarms_on_drop() {
        let budget = ScriptBudget::new(0);
        {
            let _guard = budget.arm();
            std::thread::sleep(std::time::Duration::from_millis(5));
            assert!(budget.expired());
        }
        assert!(!budget.expired());
    }

    #[test]
    fn test_runaway_script_is_interrupted() {
        let budget = Arc::new(ScriptBudget::new(50));
        let config = SandboxConfig::default();
        let lua = create_sandbox_state(&config, Arc::clone(&budget)).unwrap();
        let _guard = budget.arm();
        let result = lua.load("while true do end").exec();
        assert!(result.unwrap_err().to_string().contains("time budget"));
    }

    #[test]
    fn test_blocked_globals_raise() {
        let config = SandboxConfig::default();
        let lua = create_sandbox_state(&config, Arc::new(ScriptBudget::new(1000))).unwrap();
        let err = lua.load("loadstring('return 1')").exec().unwrap_err();
        assert!(err.to_string().contains("not available"));
    }
}
