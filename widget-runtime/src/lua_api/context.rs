use mlua::{AppDataRefMut, Lua};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::hooks::HookState;
use crate::bridge::{Generation, SandboxMessage, SandboxPort};
use crate::mock_data::MockStore;
use crate::render::{Frame, RenderNode, Surface};

/// Paging state a component set through `setOffset` / `setLimit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatasourceView {
    pub offset: usize,
    pub limit: Option<usize>,
}

/// Per-sandbox state reachable from Lua callbacks via `lua.app_data_mut()`.
/// Never hold a borrow of it while calling into Lua.
pub struct SandboxContext {
    pub port: SandboxPort,
    pub store: MockStore,
    pub hooks: HookState,
    pub surface: Arc<dyn Surface>,
    pub stylesheet: String,
    pub views: HashMap<String, DatasourceView>,
    /// Values written through `setValue` on editable props, by prop key.
    pub overrides: HashMap<String, serde_json::Value>,
    rerender: bool,
}

impl SandboxContext {
    pub fn new(port: SandboxPort, store: MockStore, surface: Arc<dyn Surface>, stylesheet: String) -> Self {
        Self {
            port,
            store,
            hooks: HookState::default(),
            surface,
            stylesheet,
            views: HashMap::new(),
            overrides: HashMap::new(),
            rerender: false,
        }
    }

    pub fn generation(&self) -> Generation {
        self.port.generation()
    }

    pub fn request_render(&mut self) {
        self.rerender = true;
    }

    pub fn take_render_request(&mut self) -> bool {
        std::mem::take(&mut self.rerender)
    }

    /// Post the complete item list of `key` to the host.
    pub fn emit_commit(&self, key: &str) {
        let items = self.store.serialize_items(key);
        debug!(generation = %self.generation(), datasource = %key, items = items.len(), "datasource commit");
        self.port.post(SandboxMessage::DatasourceCommit {
            datasource_key: key.to_string(),
            items,
        });
    }

    pub fn component_frame(&self, root: RenderNode) -> Frame {
        Frame::Component {
            generation: self.generation(),
            stylesheet: self.stylesheet.clone(),
            root,
        }
    }
}

pub fn context_mut(lua: &Lua) -> mlua::Result<AppDataRefMut<'_, SandboxContext>> {
    lua.app_data_mut::<SandboxContext>()
        .ok_or_else(|| mlua::Error::runtime("No sandbox context"))
}

/// Paint `root` on the sandbox surface.
pub fn paint(lua: &Lua, root: RenderNode) -> mlua::Result<()> {
    let (surface, frame) = {
        let ctx = context_mut(lua)?;
        (Arc::clone(&ctx.surface), ctx.component_frame(root))
    };
    surface.paint(frame);
    Ok(())
}
