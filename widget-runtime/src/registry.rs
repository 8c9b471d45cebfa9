//! Several live previews side by side, keyed by a caller-chosen preview id.

use dashmap::DashMap;
use std::sync::Arc;

use crate::bundle::BundleHandle;
use crate::bridge::Generation;
use crate::config::SandboxConfig;
use crate::error::SandboxResult;
use crate::lifecycle::WidgetHost;
use crate::render::Surface;

/// Preview id -> host of that preview.
pub type PreviewStore = Arc<DashMap<String, WidgetHost>>;

pub fn new_preview_store() -> PreviewStore {
    Arc::new(DashMap::new())
}

/// Open (or reopen) a preview with `config` and `surface`.
///
/// An existing preview under `id` is destroyed and replaced, so the new config and
/// surface always apply. Generations keep counting up across the replacement.
pub fn open_preview(
    store: &PreviewStore,
    id: &str,
    config: SandboxConfig,
    surface: Arc<dyn Surface>,
    bundle: BundleHandle,
) -> SandboxResult<Generation> {
    let previous = store.remove(id).map(|(_, mut host)| {
        host.destroy();
        host.generation()
    });
    let mut host = WidgetHost::new(config, surface);
    if let Some(generation) = previous {
        host.resume_after(generation);
    }
    let generation = host.load(bundle)?;
    store.insert(id.to_string(), host);
    Ok(generation)
}

/// Destroy and forget a preview. Returns false when `id` was not open.
pub fn close_preview(store: &PreviewStore, id: &str) -> bool {
    match store.remove(id) {
        Some((_, mut host)) => {
            host.destroy();
            true
        }
        None => false,
    }
}

/// Run `f` against an open preview.
pub fn with_preview<R>(store: &PreviewStore, id: &str, f: impl FnOnce(&mut WidgetHost) -> R) -> Option<R> {
    store.get_mut(id).map(|mut host| f(&mut host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleState;
    use crate::render::FrameRecorder;

    #[test]
    fn test_open_reload_close() {
        let store = new_preview_store();
        let surface: Arc<dyn Surface> = Arc::new(FrameRecorder::new());
        let bundle = BundleHandle::new("Foo = function() return 'x' end", "", "Foo", "Foo");

        let first = open_preview(&store, "a", SandboxConfig::default(), Arc::clone(&surface), bundle.clone()).unwrap();
        let second = open_preview(&store, "a", SandboxConfig::default(), Arc::clone(&surface), bundle).unwrap();
        assert!(second > first);
        assert_eq!(store.len(), 1);

        let state = with_preview(&store, "a", |host| host.state());
        assert_eq!(state, Some(LifecycleState::Loading));
        assert!(with_preview(&store, "missing", |host| host.state()).is_none());

        assert!(close_preview(&store, "a"));
        assert!(!close_preview(&store, "a"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_reopen_applies_new_config_and_surface() {
        let store = new_preview_store();
        let second_surface = FrameRecorder::new();
        let bundle = BundleHandle::new("Foo = function() return 'x' end", "", "Foo", "Foo");
        let missing = BundleHandle::new("Bar = function() end", "", "Foo", "Foo");

        let first = open_preview(&store, "a", SandboxConfig::default(), Arc::new(FrameRecorder::new()), bundle).unwrap();
        let config = SandboxConfig {
            max_rerenders: 3,
            ..SandboxConfig::default()
        };
        let second = open_preview(&store, "a", config.clone(), Arc::new(second_surface.clone()), missing).unwrap();
        assert!(second > first);
        assert_eq!(with_preview(&store, "a", |host| host.config().clone()), Some(config));

        // The failing bundle paints its error panel on the surface passed on reopen.
        for _ in 0..500 {
            if !second_surface.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(second_surface.last().is_some_and(|frame| frame.is_error()));
    }
}
