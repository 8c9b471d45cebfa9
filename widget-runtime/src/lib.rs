//! # Widget sandbox runtime
//!
//! Runs an untrusted widget bundle (Luau script + stylesheet) inside a sandboxed
//! VM on its own thread, feeds it props mapped from a [`widget_spec::PropertySpec`]
//! and a caller value map, and reports data mutations back as datasource commits.
//!
//! ```ignore
//! use std::sync::Arc;
//! use widget_runtime::{BundleHandle, FrameRecorder, HostEvent, SandboxConfig, WidgetHost};
//!
//! let surface = FrameRecorder::new();
//! let mut host = WidgetHost::new(SandboxConfig::default(), Arc::new(surface.clone()));
//! host.load(BundleHandle::new(script, "", "Foo", "com.example.Foo"))?;
//! host.set_properties(spec, values)?; // deferred until ready
//! while let Some(event) = host.next_event().await {
//!     if let HostEvent::DatasourceCommit { datasource_key, items_json } = event {
//!         values = widget_spec::merge_datasource_commit(&values, &datasource_key, &items_json);
//!     }
//! }
//! ```

pub mod bridge;
pub mod bundle;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod lua_api;
pub mod mapping;
pub mod mock_data;
pub mod registry;
pub mod render;
pub mod sandbox;
pub mod shim;

pub use bridge::{Envelope, Generation, HostMessage, SandboxMessage};
pub use bundle::{BundleHandle, BundleId};
pub use config::SandboxConfig;
pub use error::{FailureKind, MockDataError, SandboxError, SandboxResult};
pub use lifecycle::{Delivery, HostEvent, LifecycleState, WidgetHost};
pub use mapping::{map_properties, strategy_for, MappedProps, MappedValue, MappingStrategy};
pub use mock_data::{MockObject, MockStore};
pub use registry::{close_preview, new_preview_store, open_preview, with_preview, PreviewStore};
pub use render::{Frame, FrameRecorder, RenderNode, Surface};
pub use shim::{ComponentRef, ModuleLoader, Resolution};
