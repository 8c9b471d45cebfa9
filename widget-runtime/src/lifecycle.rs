//! Host side of one preview: owns the current sandbox generation.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};
use widget_spec::{PropertySpec, PropertyValueMap};

use crate::bridge::{host_inbox, Envelope, Generation, HostInbox, HostMessage, HostPort, SandboxMessage, SandboxPort};
use crate::bundle::BundleHandle;
use crate::config::SandboxConfig;
use crate::error::{FailureKind, SandboxError, SandboxResult};
use crate::mapping::map_properties;
use crate::render::Surface;
use crate::sandbox::spawn_sandbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleState {
    Empty,
    Loading,
    Ready,
    Destroyed,
}

/// What the host learns from the current sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    Ready { generation: Generation },
    /// Merge `items_json` back into the value map under `datasource_key`.
    #[serde(rename_all = "camelCase")]
    DatasourceCommit { datasource_key: String, items_json: String },
    Failed { kind: FailureKind, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Stored; delivered once the sandbox reports ready.
    Deferred,
}

pub struct WidgetHost {
    config: SandboxConfig,
    surface: Arc<dyn Surface>,
    state: LifecycleState,
    generation: Generation,
    bundle: Option<BundleHandle>,
    port: Option<HostPort>,
    inbox_tx: UnboundedSender<Envelope<SandboxMessage>>,
    inbox: HostInbox,
    latest: Option<(PropertySpec, PropertyValueMap)>,
}

impl WidgetHost {
    pub fn new(config: SandboxConfig, surface: Arc<dyn Surface>) -> Self {
        let (inbox_tx, inbox) = host_inbox();
        Self {
            config,
            surface,
            state: LifecycleState::Empty,
            generation: Generation::ZERO,
            bundle: None,
            port: None,
            inbox_tx,
            inbox,
            latest: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn bundle(&self) -> Option<&BundleHandle> {
        self.bundle.as_ref()
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Continue generation numbering after a host this one replaces.
    pub fn resume_after(&mut self, generation: Generation) {
        if generation > self.generation {
            self.generation = generation;
        }
    }

    /// Tear down whatever runs and start a fresh sandbox for `bundle`.
    pub fn load(&mut self, bundle: BundleHandle) -> SandboxResult<Generation> {
        if self.state == LifecycleState::Destroyed {
            return Err(SandboxError::SandboxClosed);
        }
        self.teardown();

        let digest = bundle.digest();
        if self.bundle.as_ref().map(BundleHandle::digest).as_deref() == Some(digest.as_str()) {
            debug!(digest = %digest, "rebuilding sandbox for identical bundle content");
        }

        let generation = self.generation.next();
        let (port, sandbox_inbox) = HostPort::open(generation);
        spawn_sandbox(
            bundle.clone(),
            self.config.clone(),
            Arc::clone(&self.surface),
            SandboxPort::new(generation, self.inbox_tx.clone()),
            sandbox_inbox,
        )?;

        info!(%generation, bundle = %bundle.id(), component = %bundle.component_name(), "sandbox loading");
        self.generation = generation;
        self.port = Some(port);
        self.bundle = Some(bundle);
        self.state = LifecycleState::Loading;
        Ok(generation)
    }

    /// Send new props, or keep them until the sandbox is ready.
    pub fn set_properties(&mut self, spec: PropertySpec, values: PropertyValueMap) -> SandboxResult<Delivery> {
        if self.state == LifecycleState::Destroyed {
            return Err(SandboxError::SandboxClosed);
        }
        self.latest = Some((spec, values));
        if self.state == LifecycleState::Ready {
            self.deliver();
            Ok(Delivery::Sent)
        } else {
            debug!(state = ?self.state, "properties deferred until sandbox is ready");
            Ok(Delivery::Deferred)
        }
    }

    fn deliver(&self) {
        let (Some(port), Some((spec, values))) = (&self.port, &self.latest) else {
            return;
        };
        let properties = map_properties(values, spec);
        if !port.post(HostMessage::UpdateProperties {
            properties,
            spec: spec.clone(),
        }) {
            debug!(generation = %port.generation(), "sandbox gone, update dropped");
        }
    }

    /// Wait for the next event of the current generation.
    pub async fn next_event(&mut self) -> Option<HostEvent> {
        loop {
            let envelope = self.inbox.recv().await?;
            if let Some(event) = self.handle_envelope(envelope) {
                return Some(event);
            }
        }
    }

    /// Non-blocking variant of [`WidgetHost::next_event`].
    pub fn try_next_event(&mut self) -> Option<HostEvent> {
        while let Ok(envelope) = self.inbox.try_recv() {
            if let Some(event) = self.handle_envelope(envelope) {
                return Some(event);
            }
        }
        None
    }

    /// Messages from torn-down generations are dropped here.
    pub fn handle_envelope(&mut self, envelope: Envelope<SandboxMessage>) -> Option<HostEvent> {
        if envelope.generation != self.generation || self.state == LifecycleState::Destroyed {
            debug!(got = %envelope.generation, current = %self.generation, "stale sandbox message ignored");
            return None;
        }
        match envelope.message {
            SandboxMessage::IframeReady => {
                if self.state == LifecycleState::Loading {
                    self.state = LifecycleState::Ready;
                    self.deliver();
                }
                Some(HostEvent::Ready {
                    generation: envelope.generation,
                })
            }
            SandboxMessage::DatasourceCommit {
                datasource_key,
                items,
            } => {
                let items_json = serde_json::Value::Array(items).to_string();
                Some(HostEvent::DatasourceCommit {
                    datasource_key,
                    items_json,
                })
            }
            SandboxMessage::SandboxFailed { kind, message } => Some(HostEvent::Failed { kind, message }),
        }
    }

    /// Discard the sandbox for good. In-sandbox state is lost.
    pub fn destroy(&mut self) {
        self.teardown();
        self.latest = None;
        self.state = LifecycleState::Destroyed;
        info!(generation = %self.generation, "sandbox destroyed");
    }

    /// Dropping the port closes the sandbox's inbox; its thread exits on its own.
    fn teardown(&mut self) {
        if let Some(port) = self.port.take() {
            debug!(generation = %port.generation(), "sandbox torn down");
        }
    }
}
