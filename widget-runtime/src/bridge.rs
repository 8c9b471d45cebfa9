//! Typed messages across the sandbox boundary.
//!
//! Every message travels inside an [`Envelope`] tagged with the sandbox
//! generation that produced (or is meant to receive) it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use widget_spec::PropertySpec;

use crate::error::FailureKind;
use crate::mapping::MappedProps;

/// Sandbox instance counter. Bumped on every (re)load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);

    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Host → sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    /// Fully replaces the component's props. Safe to repeat.
    UpdateProperties {
        properties: MappedProps,
        spec: PropertySpec,
    },
}

/// Sandbox → host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SandboxMessage {
    /// Bundle evaluated and component resolved. Sent once per generation.
    IframeReady,
    /// Complete item list of one datasource after a mutation.
    #[serde(rename_all = "camelCase")]
    DatasourceCommit {
        datasource_key: String,
        items: Vec<Value>,
    },
    /// The sandbox failed and is showing an error panel.
    SandboxFailed { kind: FailureKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<M> {
    pub generation: Generation,
    pub message: M,
}

pub type HostInbox = UnboundedReceiver<Envelope<SandboxMessage>>;
pub type SandboxInbox = UnboundedReceiver<Envelope<HostMessage>>;

/// Shared inbox of the host. Outlives sandbox generations.
pub fn host_inbox() -> (UnboundedSender<Envelope<SandboxMessage>>, HostInbox) {
    mpsc::unbounded_channel()
}

/// Sending half owned by one sandbox generation.
#[derive(Debug, Clone)]
pub struct SandboxPort {
    generation: Generation,
    tx: UnboundedSender<Envelope<SandboxMessage>>,
}

impl SandboxPort {
    pub fn new(generation: Generation, tx: UnboundedSender<Envelope<SandboxMessage>>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Fire and forget. Returns false once the host is gone.
    pub fn post(&self, message: SandboxMessage) -> bool {
        self.tx
            .send(Envelope {
                generation: self.generation,
                message,
            })
            .is_ok()
    }
}

/// Host → sandbox channel of one generation. Dropping it ends the sandbox loop.
#[derive(Debug)]
pub struct HostPort {
    generation: Generation,
    tx: UnboundedSender<Envelope<HostMessage>>,
}

impl HostPort {
    pub fn open(generation: Generation) -> (Self, SandboxInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { generation, tx }, rx)
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn post(&self, message: HostMessage) -> bool {
        self.tx
            .send(Envelope {
                generation: self.generation,
                message,
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generation_ordering() {
        let g = Generation::ZERO.next();
        assert!(g.next() > g);
        assert_eq!(g.next().value(), 2);
        assert_eq!(g.to_string(), "gen-1");
    }

    #[test]
    fn test_sandbox_message_wire_shape() {
        let msg = SandboxMessage::DatasourceCommit {
            datasource_key: "ds".into(),
            items: vec![json!({"name": "a"})],
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "datasourceCommit", "datasourceKey": "ds", "items": [{"name": "a"}]})
        );
        assert_eq!(
            serde_json::to_value(SandboxMessage::IframeReady).unwrap(),
            json!({"type": "iframeReady"})
        );
    }

    #[test]
    fn test_port_tags_generation() {
        let (tx, mut rx) = host_inbox();
        let port = SandboxPort::new(Generation::ZERO.next(), tx);
        assert!(port.post(SandboxMessage::IframeReady));
        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.generation, Generation::ZERO.next());
        assert_eq!(envelope.message, SandboxMessage::IframeReady);

        drop(rx);
        assert!(!port.post(SandboxMessage::IframeReady));
    }

    #[test]
    fn test_host_port_closed_when_sandbox_gone() {
        let (port, rx) = HostPort::open(Generation::ZERO);
        drop(rx);
        assert!(!port.post(HostMessage::UpdateProperties {
            properties: MappedProps::new(),
            spec: PropertySpec::default(),
        }));
    }
}
