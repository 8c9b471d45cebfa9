//! Compiled widget bundles.

use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of one bundle build. Two builds of the same text get different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BundleId(Uuid);

impl BundleId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Script + stylesheet of one compiled widget. Immutable; clones share the text.
#[derive(Debug, Clone)]
pub struct BundleHandle {
    id: BundleId,
    script: Arc<str>,
    stylesheet: Arc<str>,
    component_name: String,
    component_id: String,
}

impl BundleHandle {
    pub fn new(
        script: impl Into<Arc<str>>,
        stylesheet: impl Into<Arc<str>>,
        component_name: impl Into<String>,
        component_id: impl Into<String>,
    ) -> Self {
        Self {
            id: BundleId::new(),
            script: script.into(),
            stylesheet: stylesheet.into(),
            component_name: component_name.into(),
            component_id: component_id.into(),
        }
    }

    pub fn id(&self) -> BundleId {
        self.id
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn stylesheet(&self) -> &str {
        &self.stylesheet
    }

    pub fn component_name(&self) -> &str {
        &self.component_name
    }

    pub fn component_id(&self) -> &str {
        &self.component_id
    }

    /// SHA-256 over script and stylesheet, hex encoded.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.script.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.stylesheet.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_per_build_not_per_content() {
        let a = BundleHandle::new("Foo = 1", "", "Foo", "com.example.Foo");
        let b = BundleHandle::new("Foo = 1", "", "Foo", "com.example.Foo");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn test_digest_covers_stylesheet() {
        let a = BundleHandle::new("x", ".a{}", "X", "X");
        let b = BundleHandle::new("x", ".b{}", "X", "X");
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }
}
