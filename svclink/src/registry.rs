//! Process-level registry of live control instances.

use std::sync::Arc;

use dashmap::DashMap;

use crate::control::{ControlConfig, ServiceControl};
use crate::ident::{OwnerId, ServiceKind};

/// Registry key: at most one live instance per (owner, kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControlKey {
    pub owner: OwnerId,
    pub kind: ServiceKind,
}

/// Lookup of live control instances, owned by the embedding application
/// rather than hidden behind a process-wide singleton.
///
/// Lookup, insert, and remove are concurrent-safe; a removed instance stays
/// alive until the last handle to it drops, so removal races with teardown
/// are harmless.
#[derive(Default)]
pub struct ControlRegistry {
    instances: DashMap<ControlKey, Arc<ServiceControl>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live instance for the config's (owner, kind), created on first
    /// use. Later calls for the same key return the existing instance and
    /// drop their config.
    pub fn open(&self, config: ControlConfig) -> Arc<ServiceControl> {
        let key = ControlKey {
            owner: config.owner(),
            kind: config.kind().clone(),
        };
        self.instances
            .entry(key)
            .or_insert_with(|| Arc::new(ServiceControl::new(config)))
            .clone()
    }

    pub fn get(&self, owner: OwnerId, kind: &ServiceKind) -> Option<Arc<ServiceControl>> {
        let key = ControlKey {
            owner,
            kind: kind.clone(),
        };
        self.instances.get(&key).map(|entry| Arc::clone(&entry))
    }

    /// Drop the registry's handle to the instance. In-flight operations on
    /// other handles are unaffected; none of their completions are
    /// guaranteed once the last handle goes away.
    pub fn remove(&self, owner: OwnerId, kind: &ServiceKind) -> Option<Arc<ServiceControl>> {
        let key = ControlKey {
            owner,
            kind: kind.clone(),
        };
        self.instances.remove(&key).map(|(_, instance)| instance)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
