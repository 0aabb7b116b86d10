//! Backend Topology
//!
//! The set of backends for one run is pure arithmetic over the configuration:
//! one backend per (traffic type, ordinal) pair, named
//! `{prefix}-{traffic_type}-{ordinal}`.

use std::collections::BTreeMap;

use crate::backend::{Backend, TrafficType};

/// Every backend of a run, grouped by traffic type in enumeration order.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    by_traffic_type: BTreeMap<TrafficType, Vec<Backend>>,
}

impl Topology {
    /// Enumerates `per_type` backends for each traffic type.
    ///
    /// # Arguments
    /// * `host_addr` - Address every backend is reachable on
    /// * `prefix` - Prefix for backend names
    /// * `per_type` - Number of backends per traffic type
    pub fn enumerate(host_addr: &str, prefix: &str, per_type: usize) -> Self {
        let by_traffic_type = TrafficType::ALL
            .into_iter()
            .map(|t| {
                let backends = (0..per_type)
                    .map(|i| Backend::new(host_addr, format!("{}-{}-{}", prefix, t, i), t))
                    .collect();
                (t, backends)
            })
            .collect();

        Self { by_traffic_type }
    }

    /// Backends of one traffic type, in ordinal order.
    pub fn backends(&self, traffic_type: TrafficType) -> &[Backend] {
        self.by_traffic_type
            .get(&traffic_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All backends, traffic types in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = &Backend> {
        self.by_traffic_type.values().flatten()
    }

    /// Looks a backend up by name.
    pub fn get(&self, name: &str) -> Option<&Backend> {
        self.iter().find(|b| b.name == name)
    }

    /// Total number of backends, i.e. the number of registrations to wait for.
    pub fn len(&self) -> usize {
        self.by_traffic_type.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
