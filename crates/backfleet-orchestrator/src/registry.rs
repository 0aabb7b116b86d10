use backfleet_common::{Backend, BoundBackend, FleetError, Result, Topology, TrafficType};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Live mapping from backend name to the port its worker registered.
///
/// The port map is a `DashMap`, so readers never wait on the registration
/// lock held by the metadata server. Listings walk the topology rather than
/// the map, which keeps them in enumeration order and makes an unbound
/// backend visible as [`FleetError::NotReady`].
pub struct Registry {
    topology: Arc<Topology>,
    ports: DashMap<String, u16>,
}

impl Registry {
    pub fn new(topology: Arc<Topology>) -> Self {
        Self {
            topology,
            ports: DashMap::new(),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Records a port for `name`, returning the port it replaces, if any.
    pub fn store(&self, name: &str, port: u16) -> Option<u16> {
        self.ports.insert(name.to_string(), port)
    }

    /// Port registered for `name`.
    pub fn port(&self, name: &str) -> Option<u16> {
        self.ports.get(name).map(|entry| *entry.value())
    }

    /// Number of distinct names with a port.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Resolves a topology backend to its bound form.
    pub fn bound(&self, backend: &Backend) -> Result<BoundBackend> {
        self.port(&backend.name)
            .map(|port| backend.bind(port))
            .ok_or_else(|| FleetError::NotReady(backend.name.clone()))
    }

    /// Bound backends of one traffic type, or of all types when `scope` is `None`.
    ///
    /// Fails with `NotReady` on the first backend that has not registered.
    pub fn list(&self, scope: Option<TrafficType>) -> Result<Vec<BoundBackend>> {
        match scope {
            Some(t) => self.topology.backends(t).iter().map(|b| self.bound(b)).collect(),
            None => self.topology.iter().map(|b| self.bound(b)).collect(),
        }
    }

    /// Every bound backend grouped by traffic type.
    pub fn by_traffic_type(&self) -> Result<BTreeMap<TrafficType, Vec<BoundBackend>>> {
        TrafficType::ALL
            .into_iter()
            .map(|t| self.list(Some(t)).map(|bound| (t, bound)))
            .collect()
    }

    /// Plain-text listing, one `host_addr name port traffic_type` line per backend.
    pub fn render_text(&self, scope: Option<TrafficType>) -> Result<String> {
        let mut out = String::new();
        for bound in self.list(scope)? {
            out.push_str(&bound.to_string());
            out.push('\n');
        }
        Ok(out)
    }

    /// Pretty-printed JSON object keyed by traffic type.
    pub fn render_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.by_traffic_type()?)?)
    }
}
