//! Replica identity.
//!
//! # Responsibilities
//! - Represent a single backing database
//! - Carry the connection parameters a Connector needs
//! - Compare and hash by id only

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ReplicaConfig;

/// Identifier of a replica, unique within its cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReplicaId(String);

impl ReplicaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ReplicaId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ReplicaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct ReplicaInner {
    id: ReplicaId,
    location: Url,
    weight: u32,
    properties: BTreeMap<String, String>,
}

/// A single backing database participating in a cluster.
///
/// Cloning is cheap; all clones share the same immutable parameters.
#[derive(Clone)]
pub struct Replica {
    inner: Arc<ReplicaInner>,
}

impl Replica {
    /// Create a replica with weight 1 and no extra properties.
    pub fn new(id: impl Into<ReplicaId>, location: Url) -> Self {
        Self::with_parameters(id, location, 1, BTreeMap::new())
    }

    pub fn with_parameters(
        id: impl Into<ReplicaId>,
        location: Url,
        weight: u32,
        properties: BTreeMap<String, String>,
    ) -> Self {
        Self {
            inner: Arc::new(ReplicaInner {
                id: id.into(),
                location,
                weight,
                properties,
            }),
        }
    }

    /// Build a replica from its configuration entry.
    pub fn from_config(config: &ReplicaConfig) -> Result<Self, url::ParseError> {
        let location = Url::parse(&config.location)?;
        Ok(Self::with_parameters(
            config.id.as_str(),
            location,
            config.weight,
            config.properties.clone(),
        ))
    }

    pub fn id(&self) -> &ReplicaId {
        &self.inner.id
    }

    /// Connection URL of the backing database.
    pub fn location(&self) -> &Url {
        &self.inner.location
    }

    /// Relative read weight used by the weighted balancers.
    pub fn weight(&self) -> u32 {
        self.inner.weight
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.inner.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.inner.properties
    }

    /// Resolve host and port of the location, if it names one.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.inner
            .location
            .socket_addrs(|| None)
            .ok()
            .and_then(|addrs| addrs.into_iter().next())
    }
}

impl PartialEq for Replica {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Replica {}

impl Hash for Replica {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replica")
            .field("id", &self.inner.id.as_str())
            .field("location", &self.inner.location.as_str())
            .field("weight", &self.inner.weight)
            .finish()
    }
}

impl fmt::Display for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner.id, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_is_by_id_only() {
        let a = Replica::new("db1", Url::parse("postgres://10.0.0.1:5432/app").unwrap());
        let b = Replica::with_parameters(
            "db1",
            Url::parse("postgres://10.0.0.2:5432/app").unwrap(),
            5,
            BTreeMap::new(),
        );
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn socket_addr_from_location() {
        let r = Replica::new("db1", Url::parse("tcp://127.0.0.1:5432").unwrap());
        assert_eq!(r.socket_addr(), Some("127.0.0.1:5432".parse().unwrap()));

        let no_port = Replica::new("db2", Url::parse("mock://a").unwrap());
        assert_eq!(no_port.socket_addr(), None);
    }

    #[test]
    fn from_config_rejects_bad_url() {
        let config = ReplicaConfig {
            id: "db1".into(),
            location: "not a url".into(),
            weight: 1,
            properties: BTreeMap::new(),
        };
        assert!(Replica::from_config(&config).is_err());
    }
}
