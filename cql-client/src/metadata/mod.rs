//! Cluster metadata: known hosts and the schema view.

mod host;
mod keyspace;

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock as StdRwLock, Weak};

use async_trait::async_trait;
use cql_core::{Result, Rows};
use tokio::sync::RwLock;
use tracing::{debug, trace};

pub use host::{Host, HostState};
pub use keyspace::{ColumnMetadata, KeyspaceMetadata, TableMetadata};

use keyspace::{build_keyspaces, build_tables};

use crate::listener::HostStateListener;

/// The cluster metadata store the control connection feeds.
#[async_trait]
pub trait ClusterMetadata: Send + Sync {
    /// Returns every known host.
    async fn all_hosts(&self) -> Vec<Arc<Host>>;

    /// Looks up a host by address.
    async fn get_host(&self, address: SocketAddr) -> Option<Arc<Host>>;

    /// Adds a host, returning the stored record. Adding a known address
    /// returns the existing record unchanged.
    async fn add_host(&self, address: SocketAddr, dynamically_discovered: bool) -> Arc<Host>;

    /// Removes a host. Returns `false` if the host was not known.
    async fn remove_host(&self, host: &Arc<Host>) -> bool;

    /// Replaces the schema view covered by the given scope with the survey
    /// rows.
    ///
    /// `keyspaces` is `None` when the scope names a single table. A keyspace
    /// or table absent from the rows is dropped from the view.
    async fn rebuild_schema(
        &self,
        keyspace: Option<&str>,
        table: Option<&str>,
        keyspaces: Option<Rows>,
        column_families: Rows,
        columns: Rows,
    ) -> Result<()>;
}

/// In-memory [`ClusterMetadata`] store.
#[derive(Default)]
pub struct Metadata {
    hosts: RwLock<HashMap<SocketAddr, Arc<Host>>>,
    keyspaces: RwLock<BTreeMap<String, KeyspaceMetadata>>,
    listeners: StdRwLock<Vec<Weak<dyn HostStateListener>>>,
}

impl Metadata {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the contact points.
    pub fn with_contact_points(contact_points: impl IntoIterator<Item = SocketAddr>) -> Self {
        let hosts = contact_points
            .into_iter()
            .map(|address| (address, Arc::new(Host::new(address))))
            .collect();
        Self {
            hosts: RwLock::new(hosts),
            ..Self::default()
        }
    }

    /// Registers a listener for host additions and removals.
    ///
    /// The store only keeps a weak reference; the listener stops receiving
    /// notifications once the caller drops it.
    pub fn register_listener(&self, listener: &Arc<dyn HostStateListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(listener));
    }

    /// Returns a keyspace by name.
    pub async fn keyspace(&self, name: &str) -> Option<KeyspaceMetadata> {
        self.keyspaces.read().await.get(name).cloned()
    }

    /// Returns every keyspace, ordered by name.
    pub async fn keyspaces(&self) -> Vec<KeyspaceMetadata> {
        self.keyspaces.read().await.values().cloned().collect()
    }

    fn notify(&self, f: impl Fn(&dyn HostStateListener)) {
        let listeners: Vec<_> = {
            let mut registered = self
                .listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            registered.retain(|l| l.strong_count() > 0);
            registered.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            f(listener.as_ref());
        }
    }
}

impl std::fmt::Debug for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metadata").finish_non_exhaustive()
    }
}

#[async_trait]
impl ClusterMetadata for Metadata {
    async fn all_hosts(&self) -> Vec<Arc<Host>> {
        self.hosts.read().await.values().cloned().collect()
    }

    async fn get_host(&self, address: SocketAddr) -> Option<Arc<Host>> {
        self.hosts.read().await.get(&address).cloned()
    }

    async fn add_host(&self, address: SocketAddr, dynamically_discovered: bool) -> Arc<Host> {
        let (host, added) = {
            let mut hosts = self.hosts.write().await;
            match hosts.get(&address) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let host = Arc::new(Host::new(address));
                    hosts.insert(address, Arc::clone(&host));
                    (host, true)
                }
            }
        };
        if added {
            debug!(address = %address, dynamically_discovered, "host added");
            self.notify(|l| l.on_add(&host));
        }
        host
    }

    async fn remove_host(&self, host: &Arc<Host>) -> bool {
        let removed = self.hosts.write().await.remove(&host.address());
        match removed {
            Some(removed) => {
                debug!(address = %removed.address(), "host removed");
                self.notify(|l| l.on_remove(&removed));
                true
            }
            None => false,
        }
    }

    async fn rebuild_schema(
        &self,
        keyspace: Option<&str>,
        table: Option<&str>,
        keyspaces: Option<Rows>,
        column_families: Rows,
        columns: Rows,
    ) -> Result<()> {
        let mut tables = build_tables(&column_families, &columns)?;
        let rebuilt = match &keyspaces {
            Some(rows) => Some(build_keyspaces(rows, std::mem::take(&mut tables))?),
            None => None,
        };

        let mut view = self.keyspaces.write().await;
        match (keyspace, table) {
            (None, _) => {
                *view = rebuilt.unwrap_or_default();
                trace!(keyspaces = view.len(), "schema rebuilt");
            }
            (Some(name), None) => {
                view.remove(name);
                if let Some(ks) = rebuilt.and_then(|mut r| r.remove(name)) {
                    view.insert(name.to_string(), ks);
                }
                trace!(keyspace = name, "keyspace rebuilt");
            }
            (Some(name), Some(table_name)) => {
                let Some(ks) = view.get_mut(name) else {
                    debug!(keyspace = name, table = table_name, "table refresh for unknown keyspace ignored");
                    return Ok(());
                };
                match tables.get_mut(name).and_then(|t| t.remove(table_name)) {
                    Some(table) => ks.replace_table(table),
                    None => {
                        ks.remove_table(table_name);
                    }
                }
                trace!(keyspace = name, table = table_name, "table rebuilt");
            }
        }
        Ok(())
    }
}
