//! Node list refresh from the `system.peers` table.

use std::collections::{BTreeSet, HashSet};
use std::net::SocketAddr;

use cql_core::{Request, Result, Rows};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::connection::{await_or_cancel, Awaited, Connection};
use crate::metadata::ClusterMetadata;

/// Lists the other nodes of the cluster as seen by the connected node.
pub const SELECT_PEERS: &str = "SELECT peer FROM system.peers";

/// Hosts to add to and remove from the metadata store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyDiff {
    /// Hosts found in the survey but not yet known.
    pub to_add: BTreeSet<SocketAddr>,
    /// Known hosts absent from the survey.
    pub to_remove: BTreeSet<SocketAddr>,
}

impl TopologyDiff {
    /// Computes the changes that turn `known` into `found`.
    pub fn compute(found: &HashSet<SocketAddr>, known: &HashSet<SocketAddr>) -> Self {
        Self {
            to_add: found.difference(known).copied().collect(),
            to_remove: known.difference(found).copied().collect(),
        }
    }

    /// Returns `true` if the survey matched the known hosts.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Builds the set of live hosts from the peers survey.
///
/// The connected node is always part of the set. Peers are addressed on
/// `port`; rows with a null peer are skipped.
pub fn found_hosts(connected: SocketAddr, peers: &Rows, port: u16) -> Result<HashSet<SocketAddr>> {
    let mut found = HashSet::with_capacity(peers.len() + 1);
    found.insert(connected);
    for row in peers {
        match row.get_inet("peer")? {
            Some(ip) => {
                found.insert(SocketAddr::new(ip, port));
            }
            None => warn!("skipping peer row with null address"),
        }
    }
    Ok(found)
}

/// Reconciles the metadata store's host list with the peers survey.
#[instrument(name = "control_connection.refresh_nodes", skip_all, fields(address = %connection.address()))]
pub async fn refresh(
    connection: &dyn Connection,
    metadata: &dyn ClusterMetadata,
    port: u16,
    cancel: &CancellationToken,
) -> Result<Awaited<TopologyDiff>> {
    let response = match await_or_cancel(cancel, connection.send(Request::query(SELECT_PEERS))).await? {
        Awaited::Ready(response) => response,
        Awaited::Cancelled => return Ok(Awaited::Cancelled),
    };
    let peers = response.into_rows()?;
    let found = found_hosts(connection.address(), &peers, port)?;
    let known: HashSet<SocketAddr> = metadata
        .all_hosts()
        .await
        .iter()
        .map(|host| host.address())
        .collect();

    let diff = TopologyDiff::compute(&found, &known);
    for address in &diff.to_add {
        debug!(host = %address, "adding newly discovered host");
        metadata.add_host(*address, true).await;
    }
    for address in &diff.to_remove {
        if let Some(host) = metadata.get_host(*address).await {
            debug!(host = %address, "removing host absent from peers");
            metadata.remove_host(&host).await;
        }
    }
    Ok(Awaited::Ready(diff))
}
