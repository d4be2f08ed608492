//! Common test utilities for integration tests: a scripted in-memory cluster
//! standing in for real nodes.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cql_client::cluster::topology::SELECT_PEERS;
use cql_client::connection::{Connection, ConnectionFactory, ConnectionId};
use cql_client::listener::HostStateListener;
use cql_client::metadata::{Host, Metadata};
use cql_client::policy::{LoadBalancingPolicy, QueryPlan};
use cql_client::{ClientConfig, ControlConnection, ExponentialReconnectionPolicy};
use cql_core::protocol::value;
use cql_core::{CqlError, Request, Response, Result, Rows};

pub fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

pub const NODE_A: &str = "10.0.0.1:9042";
pub const NODE_B: &str = "10.0.0.2:9042";
pub const NODE_C: &str = "10.0.0.3:9042";
pub const NODE_D: &str = "10.0.0.4:9042";

#[derive(Debug, Clone, Default)]
struct NodeScript {
    unreachable: bool,
    hanging: bool,
    peers: Vec<Option<IpAddr>>,
    schema_error: bool,
    broken_on_open: bool,
    delays: Vec<(String, Duration)>,
}

#[derive(Debug, Default)]
struct ClusterState {
    nodes: Mutex<HashMap<SocketAddr, NodeScript>>,
    opened: Mutex<Vec<Arc<MockConnection>>>,
    open_attempts: Mutex<Vec<SocketAddr>>,
    keyspaces: Mutex<Vec<String>>,
}

impl ClusterState {
    fn script(&self, address: SocketAddr) -> NodeScript {
        self.nodes
            .lock()
            .unwrap()
            .get(&address)
            .cloned()
            .unwrap_or(NodeScript {
                unreachable: true,
                ..NodeScript::default()
            })
    }

    fn answer(&self, address: SocketAddr, cql: &str) -> Response {
        let script = self.script(address);
        if cql.starts_with(SELECT_PEERS) {
            return Response::Rows(Rows::new(
                vec!["peer".to_string()],
                script
                    .peers
                    .iter()
                    .map(|ip| vec![ip.map(value::inet)])
                    .collect(),
            ));
        }
        if script.schema_error {
            return Response::Error {
                code: 0x2200,
                message: "unconfigured columnfamily".to_string(),
            };
        }
        if cql.starts_with("SELECT * FROM system.schema_keyspaces") {
            let keyspaces = self.keyspaces.lock().unwrap().clone();
            return Response::Rows(Rows::new(
                vec!["keyspace_name".to_string(), "durable_writes".to_string()],
                keyspaces
                    .iter()
                    .map(|ks| vec![Some(value::text(ks)), Some(value::boolean(true))])
                    .collect(),
            ));
        }
        if cql.starts_with("SELECT * FROM system.schema_") {
            return Response::Rows(Rows::default());
        }
        Response::Error {
            code: 0x2000,
            message: format!("unexpected statement: {}", cql),
        }
    }
}

/// Scripted connection factory. Unknown addresses are unreachable.
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    state: Arc<ClusterState>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a reachable node with the given peers.
    pub fn add_node(&self, address: &str, peers: &[&str]) -> &Self {
        let peers = peers
            .iter()
            .map(|p| Some(addr(p).ip()))
            .collect();
        self.state.nodes.lock().unwrap().insert(
            addr(address),
            NodeScript {
                peers,
                ..NodeScript::default()
            },
        );
        self
    }

    pub fn set_peers(&self, address: &str, peers: Vec<Option<IpAddr>>) {
        self.update(address, |n| n.peers = peers);
    }

    pub fn set_reachable(&self, address: &str, reachable: bool) {
        self.update(address, |n| n.unreachable = !reachable);
    }

    pub fn set_hanging(&self, address: &str) {
        self.update(address, |n| n.hanging = true);
    }

    pub fn set_schema_error(&self, address: &str, failing: bool) {
        self.update(address, |n| n.schema_error = failing);
    }

    /// Connections to `address` fail every request from the start.
    pub fn set_broken_on_open(&self, address: &str, broken: bool) {
        self.update(address, |n| n.broken_on_open = broken);
    }

    /// Holds answers to `statement`, filtered or not, for `delay`.
    pub fn delay_statement(&self, address: &str, statement: &str, delay: Duration) {
        self.update(address, |n| n.delays.push((statement.to_string(), delay)));
    }

    pub fn set_keyspaces(&self, keyspaces: &[&str]) {
        *self.state.keyspaces.lock().unwrap() = keyspaces.iter().map(|k| k.to_string()).collect();
    }

    fn update(&self, address: &str, f: impl FnOnce(&mut NodeScript)) {
        let mut nodes = self.state.nodes.lock().unwrap();
        f(nodes.entry(addr(address)).or_default());
    }

    /// Every connection opened so far, in order.
    pub fn opened(&self) -> Vec<Arc<MockConnection>> {
        self.state.opened.lock().unwrap().clone()
    }

    /// Connections opened and not yet closed.
    pub fn open_connections(&self) -> Vec<Arc<MockConnection>> {
        self.opened().into_iter().filter(|c| !c.is_closed()).collect()
    }

    /// Addresses `open` was called with, in order.
    pub fn open_attempts(&self) -> Vec<SocketAddr> {
        self.state.open_attempts.lock().unwrap().clone()
    }

    pub fn last_connection(&self) -> Arc<MockConnection> {
        self.opened().last().cloned().expect("no connection opened")
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn open(&self, host: &Host) -> Result<Arc<dyn Connection>> {
        let address = host.address();
        self.state.open_attempts.lock().unwrap().push(address);
        let script = self.state.script(address);
        if script.hanging {
            std::future::pending::<()>().await;
        }
        if script.unreachable {
            return Err(CqlError::connection(address, "connection refused"));
        }
        let connection = Arc::new(MockConnection {
            id: ConnectionId::new(),
            address,
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(script.broken_on_open),
            requests: Mutex::new(Vec::new()),
        });
        self.state.opened.lock().unwrap().push(Arc::clone(&connection));
        Ok(connection)
    }
}

#[derive(Debug)]
pub struct MockConnection {
    id: ConnectionId,
    address: SocketAddr,
    state: Arc<ClusterState>,
    closed: AtomicBool,
    broken: AtomicBool,
    requests: Mutex<Vec<Request>>,
}

impl MockConnection {
    /// Makes every further request fail with a connection error.
    pub fn break_connection(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Statements of the query requests, in order.
    pub fn queries(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| r.cql().map(str::to_string))
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn address(&self) -> SocketAddr {
        self.address
    }

    async fn send(&self, request: Request) -> Result<Response> {
        self.requests.lock().unwrap().push(request.clone());
        if self.closed.load(Ordering::SeqCst) || self.broken.load(Ordering::SeqCst) {
            return Err(CqlError::connection(self.address, "connection reset by peer"));
        }
        match request {
            Request::Register { .. } => Ok(Response::Ready),
            Request::Query { cql } => {
                let delay = self
                    .state
                    .script(self.address)
                    .delays
                    .iter()
                    .find(|(statement, _)| {
                        cql == *statement || cql.starts_with(&format!("{} WHERE ", statement))
                    })
                    .map(|(_, delay)| *delay);
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(self.state.answer(self.address, &cql))
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Tries live hosts in address order, so tests know which node is picked.
#[derive(Debug, Default)]
pub struct OrderedPolicy {
    hosts: Mutex<Vec<Arc<Host>>>,
    plans: AtomicUsize,
}

impl OrderedPolicy {
    fn add(&self, host: &Arc<Host>) {
        let mut hosts = self.hosts.lock().unwrap();
        if !hosts.iter().any(|h| h.address() == host.address()) {
            hosts.push(Arc::clone(host));
            hosts.sort_by_key(|h| h.address());
        }
    }

    fn remove(&self, host: &Arc<Host>) {
        self.hosts.lock().unwrap().retain(|h| h.address() != host.address());
    }

    pub fn plans(&self) -> usize {
        self.plans.load(Ordering::SeqCst)
    }
}

impl HostStateListener for OrderedPolicy {
    fn on_up(&self, host: &Arc<Host>) {
        self.add(host);
    }

    fn on_down(&self, host: &Arc<Host>) {
        self.remove(host);
    }

    fn on_add(&self, host: &Arc<Host>) {
        self.add(host);
    }

    fn on_remove(&self, host: &Arc<Host>) {
        self.remove(host);
    }
}

impl LoadBalancingPolicy for OrderedPolicy {
    fn init(&self, hosts: &[Arc<Host>]) {
        for host in hosts {
            self.add(host);
        }
    }

    fn new_query_plan(&self) -> QueryPlan {
        self.plans.fetch_add(1, Ordering::SeqCst);
        Box::new(self.hosts.lock().unwrap().clone().into_iter())
    }
}

/// A control connection wired to a mock cluster.
pub struct Harness {
    pub factory: MockFactory,
    pub metadata: Arc<Metadata>,
    pub control: ControlConnection,
    listener: Arc<dyn HostStateListener>,
}

impl Harness {
    /// Builds a control connection over `factory` with the given contact
    /// points, ordered host selection and 2s/300s backoff.
    pub fn new(factory: MockFactory, contact_points: &[&str]) -> Self {
        let contact_points: Vec<SocketAddr> = contact_points.iter().map(|c| addr(c)).collect();
        let config = ClientConfig::builder()
            .contact_points(contact_points.clone())
            .build()
            .expect("failed to build config");
        let metadata = Arc::new(Metadata::with_contact_points(contact_points));
        let control = ControlConnection::builder(Arc::new(factory.clone()), metadata.clone())
            .config(config)
            .load_balancing_policy(Arc::new(OrderedPolicy::default()))
            .reconnection_policy(Arc::new(ExponentialReconnectionPolicy::default()))
            .build();
        let listener: Arc<dyn HostStateListener> = Arc::new(control.clone());
        metadata.register_listener(&listener);
        Self {
            factory,
            metadata,
            control,
            listener,
        }
    }

    pub async fn host(&self, address: &str) -> Arc<Host> {
        use cql_client::ClusterMetadata;
        self.metadata
            .get_host(addr(address))
            .await
            .expect("unknown host")
    }

    pub async fn known_hosts(&self) -> Vec<SocketAddr> {
        use cql_client::ClusterMetadata;
        let mut hosts: Vec<_> = self
            .metadata
            .all_hosts()
            .await
            .iter()
            .map(|h| h.address())
            .collect();
        hosts.sort();
        hosts
    }
}

/// Polls `condition` while letting spawned tasks and paused timers run.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
