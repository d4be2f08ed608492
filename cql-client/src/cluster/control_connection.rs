//! The administrative control connection.
//!
//! [`ControlConnection`] keeps exactly one live connection to some node of
//! the cluster for management traffic: it subscribes to cluster events,
//! keeps the host list and schema view of the metadata store current, and
//! reconnects in the background whenever the connection is lost.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use cql_core::{CqlError, EventType, NoHostAvailable, Request, Result};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use super::host_selector::HostSelector;
use super::reconnection::{ReconnectionHandler, ReconnectionSlot, SessionHandle};
use super::schema::{self, SchemaScope};
use super::topology;
use crate::config::ClientConfig;
use crate::connection::{await_or_cancel, Awaited, Connection, ConnectionFactory};
use crate::listener::{ControlConnectionEvent, ControlConnectionState, HostStateListener};
use crate::metadata::{ClusterMetadata, Host};
use crate::policy::{
    default_load_balancing_policy, ExponentialReconnectionPolicy, LoadBalancingPolicy,
    ReconnectionPolicy,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Result of an on-demand refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The refresh completed and the metadata store was updated.
    Refreshed,
    /// The active connection failed; a reconnection is under way.
    Reconnecting,
    /// The control connection was shut down while the refresh was running.
    Cancelled,
}

/// Builder for [`ControlConnection`].
pub struct ControlConnectionBuilder {
    factory: Arc<dyn ConnectionFactory>,
    metadata: Arc<dyn ClusterMetadata>,
    config: ClientConfig,
    load_balancing: Option<Arc<dyn LoadBalancingPolicy>>,
    reconnection: Option<Arc<dyn ReconnectionPolicy>>,
    scheduler: Option<Handle>,
}

impl ControlConnectionBuilder {
    /// Sets the client configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the policy ordering candidate hosts. Defaults to round-robin.
    pub fn load_balancing_policy(mut self, policy: Arc<dyn LoadBalancingPolicy>) -> Self {
        self.load_balancing = Some(policy);
        self
    }

    /// Sets the reconnection delay policy. Defaults to exponential backoff
    /// using the configured delays.
    pub fn reconnection_policy(mut self, policy: Arc<dyn ReconnectionPolicy>) -> Self {
        self.reconnection = Some(policy);
        self
    }

    /// Sets the runtime background reconnection runs on.
    pub fn scheduler(mut self, handle: Handle) -> Self {
        self.scheduler = Some(handle);
        self
    }

    /// Builds the control connection. Nothing is opened until
    /// [`ControlConnection::connect`] is called.
    ///
    /// # Panics
    ///
    /// Panics if no scheduler was set and this is called outside a Tokio
    /// runtime.
    pub fn build(self) -> ControlConnection {
        let shutdown = CancellationToken::new();
        let (state, _) = watch::channel(ControlConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let reconnection_policy = self.reconnection.unwrap_or_else(|| {
            Arc::new(ExponentialReconnectionPolicy::from(self.config.reconnection()))
        });
        let policy = self
            .load_balancing
            .unwrap_or_else(default_load_balancing_policy);

        ControlConnection {
            inner: Arc::new(Inner {
                factory: self.factory,
                metadata: self.metadata,
                selector: HostSelector::new(policy),
                reconnection_policy,
                active: RwLock::new(None),
                reconnection: Arc::new(ReconnectionSlot::with_parent(shutdown.clone())),
                state,
                events,
                port: self.config.port(),
                connection_timeout: self.config.network().connection_timeout(),
                scheduler: self.scheduler.unwrap_or_else(Handle::current),
                shutdown,
            }),
        }
    }
}

impl fmt::Debug for ControlConnectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlConnectionBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The administrative connection to the cluster.
///
/// Cloning yields another handle to the same control connection.
#[derive(Clone)]
pub struct ControlConnection {
    inner: Arc<Inner>,
}

struct Inner {
    factory: Arc<dyn ConnectionFactory>,
    metadata: Arc<dyn ClusterMetadata>,
    selector: HostSelector,
    reconnection_policy: Arc<dyn ReconnectionPolicy>,
    active: RwLock<Option<Arc<dyn Connection>>>,
    reconnection: Arc<ReconnectionSlot>,
    state: watch::Sender<ControlConnectionState>,
    events: broadcast::Sender<ControlConnectionEvent>,
    port: u16,
    connection_timeout: Duration,
    scheduler: Handle,
    shutdown: CancellationToken,
}

impl ControlConnection {
    /// Starts building a control connection over the given collaborators.
    pub fn builder(
        factory: Arc<dyn ConnectionFactory>,
        metadata: Arc<dyn ClusterMetadata>,
    ) -> ControlConnectionBuilder {
        ControlConnectionBuilder {
            factory,
            metadata,
            config: ClientConfig::default(),
            load_balancing: None,
            reconnection: None,
            scheduler: None,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ControlConnectionState {
        *self.inner.state.borrow()
    }

    /// Subscribes to state changes.
    pub fn watch_state(&self) -> watch::Receiver<ControlConnectionState> {
        self.inner.state.subscribe()
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ControlConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Returns the active connection, if any.
    pub fn active_connection(&self) -> Option<Arc<dyn Connection>> {
        self.inner.active_connection()
    }

    /// Returns the address of the node the active connection talks to.
    pub fn connected_address(&self) -> Option<SocketAddr> {
        self.inner.active_connection().map(|c| c.address())
    }

    /// Returns `true` while a reconnection session is running.
    pub fn is_reconnecting(&self) -> bool {
        self.inner.reconnection.is_active()
    }

    /// Opens the control connection.
    ///
    /// Tries each candidate host in turn until one is brought up. Does not
    /// retry in the background: if every candidate fails, the error lists
    /// each attempted address with its failure and the caller decides what
    /// to do next.
    ///
    /// # Errors
    ///
    /// Returns `NoHostAvailable` if no candidate could be brought up,
    /// `IllegalState` if already connected or shut down, or any unexpected
    /// error raised during bring-up.
    #[instrument(name = "control_connection.connect", skip(self))]
    pub async fn connect(&self) -> Result<Awaited<()>> {
        if self.inner.shutdown.is_cancelled() {
            return Err(CqlError::IllegalState(
                "control connection is shut down".to_string(),
            ));
        }
        if self.inner.active_connection().is_some() {
            return Err(CqlError::IllegalState(
                "control connection is already connected".to_string(),
            ));
        }

        let hosts = self.inner.metadata.all_hosts().await;
        self.inner.selector.init(&hosts);
        self.inner.set_state(ControlConnectionState::Connecting);

        match self.inner.reconnect_internal().await {
            Ok(Awaited::Ready(connection)) => {
                self.inner.install(connection).await;
                Ok(Awaited::Ready(()))
            }
            Ok(Awaited::Cancelled) => Ok(Awaited::Cancelled),
            Err(e) => {
                warn!(error = %e, "initial control connection failed");
                self.inner.set_state(ControlConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Starts a background reconnection unless one is already running.
    ///
    /// Returns `true` if this call started the reconnection.
    pub fn trigger_reconnect(&self) -> bool {
        self.inner.trigger_reconnect()
    }

    /// Refreshes the schema view over the active connection.
    ///
    /// With no keyspace the whole schema is refreshed; a table requires its
    /// keyspace. A connection fault starts a reconnection and reports
    /// [`RefreshOutcome::Reconnecting`] instead of failing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a table without keyspace, `IllegalState`
    /// when there is no active connection, or any unexpected error raised by
    /// the refresh.
    pub async fn refresh_schema(
        &self,
        keyspace: Option<&str>,
        table: Option<&str>,
    ) -> Result<RefreshOutcome> {
        let scope = SchemaScope::new(keyspace, table)?;
        let connection = self.inner.require_active()?;
        let result = schema::refresh(
            connection.as_ref(),
            self.inner.metadata.as_ref(),
            &scope,
            &self.inner.shutdown,
        )
        .await;
        self.inner.finish_refresh("schema", result)
    }

    /// Reconciles the metadata store's host list with the active node's
    /// peers.
    ///
    /// A connection fault starts a reconnection and reports
    /// [`RefreshOutcome::Reconnecting`] instead of failing.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` when there is no active connection, or any
    /// unexpected error raised by the refresh.
    pub async fn refresh_nodes(&self) -> Result<RefreshOutcome> {
        let connection = self.inner.require_active()?;
        let result = topology::refresh(
            connection.as_ref(),
            self.inner.metadata.as_ref(),
            self.inner.port,
            &self.inner.shutdown,
        )
        .await;
        self.inner.finish_refresh("nodes", result)
    }

    /// Tears the control connection down.
    ///
    /// Cancels any reconnection session and closes the active connection.
    /// Bring-ups still in flight close their connection instead of
    /// installing it.
    #[instrument(name = "control_connection.shutdown", skip(self))]
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.reconnection.cancel();

        let previous = self
            .inner
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(connection) = previous {
            connection.close().await;
        }

        self.inner.set_state(ControlConnectionState::Closed);
        let _ = self.inner.events.send(ControlConnectionEvent::Closed);
        info!("control connection shut down");
    }
}

impl fmt::Debug for ControlConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlConnection")
            .field("state", &self.state())
            .field("connected_address", &self.connected_address())
            .field("reconnecting", &self.is_reconnecting())
            .finish()
    }
}

impl HostStateListener for ControlConnection {
    fn on_up(&self, host: &Arc<Host>) {
        self.inner.selector.on_up(host);
    }

    fn on_down(&self, host: &Arc<Host>) {
        self.inner.selector.on_down(host);

        if self.connected_address() == Some(host.address()) && !self.is_reconnecting() {
            debug!(host = %host, "connected host went down, reconnecting");
            self.inner.trigger_reconnect();
        }
    }

    fn on_add(&self, host: &Arc<Host>) {
        self.inner.selector.on_add(host);
    }

    fn on_remove(&self, host: &Arc<Host>) {
        self.inner.selector.on_remove(host);
    }
}

impl Inner {
    /// Moves to `state`. `Closed` is terminal and is never left again.
    fn set_state(&self, state: ControlConnectionState) -> bool {
        let mut previous = state;
        let changed = self.state.send_if_modified(|current| {
            if *current == state || *current == ControlConnectionState::Closed {
                return false;
            }
            previous = std::mem::replace(current, state);
            true
        });
        if changed {
            trace!(from = %previous, to = %state, "control connection state changed");
        }
        changed
    }

    fn active_connection(&self) -> Option<Arc<dyn Connection>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_active(&self) -> Result<Arc<dyn Connection>> {
        self.active_connection().ok_or_else(|| {
            CqlError::IllegalState("control connection is not connected".to_string())
        })
    }

    /// Runs one candidate round, returning the first connection brought up.
    async fn reconnect_internal(&self) -> Result<Awaited<Arc<dyn Connection>>> {
        let mut errors = BTreeMap::new();
        let mut candidates = self.selector.candidates().peekable();

        while let Some(host) = candidates.next() {
            if self.shutdown.is_cancelled() {
                return Ok(Awaited::Cancelled);
            }
            match self.bring_up(&host).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_connection_error() => {
                    let message = match &e {
                        CqlError::Connection { message, .. } => message.clone(),
                        other => other.to_string(),
                    };
                    if candidates.peek().is_some() {
                        debug!(host = %host, error = %e, "failed to bring up control connection, trying next host");
                    } else {
                        debug!(host = %host, error = %e, "failed to bring up control connection, no more hosts to try");
                    }
                    let _ = self.events.send(ControlConnectionEvent::ConnectionFailed {
                        address: host.address(),
                        message: message.clone(),
                    });
                    errors.insert(host.address(), message);
                }
                Err(e) => return Err(e),
            }
        }

        Err(NoHostAvailable::new(errors).into())
    }

    /// Opens a connection to `host` and prepares it for use.
    ///
    /// The connection is closed again on any failure or cancellation.
    async fn bring_up(&self, host: &Arc<Host>) -> Result<Awaited<Arc<dyn Connection>>> {
        let address = host.address();
        trace!(host = %host, "opening control connection");
        let opened = await_or_cancel(&self.shutdown, async {
            tokio::time::timeout(self.connection_timeout, self.factory.open(host))
                .await
                .map_err(|_| {
                    CqlError::connection(
                        address,
                        format!("timed out after {} ms", self.connection_timeout.as_millis()),
                    )
                })?
        })
        .await?;
        let Awaited::Ready(connection) = opened else {
            return Ok(Awaited::Cancelled);
        };

        match self.initialize(connection.as_ref()).await {
            Ok(Awaited::Ready(())) => Ok(Awaited::Ready(connection)),
            Ok(Awaited::Cancelled) => {
                connection.close().await;
                Ok(Awaited::Cancelled)
            }
            Err(e) => {
                connection.close().await;
                Err(e)
            }
        }
    }

    /// Registers for events, then refreshes schema and node list.
    async fn initialize(&self, connection: &dyn Connection) -> Result<Awaited<()>> {
        trace!(address = %connection.address(), "registering for cluster events");
        let registered = await_or_cancel(
            &self.shutdown,
            connection.send(Request::register(EventType::ALL)),
        )
        .await?;
        match registered {
            Awaited::Ready(response) => response.into_ack()?,
            Awaited::Cancelled => return Ok(Awaited::Cancelled),
        }

        let refreshed = schema::refresh(
            connection,
            self.metadata.as_ref(),
            &SchemaScope::all(),
            &self.shutdown,
        )
        .await?;
        if refreshed.is_cancelled() {
            return Ok(Awaited::Cancelled);
        }

        Ok(topology::refresh(connection, self.metadata.as_ref(), self.port, &self.shutdown)
            .await?
            .map(|_| ()))
    }

    /// Makes `connection` the active connection, then closes the one it
    /// replaced.
    ///
    /// Returns `false` and closes `connection` if the control connection
    /// was shut down first.
    async fn install(&self, connection: Arc<dyn Connection>) -> bool {
        let address = connection.address();
        // State and event are published under the write lock so a concurrent
        // shutdown always observes them before it publishes `Closed`.
        let swapped = {
            let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
            (!self.shutdown.is_cancelled()).then(|| {
                let previous = active.replace(Arc::clone(&connection));
                self.set_state(ControlConnectionState::Connected);
                let _ = self.events.send(ControlConnectionEvent::Connected { address });
                previous
            })
        };
        let Some(previous) = swapped else {
            debug!(address = %address, "control connection shut down, discarding new connection");
            connection.close().await;
            return false;
        };
        info!(address = %address, id = %connection.id(), "control connection established");

        if let Some(previous) = previous {
            if !previous.is_closed() {
                debug!(address = %previous.address(), "closing replaced control connection");
                previous.close().await;
            }
        }
        true
    }

    fn trigger_reconnect(self: &Arc<Self>) -> bool {
        let Some(session) = self.reconnection.try_occupy() else {
            trace!("reconnection already in progress");
            return false;
        };
        self.set_state(ControlConnectionState::Reconnecting);

        let inner = Arc::clone(self);
        self.scheduler.spawn(async move { inner.reconnect(session).await });
        true
    }

    /// Tries every candidate once, then hands over to a backoff session.
    async fn reconnect(self: Arc<Self>, session: SessionHandle) {
        match self.reconnect_internal().await {
            Ok(Awaited::Ready(connection)) => {
                self.install(connection).await;
                self.reconnection.release(&session);
            }
            Ok(Awaited::Cancelled) => {
                self.reconnection.release(&session);
            }
            Err(e) if session.is_cancelled() => {
                debug!(error = %e, "reconnection cancelled");
                self.reconnection.release(&session);
            }
            Err(e) => {
                if e.is_connection_error() {
                    error!(error = %e, "no host reachable for control connection, scheduling reconnection");
                } else {
                    error!(error = %e, "unexpected error while reconnecting control connection, scheduling reconnection");
                    let _ = self.events.send(ControlConnectionEvent::UnexpectedError {
                        message: e.to_string(),
                    });
                }
                self.start_session(session);
            }
        }
    }

    fn start_session(self: &Arc<Self>, session: SessionHandle) {
        let attempt_inner = Arc::clone(self);
        let success_inner = Arc::clone(self);
        let known_events = self.events.clone();
        let unknown_events = self.events.clone();

        ReconnectionHandler::new(self.reconnection_policy.new_schedule(), move || {
            let inner = Arc::clone(&attempt_inner);
            async move { inner.reconnect_internal().await }
        })
        .on_success(move |connection: Awaited<Arc<dyn Connection>>| async move {
            if let Awaited::Ready(connection) = connection {
                success_inner.install(connection).await;
            }
        })
        .on_known_failure(move |e, next_delay| {
            error!(
                error = %e,
                next_delay = ?next_delay,
                "no host reachable for control connection, rescheduling"
            );
            let _ = known_events.send(ControlConnectionEvent::ReconnectionScheduled { next_delay });
            true
        })
        .on_unknown_failure(move |e, next_delay| {
            error!(
                error = %e,
                next_delay = ?next_delay,
                "unexpected error while reconnecting control connection, rescheduling"
            );
            let _ = unknown_events.send(ControlConnectionEvent::UnexpectedError {
                message: e.to_string(),
            });
            let _ = unknown_events.send(ControlConnectionEvent::ReconnectionScheduled { next_delay });
            true
        })
        .scheduler(self.scheduler.clone())
        .resume(Arc::clone(&self.reconnection), session);
    }

    fn finish_refresh<T>(
        self: &Arc<Self>,
        what: &'static str,
        result: Result<Awaited<T>>,
    ) -> Result<RefreshOutcome> {
        match result {
            Ok(Awaited::Ready(_)) => Ok(RefreshOutcome::Refreshed),
            Ok(Awaited::Cancelled) => Ok(RefreshOutcome::Cancelled),
            Err(e) if e.is_connection_error() => {
                debug!(refresh = what, error = %e, "connection lost during refresh, reconnecting");
                self.trigger_reconnect();
                Ok(RefreshOutcome::Reconnecting)
            }
            Err(e) => {
                error!(refresh = what, error = %e, "unexpected error during refresh");
                let _ = self.events.send(ControlConnectionEvent::UnexpectedError {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }
}
