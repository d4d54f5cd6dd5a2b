//! The client façade (C6): a pool of connections, request-token
//! generation, sync/async invocation, draining, and the reconnect loop.
//!
//! Unlike the system this client talks to, there is no separate
//! blocking-reactor thread to pump: each [`crate::connection::Connection`]
//! is already its own `tokio` task, so the façade is just shared state
//! (`std::sync::RwLock`-protected, never held across an `.await`) plus
//! plain async methods. `run`/`run_once`/`run_for`/`interrupt`/`wakeup`
//! are kept as thin wrappers around a `tokio::sync::Notify` for interface
//! parity with callers used to managing their own event-loop cadence;
//! tokio's own executor is the event loop here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::sync::{oneshot, Notify};

use crate::callback::{AbandonReason, Callback, InvokeInfo};
use crate::config::ClientConfig;
use crate::connection::{self, Connection, ConnectionEvent};
use crate::error::{ClientError, Result};
use crate::message::invocation::{InvocationRequest, InvocationResponse};
use crate::procedure::{ParameterSet, Procedure};
use crate::router::Router;
use crate::table::Table;
use crate::value::{Value, WireTag};

/// How often the reconnect loop retries endpoints that never
/// authenticated or whose connection was lost.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

struct ClientInner {
    config: ClientConfig,
    connections: RwLock<Vec<Connection>>,
    host_index: RwLock<HashMap<i32, usize>>,
    router: RwLock<Router>,
    cluster_identity: Mutex<Option<(i64, i32)>>,
    reconnect_targets: Mutex<Vec<(String, u16)>>,
    next_token: AtomicI64,
    outstanding: AtomicUsize,
    round_robin: AtomicUsize,
    drained: Notify,
    interrupt: Notify,
}

/// Pool of connections to a cluster, request dispatch, and reconnect
/// policy. Cheap to clone; clones share the same pool and counters.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Client {
        let inner = Arc::new(ClientInner {
            config,
            connections: RwLock::new(Vec::new()),
            host_index: RwLock::new(HashMap::new()),
            router: RwLock::new(Router::new()),
            cluster_identity: Mutex::new(None),
            reconnect_targets: Mutex::new(Vec::new()),
            next_token: AtomicI64::new(0),
            outstanding: AtomicUsize::new(0),
            round_robin: AtomicUsize::new(0),
            drained: Notify::new(),
            interrupt: Notify::new(),
        });
        tokio::spawn(reconnect_loop(inner.clone()));
        Client { inner }
    }

    /// Authenticates to `host:port` and adds it to the pool. If the
    /// handshake fails and `keep_connecting` is true, the endpoint is
    /// enrolled in the reconnect loop instead of failing outright.
    pub async fn create_connection(
        &self,
        host: &str,
        port: u16,
        keep_connecting: bool,
    ) -> Result<()> {
        match Connection::connect(
            host,
            port,
            &self.inner.config.service,
            &self.inner.config.username,
            &self.inner.config.password,
            self.inner.config.hash_scheme,
            self.inner.config.listener.clone(),
        )
        .await
        {
            Ok((conn, auth)) => {
                let host_id = conn.host_id();
                self.inner
                    .check_cluster_identity(auth.cluster_start_time, auth.leader_address)?;
                register_connection(&self.inner, conn, host, port, keep_connecting);
                debug!("authenticated to {host}:{port} as host {host_id}");
                Ok(())
            }
            Err(e) => {
                if keep_connecting {
                    self.inner
                        .reconnect_targets
                        .lock()
                        .unwrap()
                        .push((host.to_string(), port));
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Fetches fresh partition/procedure metadata via the two
    /// system-catalog procedures the router needs. Called once after
    /// the first connection and again whenever a connection reports an
    /// unsolicited topology notification.
    pub async fn refresh_topology(&self) -> Result<()> {
        refresh_topology(self.inner.clone()).await
    }

    /// Submits an invocation and awaits its response on this task. The
    /// simplest case of the general callback path: the callback is the
    /// internal sync slot, which never abandons.
    pub async fn invoke(
        &self,
        procedure: &Procedure,
        params: ParameterSet,
    ) -> Result<InvocationResponse> {
        let (tx, rx) = oneshot::channel();
        self.invoke_internal(procedure, params, Callback::Sync(tx))
            .await?;
        rx.await
            .map_err(|_| ClientError::Reactor("invocation callback dropped".to_string()))
    }

    /// Submits an invocation and returns as soon as it has been handed
    /// to a connection; `on_complete` runs (on a spawned task) when the
    /// response, real or synthetic, arrives.
    pub async fn invoke_async<F>(
        &self,
        procedure: &Procedure,
        params: ParameterSet,
        on_complete: F,
    ) -> Result<()>
    where
        F: FnOnce(InvocationResponse) + Send + 'static,
    {
        self.invoke_with(procedure, params, on_complete, true, None::<fn(AbandonReason)>)
            .await
    }

    /// Full form of async invoke: lets the caller opt out of
    /// abandonment (`allow_abandon = false`) and observe it
    /// (`on_abandon`).
    pub async fn invoke_with<F, A>(
        &self,
        procedure: &Procedure,
        params: ParameterSet,
        on_complete: F,
        allow_abandon: bool,
        on_abandon: Option<A>,
    ) -> Result<()>
    where
        F: FnOnce(InvocationResponse) + Send + 'static,
        A: FnOnce(AbandonReason) + Send + 'static,
    {
        let callback = Callback::User {
            info: InvokeInfo {
                procedure_name: procedure.name().to_string(),
                ..InvokeInfo::default()
            },
            allow_abandon,
            on_complete: Box::new(on_complete),
            on_abandon: on_abandon
                .map(|f| Box::new(f) as Box<dyn FnOnce(AbandonReason) + Send>),
        };
        self.invoke_internal(procedure, params, callback).await
    }

    async fn invoke_internal(
        &self,
        procedure: &Procedure,
        params: ParameterSet,
        callback: Callback,
    ) -> Result<()> {
        if self.inner.outstanding.load(Ordering::Acquire) >= self.inner.config.max_outstanding_requests
            && self.inner.config.enable_abandon
            && callback.allows_abandon()
        {
            callback.abandon(AbandonReason::TooBusy);
            return Ok(());
        }

        let connection = {
            let values = params.values()?;
            self.pick_connection(procedure.name(), values)?
        };

        let read_only = self
            .inner
            .router
            .read()
            .unwrap()
            .procedure_info(procedure.name())
            .map(|info| info.read_only)
            .unwrap_or(false);

        let client_token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let frame = InvocationRequest {
            procedure_name: procedure.name(),
            client_data: client_token,
            params: &params,
        }
        .serialize()?;

        let deadline = if self.inner.config.enable_query_timeout && read_only {
            Some(Instant::now() + self.inner.config.timeout)
        } else {
            None
        };

        let (tx, rx) = oneshot::channel();
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = connection
            .invoke(connection::Invoke {
                client_token,
                frame,
                read_only,
                deadline,
                responder: tx,
            })
            .await
        {
            self.inner.outstanding.fetch_sub(1, Ordering::AcqRel);
            return Err(e);
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            match rx.await {
                Ok(response) => callback.complete(response),
                Err(_) => {
                    warn!("invocation callback dropped without a response");
                    inner.config.listener.uncaught_exception(
                        &ClientError::Reactor("invocation callback dropped".to_string()),
                        None,
                    );
                }
            }
            if inner.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
                inner.drained.notify_waiters();
            }
        });
        Ok(())
    }

    fn pick_connection(&self, procedure_name: &str, params: &[Value]) -> Result<Connection> {
        let partition = self
            .inner
            .router
            .read()
            .unwrap()
            .route_partition(procedure_name, params)?;
        let host = self
            .inner
            .router
            .read()
            .unwrap()
            .host_for_partition(partition);

        let connections = self.inner.connections.read().unwrap();
        if connections.is_empty() {
            return Err(ClientError::NoConnections);
        }

        if let Some(host_id) = host {
            let host_index = self.inner.host_index.read().unwrap();
            if let Some(&idx) = host_index.get(&host_id) {
                if let Some(conn) = connections.get(idx) {
                    if !conn.is_closed() {
                        return Ok(conn.clone());
                    }
                }
            }
        }

        let n = connections.len();
        let start = self.inner.round_robin.fetch_add(1, Ordering::Relaxed) % n;
        let mut fallback = None;
        for i in 0..n {
            let conn = &connections[(start + i) % n];
            if conn.is_closed() {
                continue;
            }
            if !conn.is_backpressured() {
                return Ok(conn.clone());
            }
            if fallback.is_none() {
                fallback = Some(conn.clone());
            }
        }
        fallback.ok_or(ClientError::NoConnections)
    }

    /// Waits until no invocation is in flight. Returns `true` once
    /// drained; `bool`-returning so a caller's own breakable event loop
    /// can treat it the same as any other wait, even though this
    /// implementation always eventually returns `true`.
    pub async fn drain(&self) -> bool {
        loop {
            if self.inner.outstanding.load(Ordering::Acquire) == 0 {
                return true;
            }
            let notified = self.inner.drained.notified();
            if self.inner.outstanding.load(Ordering::Acquire) == 0 {
                return true;
            }
            notified.await;
        }
    }

    pub async fn close(&self) {
        self.drain().await;
        let conns: Vec<Connection> = self.inner.connections.read().unwrap().clone();
        for conn in conns {
            conn.close().await;
        }
    }

    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.read().unwrap().len()
    }

    /// Pumps one tick of background work (spawned response-completion
    /// tasks, the reconnect loop) without waiting for anything specific.
    pub async fn run_once(&self) {
        tokio::task::yield_now().await;
    }

    /// Runs until [`Client::interrupt`] is called.
    pub async fn run(&self) {
        self.inner.interrupt.notified().await;
    }

    /// Runs until interrupted or `max_time` elapses, whichever first.
    pub async fn run_for(&self, max_time: Duration) {
        let _ = tokio::time::timeout(max_time, self.run()).await;
    }

    pub fn interrupt(&self) {
        self.inner.interrupt.notify_waiters();
    }

    pub fn wakeup(&self) {
        self.inner.interrupt.notify_one();
    }
}

impl ClientInner {
    fn check_cluster_identity(&self, cluster_start_time: i64, leader_address: i32) -> Result<()> {
        let mut identity = self.cluster_identity.lock().unwrap();
        match *identity {
            Some((start, leader)) if start != cluster_start_time || leader != leader_address => {
                Err(ClientError::ClusterInstanceMismatch)
            }
            Some(_) => Ok(()),
            None => {
                *identity = Some((cluster_start_time, leader_address));
                Ok(())
            }
        }
    }
}

fn register_connection(
    inner: &Arc<ClientInner>,
    conn: Connection,
    host: &str,
    port: u16,
    keep_connecting: bool,
) {
    let host_id = conn.host_id();
    {
        let mut conns = inner.connections.write().unwrap();
        let mut index = inner.host_index.write().unwrap();
        index.insert(host_id, conns.len());
        conns.push(conn.clone());
    }
    inner.config.listener.connection_active(host, host_id);

    let mut events = conn.subscribe();
    let task_inner = inner.clone();
    let remote = format!("{host}:{port}");
    let host_owned = host.to_string();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ConnectionEvent::Lost => {
                    let remaining = task_inner
                        .connections
                        .read()
                        .unwrap()
                        .iter()
                        .filter(|c| !c.is_closed())
                        .count() as i32;
                    task_inner.config.listener.connection_lost(&remote, remaining);
                    if keep_connecting {
                        task_inner
                            .reconnect_targets
                            .lock()
                            .unwrap()
                            .push((host_owned.clone(), port));
                    }
                    break;
                }
                ConnectionEvent::Backpressure(on) => {
                    task_inner.config.listener.backpressure(on);
                }
                ConnectionEvent::TopologyChanged => {
                    if let Err(e) = refresh_topology(task_inner.clone()).await {
                        warn!("{remote}: topology refresh failed: {e}");
                        task_inner.config.listener.uncaught_exception(&e, None);
                    }
                }
            }
        }
    });
}

async fn refresh_topology(inner: Arc<ClientInner>) -> Result<()> {
    let client = Client {
        inner: inner.clone(),
    };

    let topo_proc = Procedure::new("@Statistics", vec![WireTag::String, WireTag::Integer]);
    let mut topo_params = topo_proc.params();
    topo_params.add(Value::String(Some(b"TOPO".to_vec())))?;
    topo_params.add(Value::Integer(0))?;
    let topo_response = client.invoke(&topo_proc, topo_params).await?;
    inner
        .router
        .write()
        .unwrap()
        .update_topology(&topo_response.results)?;

    let catalog_proc = Procedure::new("@SystemCatalog", vec![WireTag::String]);
    let mut catalog_params = catalog_proc.params();
    catalog_params.add(Value::String(Some(b"PROCEDURES".to_vec())))?;
    let catalog_response = client.invoke(&catalog_proc, catalog_params).await?;
    if let Some(table) = catalog_response.results.first() {
        update_procedures(&inner, table)?;
    }
    Ok(())
}

fn update_procedures(inner: &Arc<ClientInner>, table: &Table) -> Result<()> {
    inner.router.write().unwrap().update_procedures(table)
}

async fn reconnect_loop(inner: Arc<ClientInner>) {
    let mut ticker = tokio::time::interval(RECONNECT_INTERVAL);
    ticker.tick().await; // the first tick fires immediately; skip it
    loop {
        ticker.tick().await;
        let targets: Vec<(String, u16)> = inner.reconnect_targets.lock().unwrap().clone();
        for (host, port) in targets {
            let attempt = Connection::connect(
                &host,
                port,
                &inner.config.service,
                &inner.config.username,
                &inner.config.password,
                inner.config.hash_scheme,
                inner.config.listener.clone(),
            )
            .await;
            match attempt {
                Ok((conn, auth)) => {
                    if inner
                        .check_cluster_identity(auth.cluster_start_time, auth.leader_address)
                        .is_err()
                    {
                        warn!("{host}:{port} reconnected into a different cluster, dropping");
                        continue;
                    }
                    inner
                        .reconnect_targets
                        .lock()
                        .unwrap()
                        .retain(|(h, p)| !(h == &host && *p == port));
                    register_connection(&inner, conn, &host, port, true);
                    debug!("reconnected to {host}:{port}");
                    if let Err(e) = refresh_topology(inner.clone()).await {
                        warn!("topology refresh after reconnect failed: {e}");
                    }
                }
                Err(e) => debug!("reconnect to {host}:{port} failed: {e}"),
            }
        }
    }
}
