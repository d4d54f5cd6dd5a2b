//! One TCP session with a server node (C4).
//!
//! A connection authenticates once, then runs as an actor task: a
//! `tokio::select!` loop races inbound frames off the socket against
//! outbound invocations submitted through a channel, matching responses
//! to pending requests by client token. [`crate::client`] owns a pool of
//! these and never touches the socket directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::buffer::SharedBuffer;
use crate::error::{ClientError, Result};
use crate::listener::{NullListener, StatusListener};
use crate::message::auth::{AuthRequest, AuthResponse, HashScheme};
use crate::message::invocation::{InvocationResponse, StatusCode};

/// Inbound frames above this size are a protocol violation.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Soft outbound high-water mark. Crossing it marks the connection
/// backpressured; falling back under it clears the flag. Measured as the
/// sum of request bytes currently in flight (written, not yet
/// responded), which stands in for actual outbound buffer occupancy
/// since the actor writes each frame to completion before accepting the
/// next one.
pub const DEFAULT_BACKPRESSURE_THRESHOLD: usize = 256 * 1024;

/// Client token that marks an unsolicited topology-change notification
/// rather than a response to a pending request.
pub const TOPOLOGY_NOTIFICATION_TOKEN: i64 = 0x7FFF_FFFF_FFFF_FFFE;

#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Backpressure(bool),
    Lost,
    TopologyChanged,
}

struct PendingRequest {
    responder: oneshot::Sender<InvocationResponse>,
    byte_len: usize,
    read_only: bool,
    deadline: Option<Instant>,
}

/// One outstanding invocation, handed to a connection to write and track.
pub struct Invoke {
    pub client_token: i64,
    pub frame: Vec<u8>,
    pub read_only: bool,
    pub deadline: Option<Instant>,
    pub responder: oneshot::Sender<InvocationResponse>,
}

enum Command {
    Invoke(Invoke),
    ScanTimeouts,
    Close,
}

/// A cheap, cloneable handle to a running connection actor. Holding one
/// does not imply the underlying socket is still alive; check
/// [`Connection::is_closed`] or subscribe to [`ConnectionEvent::Lost`].
#[derive(Clone)]
pub struct Connection {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ConnectionEvent>,
    host_id: i32,
    remote: String,
    closed: Arc<AtomicBool>,
    backpressured: Arc<AtomicBool>,
}

impl Connection {
    /// Dials `host:port`, runs the authentication handshake, and spawns
    /// the connection's reactor task on success.
    pub async fn connect(
        host: &str,
        port: u16,
        service: &str,
        username: &str,
        password: &str,
        scheme: HashScheme,
        listener: Arc<dyn StatusListener>,
    ) -> Result<(Connection, AuthResponse)> {
        let remote = format!("{host}:{port}");
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| ClientError::Connect(format!("{remote}: {e}")))?;
        stream.set_nodelay(true).ok();
        let (read_half, write_half) = stream.into_split();
        connect_stream(
            read_half, write_half, remote, service, username, password, scheme, listener,
        )
        .await
    }

    pub fn host_id(&self) -> i32 {
        self.host_id
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_backpressured(&self) -> bool {
        self.backpressured.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Hands a serialized invocation to the connection's write side.
    /// Fails only if the actor has already shut down; in that case the
    /// caller is responsible for synthesizing its own CONNECTION_LOST
    /// response, since no pending-request entry was ever created.
    pub async fn invoke(&self, invoke: Invoke) -> Result<()> {
        self.commands
            .send(Command::Invoke(invoke))
            .await
            .map_err(|_| ClientError::Reactor(format!("connection to {} is closed", self.remote)))
    }

    /// Asks the actor to complete any read-only pending requests whose
    /// deadline has passed with a synthetic CONNECTION_TIMEOUT. Best
    /// effort: dropped silently if the actor's command queue is full or
    /// already gone, since a scan is just a periodic nudge, not a
    /// required delivery.
    pub fn scan_timeouts(&self) {
        let _ = self.commands.try_send(Command::ScanTimeouts);
    }

    pub async fn close(&self) {
        let _ = self.commands.send(Command::Close).await;
    }
}

/// Runs the authentication handshake over an already-connected stream
/// pair and spawns the connection actor on success. Used directly by
/// tests and by anyone wiring up TLS or another exotic transport; real
/// callers generally want [`Connection::connect`].
pub async fn connect_stream<R, W>(
    reader: R,
    writer: W,
    remote: impl Into<String>,
    service: &str,
    username: &str,
    password: &str,
    scheme: HashScheme,
    listener: Arc<dyn StatusListener>,
) -> Result<(Connection, AuthResponse)>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let remote = remote.into();
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);

    let request = AuthRequest {
        service,
        username,
        password,
        scheme,
    }
    .serialize()?;
    writer.write_all(&request).await?;
    writer.flush().await?;

    let body = read_frame(&mut reader).await?;
    let auth = AuthResponse::parse(&body)?;
    if !auth.success() {
        return Err(ClientError::Connect(format!(
            "{remote}: authentication rejected (result code {})",
            auth.result_code
        )));
    }

    let (command_tx, command_rx) = mpsc::channel(256);
    let (event_tx, _) = broadcast::channel(32);
    let closed = Arc::new(AtomicBool::new(false));
    let backpressured = Arc::new(AtomicBool::new(false));

    let actor = ConnectionActor {
        reader,
        writer,
        pending: HashMap::new(),
        outstanding_bytes: 0,
        events: event_tx.clone(),
        closed: closed.clone(),
        backpressured: backpressured.clone(),
        remote: remote.clone(),
        listener,
    };
    tokio::spawn(actor.run(command_rx));

    Ok((
        Connection {
            commands: command_tx,
            events: event_tx,
            host_id: auth.host_id,
            remote,
            closed,
            backpressured,
        },
        auth,
    ))
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = i32::from_be_bytes(len_bytes);
    if len <= 0 {
        return Err(ClientError::protocol(format!(
            "non-positive frame length {len}"
        )));
    }
    if len as usize > MAX_FRAME_LEN {
        return Err(ClientError::FrameTooLarge { len: len as u32 });
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

struct ConnectionActor<R, W> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
    pending: HashMap<i64, PendingRequest>,
    outstanding_bytes: usize,
    events: broadcast::Sender<ConnectionEvent>,
    closed: Arc<AtomicBool>,
    backpressured: Arc<AtomicBool>,
    remote: String,
    listener: Arc<dyn StatusListener>,
}

impl<R, W> ConnectionActor<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    match cmd {
                        None | Some(Command::Close) => break,
                        Some(Command::Invoke(invoke)) => {
                            if let Err(e) = self.handle_invoke(invoke).await {
                                error!("{}: failed to write invocation: {e}", self.remote);
                                self.listener.uncaught_exception(&e, None);
                                break;
                            }
                        }
                        Some(Command::ScanTimeouts) => self.handle_scan_timeouts(),
                    }
                }
                frame = read_frame(&mut self.reader) => {
                    match frame {
                        Ok(body) => {
                            match self.handle_frame(body) {
                                Ok(should_break) => {
                                    if should_break {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    warn!("{}: {e}", self.remote);
                                    self.listener.uncaught_exception(&e, None);
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            debug!("{}: connection lost: {e}", self.remote);
                            break;
                        }
                    }
                }
            }
        }
        self.shutdown();
    }

    async fn handle_invoke(&mut self, invoke: Invoke) -> Result<()> {
        self.writer.write_all(&invoke.frame).await?;
        self.writer.flush().await?;
        self.outstanding_bytes += invoke.frame.len();
        self.pending.insert(
            invoke.client_token,
            PendingRequest {
                responder: invoke.responder,
                byte_len: invoke.frame.len(),
                read_only: invoke.read_only,
                deadline: invoke.deadline,
            },
        );
        self.update_backpressure();
        Ok(())
    }

    /// Returns `Ok(true)` if the listener asked the reactor to stop.
    fn handle_frame(&mut self, body: Vec<u8>) -> Result<bool> {
        let response = InvocationResponse::parse(SharedBuffer::from_vec(body))?;
        if response.client_data == TOPOLOGY_NOTIFICATION_TOKEN {
            let _ = self.events.send(ConnectionEvent::TopologyChanged);
            return Ok(false);
        }
        match self.pending.remove(&response.client_data) {
            Some(pending) => {
                self.outstanding_bytes = self.outstanding_bytes.saturating_sub(pending.byte_len);
                self.update_backpressure();
                let _ = pending.responder.send(response);
                Ok(false)
            }
            None => {
                let token = response.client_data;
                warn!("{}: response for unknown client token {token}", self.remote);
                let should_break = self.listener.uncaught_exception(
                    &ClientError::protocol(format!("response for unknown client token {token}")),
                    Some(&response),
                );
                Ok(should_break)
            }
        }
    }

    fn handle_scan_timeouts(&mut self) {
        let now = Instant::now();
        let expired: Vec<i64> = self
            .pending
            .iter()
            .filter(|(_, p)| p.read_only && p.deadline.is_some_and(|d| now >= d))
            .map(|(token, _)| *token)
            .collect();
        for token in expired {
            if let Some(pending) = self.pending.remove(&token) {
                self.outstanding_bytes = self.outstanding_bytes.saturating_sub(pending.byte_len);
                let response = InvocationResponse::synthetic(
                    token,
                    StatusCode::ConnectionTimeout,
                    "request exceeded its deadline",
                );
                let _ = pending.responder.send(response);
            }
        }
        self.update_backpressure();
    }

    fn update_backpressure(&self) {
        let over = self.outstanding_bytes >= DEFAULT_BACKPRESSURE_THRESHOLD;
        let was_over = self.backpressured.swap(over, Ordering::AcqRel);
        if was_over != over {
            let _ = self.events.send(ConnectionEvent::Backpressure(over));
        }
    }

    fn shutdown(mut self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.events.send(ConnectionEvent::Lost);
        for (token, pending) in self.pending.drain() {
            let response =
                InvocationResponse::synthetic(token, StatusCode::ConnectionLost, "connection lost");
            let _ = pending.responder.send(response);
        }
    }
}
