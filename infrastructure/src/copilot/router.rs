//! Transport demultiplexer: message routing for concurrent Copilot CLI sessions.
//!
//! The Copilot CLI communicates over a **single TCP connection** using JSON-RPC 2.0,
//! while any number of sessions run on it concurrently.
//!
//! [`MessageRouter`] runs a single background reader task that owns the TCP
//! read-half exclusively and routes every inbound frame:
//!
//! | Frame | Destination |
//! |-------|-------------|
//! | response | the pending request with the same `id` |
//! | `session.event` notification | the session's inbound stream |
//! | `tool.call` / `permission.request` | the session's inbound stream |
//!
//! Frames for a session id without a route are an `UnknownSession`
//! protocol error: notifications are dropped, requests are answered with an
//! error so the CLI does not wait forever.
//!
//! Writes go through one `Mutex`-guarded writer, so frames never interleave.
//! A batch of replies is written under a single lock acquisition.

use crate::copilot::error::{CopilotError, Result};
use crate::copilot::history::events_to_messages;
use crate::copilot::protocol::{
    CreateSessionParams, CreateSessionResult, GetMessagesResult, IncomingJsonRpcRequest,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, JsonRpcResponseOut,
    PermissionRequestParams, REQUEST_FAILED_CODE, ResumeSessionParams, SendParams,
    SessionEventParams, SessionIdParams, ToolCallParams, ToolCallResult, UNKNOWN_SESSION_CODE,
    methods,
};
use crate::copilot::transport::{MessageKind, classify_message, encode_frame, read_frame};
use async_trait::async_trait;
use futures::future::join_all;
use harness_application::{
    AgentConnection, ConnectionError, InboundEvent, MessageOptions, OutboundReply, Reply,
    RequestId, SessionHistoryStore, SessionLink, SessionSpec,
};
use harness_domain::{Message, SessionId, ToolCall};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Default bound for a request/response round-trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound for the best-effort `session.destroy` calls made while stopping.
const STOP_DESTROY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for the CLI process to exit after it was killed.
const CHILD_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Line the CLI prints once its server socket is ready.
const LISTENING_PREFIX: &str = "CLI server listening on port ";

type Route = mpsc::UnboundedSender<InboundEvent>;
type RouteMap = Arc<RwLock<HashMap<String, Route>>>;
type PendingMap = Arc<StdMutex<HashMap<u64, Pending>>>;
type Writer = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// A request awaiting its response.
struct Pending {
    tx: oneshot::Sender<JsonRpcResponse>,
    /// Installed under the response's `sessionId` before the response is
    /// delivered, so no event for a new session can arrive unrouted.
    route: Option<Route>,
}

/// The single shared connection to a Copilot CLI server.
pub struct MessageRouter {
    reader_handle: StdMutex<Option<JoinHandle<()>>>,
    routes: RouteMap,
    pending: PendingMap,
    writer: Writer,
    child: StdMutex<Option<Child>>,
    /// Cancelled once the reader ended or the router was stopped.
    closed: CancellationToken,
    request_timeout: Duration,
}

impl MessageRouter {
    /// Spawn `cli_path --server` and connect to the port it announces.
    pub async fn spawn(
        cli_path: &Path,
        extra_args: &[String],
        spawn_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Arc<Self>> {
        debug!("Spawning Copilot CLI: {} --server", cli_path.display());

        let mut cmd = Command::new(cli_path);
        cmd.arg("--server")
            .args(extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        // Linux: request kernel to send SIGTERM to child when parent dies.
        // This catches cases where Drop doesn't run (SIGKILL, OOM kill).
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        let mut child = cmd.spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            CopilotError::SpawnError(std::io::Error::other("Failed to capture stdout"))
        })?;

        let port = match tokio::time::timeout(spawn_timeout, Self::read_port(stdout)).await {
            Ok(Ok(port)) => port,
            Ok(Err(e)) => {
                let _ = child.start_kill();
                return Err(e);
            }
            Err(_) => {
                let _ = child.start_kill();
                return Err(CopilotError::Timeout(
                    "Copilot CLI did not announce its port".into(),
                ));
            }
        };

        info!("Copilot CLI listening on port {}, connecting...", port);
        let stream = TcpStream::connect(("127.0.0.1", port)).await?;
        Ok(Self::from_stream(stream, Some(child), request_timeout))
    }

    async fn read_port(stdout: tokio::process::ChildStdout) -> Result<u16> {
        let mut stdout_reader = BufReader::new(stdout);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = stdout_reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                return Err(CopilotError::UnexpectedResponse(
                    "Copilot CLI exited without announcing port".into(),
                ));
            }

            let trimmed = line.trim();
            debug!("Copilot CLI output: {}", trimmed);

            if let Some(port_str) = trimmed.strip_prefix(LISTENING_PREFIX) {
                return port_str.trim().parse::<u16>().map_err(|_| {
                    CopilotError::UnexpectedResponse(format!(
                        "Failed to parse port number: {}",
                        port_str
                    ))
                });
            }
        }
    }

    /// Connect to an already running CLI server (`host:port`).
    pub async fn connect(addr: &str, request_timeout: Duration) -> Result<Arc<Self>> {
        info!("Connecting to Copilot CLI server at {}", addr);
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream, None, request_timeout))
    }

    fn from_stream(stream: TcpStream, child: Option<Child>, request_timeout: Duration) -> Arc<Self> {
        let (read_half, write_half) = stream.into_split();

        let routes: RouteMap = Arc::new(RwLock::new(HashMap::new()));
        let pending: PendingMap = Arc::new(StdMutex::new(HashMap::new()));
        let writer: Writer = Arc::new(Mutex::new(BufWriter::new(write_half)));
        let closed = CancellationToken::new();

        let reader_handle = tokio::spawn(Self::reader_loop(
            read_half,
            Arc::clone(&routes),
            Arc::clone(&pending),
            Arc::clone(&writer),
            closed.clone(),
        ));

        Arc::new(Self {
            reader_handle: StdMutex::new(Some(reader_handle)),
            routes,
            pending,
            writer,
            child: StdMutex::new(child),
            closed,
            request_timeout,
        })
    }

    // ==================== Reader ====================

    async fn reader_loop(
        read_half: OwnedReadHalf,
        routes: RouteMap,
        pending: PendingMap,
        writer: Writer,
        closed: CancellationToken,
    ) {
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        loop {
            let body = match read_frame(&mut reader, &mut line).await {
                Ok(Some(body)) => body,
                Ok(None) => {
                    debug!("Reader loop: connection closed");
                    break;
                }
                Err(e) => {
                    warn!("Reader loop: failed to read frame: {}", e);
                    break;
                }
            };

            trace!("Router received: {}", String::from_utf8_lossy(&body));

            let json_value: serde_json::Value = match serde_json::from_slice(&body) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Router: failed to parse JSON: {}", e);
                    continue;
                }
            };

            match classify_message(&json_value) {
                MessageKind::Response => Self::on_response(json_value, &routes, &pending),
                MessageKind::IncomingRequest => {
                    if let Some(reply) = Self::on_incoming_request(json_value, &routes) {
                        let _ = Self::write_frames(&writer, &[reply]).await;
                    }
                }
                MessageKind::Notification => Self::on_notification(json_value, &routes),
            }
        }

        // Reader ended: drop all senders so receivers observe the close.
        info!("Router: reader loop ended, closing all session channels");
        closed.cancel();
        routes.write().unwrap_or_else(|e| e.into_inner()).clear();
        pending.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn on_response(json_value: serde_json::Value, routes: &RouteMap, pending: &PendingMap) {
        let response: JsonRpcResponse = match serde_json::from_value(json_value) {
            Ok(r) => r,
            Err(e) => {
                warn!("Router: failed to parse response: {}", e);
                return;
            }
        };
        let Some(id) = response.id else {
            warn!("Router: response without numeric id");
            return;
        };

        let entry = pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        let Some(Pending { tx, route }) = entry else {
            debug!("Router: no pending receiver for response id={}", id);
            return;
        };

        if let Some(route) = route
            && let Some(session_id) = response
                .result
                .as_ref()
                .and_then(|r| r.get("sessionId"))
                .and_then(|s| s.as_str())
        {
            debug!("Router: registered session {}", session_id);
            routes
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(session_id.to_string(), route);
        }
        let _ = tx.send(response);
    }

    /// Route an incoming request; returns an error reply when it cannot be
    /// routed.
    fn on_incoming_request(
        json_value: serde_json::Value,
        routes: &RouteMap,
    ) -> Option<JsonRpcResponseOut> {
        let request: IncomingJsonRpcRequest = match serde_json::from_value(json_value) {
            Ok(r) => r,
            Err(e) => {
                warn!("Router: failed to parse incoming request: {}", e);
                return None;
            }
        };
        let id = request.id.clone();
        let params = request.params.unwrap_or(serde_json::Value::Null);

        let (session_id, inbound) = match request.method.as_str() {
            methods::TOOL_CALL => match serde_json::from_value::<ToolCallParams>(params) {
                Ok(p) => (
                    p.session_id,
                    InboundEvent::ToolCall {
                        request_id: RequestId(id.clone()),
                        call: ToolCall::new(p.tool_call_id, p.tool_name).with_arguments(p.arguments),
                    },
                ),
                Err(e) => {
                    warn!("Router: failed to parse tool.call params (id={}): {}", id, e);
                    return Some(JsonRpcResponseOut::error(id, -32602, "Invalid tool.call params"));
                }
            },
            methods::PERMISSION_REQUEST => {
                match serde_json::from_value::<PermissionRequestParams>(params) {
                    Ok(p) => (
                        p.session_id,
                        InboundEvent::Permission {
                            request_id: RequestId(id.clone()),
                            request: p.permission_request,
                        },
                    ),
                    Err(e) => {
                        warn!(
                            "Router: failed to parse permission.request params (id={}): {}",
                            id, e
                        );
                        return Some(JsonRpcResponseOut::error(
                            id,
                            -32602,
                            "Invalid permission.request params",
                        ));
                    }
                }
            }
            other => {
                debug!("Router: rejecting incoming request method={}", other);
                return Some(JsonRpcResponseOut::error(id, -32601, "Method not found"));
            }
        };

        if Self::route(routes, &session_id, inbound) {
            None
        } else {
            warn!(
                "UnknownSession: {} for session_id={}, rejecting",
                request.method, session_id
            );
            Some(JsonRpcResponseOut::error(
                id,
                UNKNOWN_SESSION_CODE,
                format!("Unknown session: {}", session_id),
            ))
        }
    }

    fn on_notification(json_value: serde_json::Value, routes: &RouteMap) {
        let notification: JsonRpcNotification = match serde_json::from_value(json_value) {
            Ok(n) => n,
            Err(e) => {
                warn!("Router: failed to parse notification: {}", e);
                return;
            }
        };

        if notification.method != methods::SESSION_EVENT {
            trace!(
                "Router: ignoring notification method={}",
                notification.method
            );
            return;
        }

        let params: SessionEventParams = match notification
            .params
            .map(serde_json::from_value)
            .transpose()
        {
            Ok(Some(p)) => p,
            Ok(None) => {
                debug!("Router: session.event without params");
                return;
            }
            Err(e) => {
                warn!("Router: malformed session.event: {}", e);
                return;
            }
        };

        let event_type = params.event.event_type.clone();
        if !Self::route(routes, &params.session_id, InboundEvent::Event(params.event)) {
            warn!(
                "UnknownSession: dropping {} for session_id={}",
                event_type, params.session_id
            );
        }
    }

    /// Deliver to a session's stream. Returns `false` if there is no live route.
    fn route(routes: &RouteMap, session_id: &str, message: InboundEvent) -> bool {
        let delivered = {
            let routes_read = routes.read().unwrap_or_else(|e| e.into_inner());
            match routes_read.get(session_id) {
                Some(tx) => tx.send(message).is_ok(),
                None => return false,
            }
        };
        if !delivered {
            // The session's pump is gone; forget the route.
            routes
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .remove(session_id);
        }
        delivered
    }

    // ==================== Writer ====================

    async fn write_frames(writer: &Writer, frames: &[JsonRpcResponseOut]) -> Result<()> {
        let mut buf = Vec::new();
        for frame in frames {
            let json = serde_json::to_string(frame)?;
            trace!("Router sending response: {}", json);
            encode_frame(&mut buf, &json);
        }

        let mut w = writer.lock().await;
        w.write_all(&buf).await?;
        w.flush().await?;
        Ok(())
    }

    pub async fn send_request(&self, request: &JsonRpcRequest) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(CopilotError::RouterStopped);
        }
        let request_json = serde_json::to_string(request)?;
        trace!("Router sending: {}", request_json);

        let mut buf = Vec::new();
        encode_frame(&mut buf, &request_json);
        let mut writer = self.writer.lock().await;
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Send a batch of response frames as one uninterrupted write.
    pub async fn send_responses(&self, responses: &[JsonRpcResponseOut]) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(CopilotError::RouterStopped);
        }
        Self::write_frames(&self.writer, responses).await
    }

    // ==================== Requests ====================

    /// Send a request and wait for its result.
    pub async fn request(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        self.request_inner(method, params, None, self.request_timeout)
            .await
    }

    async fn request_inner(
        &self,
        method: &str,
        params: serde_json::Value,
        route: Option<Route>,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let request = JsonRpcRequest::new(method, Some(params));
        let request_id = request.id;
        let (tx, rx) = oneshot::channel();

        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request_id, Pending { tx, route });

        if let Err(e) = self.send_request(&request).await {
            self.forget(request_id);
            return Err(e);
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(CopilotError::RouterStopped),
            Err(_) => {
                self.forget(request_id);
                return Err(CopilotError::Timeout(method.to_string()));
            }
        };

        response.into_result().map_err(|e| CopilotError::RpcError {
            code: e.code,
            message: e.message,
        })
    }

    fn forget(&self, request_id: u64) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&request_id);
    }

    async fn session_request(&self, method: &str, session_id: &SessionId) -> Result<serde_json::Value> {
        let params = serde_json::to_value(SessionIdParams {
            session_id: session_id.to_string(),
        })?;
        self.request(method, params).await
    }

    // ==================== Routes ====================

    pub fn register_route(&self, session_id: &str, route: Route) {
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id.to_string(), route);
    }

    pub fn deregister_session(&self, session_id: &str) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        if routes.remove(session_id).is_some() {
            debug!("Router: deregistered session {}", session_id);
        }
    }

    /// Ids of sessions that currently have a route.
    pub fn registered_sessions(&self) -> Vec<String> {
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    // ==================== Shutdown ====================

    /// Orderly shutdown: destroy every routed session, close the socket,
    /// then terminate the CLI process.
    ///
    /// Returns the errors of the individual `session.destroy` calls.
    pub async fn stop(&self) -> Vec<CopilotError> {
        let sessions = self.registered_sessions();
        let destroys = sessions.iter().map(|session_id| {
            let params = serde_json::json!({ "sessionId": session_id });
            self.request_inner(methods::SESSION_DESTROY, params, None, STOP_DESTROY_TIMEOUT)
        });
        let results = join_all(destroys).await;

        let mut errors = Vec::new();
        for (session_id, result) in sessions.iter().zip(results) {
            match result {
                Ok(_) => debug!("Router: destroyed session {}", session_id),
                Err(e) => {
                    warn!("Router: failed to destroy session {}: {}", session_id, e);
                    errors.push(e);
                }
            }
        }

        {
            let mut writer = self.writer.lock().await;
            let _ = writer.shutdown().await;
        }
        self.close_local();

        let child = self.child.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut child) = child {
            let _ = child.start_kill();
            if tokio::time::timeout(CHILD_EXIT_TIMEOUT, child.wait())
                .await
                .is_err()
            {
                warn!("Copilot CLI did not exit within {:?}", CHILD_EXIT_TIMEOUT);
            }
        }
        info!("Router stopped");
        errors
    }

    /// Immediate shutdown without contacting the CLI.
    pub fn force_stop(&self) {
        self.close_local();
        if let Some(mut child) = self.child.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = child.start_kill();
        }
        info!("Router force-stopped");
    }

    /// Stop the reader and fail everything waiting on it.
    fn close_local(&self) {
        self.closed.cancel();
        if let Some(handle) = self
            .reader_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
        self.routes.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Drop for MessageRouter {
    fn drop(&mut self) {
        if let Some(handle) = self
            .reader_handle
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
        if let Some(child) = self.child.get_mut().unwrap_or_else(|e| e.into_inner()).as_mut() {
            debug!("MessageRouter dropping, killing copilot-cli child process");
            let _ = child.start_kill();
        }
    }
}

/// Wire form of a reply.
fn encode_reply(reply: &OutboundReply) -> JsonRpcResponseOut {
    let id = reply.request_id.0.clone();
    match &reply.reply {
        Reply::ToolResult(result) => {
            JsonRpcResponseOut::new(id, ToolCallResult::from(result).into_rpc_value())
        }
        Reply::Permission(decision) => {
            JsonRpcResponseOut::new(id, serde_json::json!({ "result": decision }))
        }
        Reply::Failure(message) => JsonRpcResponseOut::error(id, REQUEST_FAILED_CODE, message.clone()),
    }
}

fn session_not_found(session_id: &SessionId, err: CopilotError) -> ConnectionError {
    match err {
        CopilotError::RpcError { .. } => ConnectionError::SessionNotFound(session_id.to_string()),
        other => other.into(),
    }
}

#[async_trait]
impl AgentConnection for MessageRouter {
    async fn create_session(&self, spec: &SessionSpec) -> std::result::Result<SessionLink, ConnectionError> {
        let params = serde_json::to_value(CreateSessionParams::from(spec))
            .map_err(CopilotError::from)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let result = self
            .request_inner(methods::SESSION_CREATE, params, Some(tx), self.request_timeout)
            .await?;
        let created: CreateSessionResult = serde_json::from_value(result).map_err(|e| {
            ConnectionError::Protocol(format!("session.create result: {}", e))
        })?;

        Ok(SessionLink {
            session_id: SessionId::new(created.session_id),
            inbound: rx,
        })
    }

    async fn resume_session(
        &self,
        session_id: &SessionId,
        spec: &SessionSpec,
    ) -> std::result::Result<SessionLink, ConnectionError> {
        let params = serde_json::to_value(ResumeSessionParams::new(session_id.as_str(), spec))
            .map_err(CopilotError::from)?;
        let (tx, rx) = mpsc::unbounded_channel();

        // Events may follow the response immediately; route them from the start.
        self.register_route(session_id.as_str(), tx);
        if let Err(e) = self.request(methods::SESSION_RESUME, params).await {
            self.deregister_session(session_id.as_str());
            return Err(session_not_found(session_id, e));
        }

        Ok(SessionLink {
            session_id: session_id.clone(),
            inbound: rx,
        })
    }

    async fn send_prompt(
        &self,
        session_id: &SessionId,
        options: &MessageOptions,
    ) -> std::result::Result<(), ConnectionError> {
        let params = serde_json::to_value(SendParams::new(session_id.as_str(), options))
            .map_err(CopilotError::from)?;
        self.request(methods::SESSION_SEND, params).await?;
        Ok(())
    }

    async fn respond(&self, replies: Vec<OutboundReply>) -> std::result::Result<(), ConnectionError> {
        let frames: Vec<_> = replies.iter().map(encode_reply).collect();
        self.send_responses(&frames).await?;
        Ok(())
    }

    async fn abort(&self, session_id: &SessionId) -> std::result::Result<(), ConnectionError> {
        self.session_request(methods::SESSION_ABORT, session_id).await?;
        Ok(())
    }

    async fn destroy_session(&self, session_id: &SessionId) -> std::result::Result<(), ConnectionError> {
        self.deregister_session(session_id.as_str());
        self.session_request(methods::SESSION_DESTROY, session_id)
            .await?;
        Ok(())
    }

    /// Only a route whose receiver is gone is removed, so a handle released
    /// late cannot unroute a newer handle resumed under the same id.
    fn release_session(&self, session_id: &SessionId) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        if routes
            .get(session_id.as_str())
            .is_some_and(|route| route.is_closed())
        {
            routes.remove(session_id.as_str());
            debug!("Router: released session {}", session_id);
        }
    }
}

#[async_trait]
impl SessionHistoryStore for MessageRouter {
    async fn fetch_history(&self, session_id: &SessionId) -> std::result::Result<Vec<Message>, ConnectionError> {
        let result = self
            .session_request(methods::SESSION_GET_MESSAGES, session_id)
            .await
            .map_err(|e| session_not_found(session_id, e))?;
        let history: GetMessagesResult = serde_json::from_value(result).map_err(|e| {
            ConnectionError::Protocol(format!("session.getMessages result: {}", e))
        })?;
        Ok(events_to_messages(&history.events))
    }
}
