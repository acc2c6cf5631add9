//! End-to-end tests of `CopilotClient` against a scripted JSON-RPC server.
//!
//! The fake server speaks the same Content-Length framed JSON-RPC over TCP
//! as `copilot --server`, keeps each session's event log for
//! `session.getMessages`, and reacts to a few prompt keywords:
//!
//! - `encrypt` asks the client to run `encrypt_string` on "Hello"
//! - `hang` never answers
//! - `ghost` also sends traffic for a session id nobody registered
//! - anything else answers with the word remembered from earlier prompts

use harness_application::{
    ApproveAll, ResumeSessionConfig, SessionConfig, SessionError, ToolOutput, ToolRegistration,
};
use harness_domain::{Role, ToolDefinition, ToolParameter};
use harness_infrastructure::copilot::transport::{encode_frame, read_frame};
use harness_infrastructure::{ClientOptions, ClientState, CopilotClient};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

// ==================== Fake server ====================

#[derive(Default)]
struct BackendState {
    /// Event log per live session.
    sessions: HashMap<String, Vec<Value>>,
    next_session: u32,
    /// Responses the client sent to our requests.
    responses: Vec<Value>,
    destroyed: Vec<String>,
}

struct FakeCli {
    addr: String,
    state: Arc<Mutex<BackendState>>,
    hung: Arc<Notify>,
}

impl FakeCli {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(Mutex::new(BackendState::default()));
        let hung = Arc::new(Notify::new());

        let (accept_state, accept_hung) = (Arc::clone(&state), Arc::clone(&hung));
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn = Connection {
                    state: Arc::clone(&accept_state),
                    hung: Arc::clone(&accept_hung),
                    next_request: 1000,
                    tool_waits: HashMap::new(),
                    out: Vec::new(),
                };
                tokio::spawn(conn.serve(stream));
            }
        });

        Self { addr, state, hung }
    }

    fn client(&self) -> CopilotClient {
        CopilotClient::new(ClientOptions::default().with_cli_url(&self.addr))
    }

    /// The client's reply to our request `id`, once the server has read it.
    async fn response_to(&self, id: u64) -> Value {
        for _ in 0..500 {
            let found = self
                .state
                .lock()
                .unwrap()
                .responses
                .iter()
                .find(|r| r["id"] == id)
                .cloned();
            if let Some(response) = found {
                return response;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no response to request {}", id);
    }
}

struct Connection {
    state: Arc<Mutex<BackendState>>,
    hung: Arc<Notify>,
    next_request: u64,
    /// Our outstanding `tool.call` ids and their session.
    tool_waits: HashMap<u64, String>,
    out: Vec<Value>,
}

impl Connection {
    async fn serve(mut self, stream: TcpStream) {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        while let Ok(Some(body)) = read_frame(&mut reader, &mut line).await {
            let message: Value = serde_json::from_slice(&body).unwrap();
            match message.get("method").and_then(|m| m.as_str()) {
                Some(method) => {
                    let method = method.to_string();
                    self.on_request(&method, message["id"].clone(), &message["params"]);
                }
                None => self.on_response(message),
            }

            let mut buf = Vec::new();
            for frame in self.out.drain(..) {
                encode_frame(&mut buf, &frame.to_string());
            }
            if write_half.write_all(&buf).await.is_err() {
                break;
            }
        }
    }

    fn reply(&mut self, id: Value, result: Value) {
        self.out
            .push(json!({"jsonrpc": "2.0", "id": id, "result": result}));
    }

    fn reply_error(&mut self, id: Value, code: i64, message: &str) {
        self.out.push(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message}
        }));
    }

    fn emit(&mut self, session_id: &str, kind: &str, data: Value) {
        let event = json!({"type": kind, "data": data});
        if let Some(log) = self.state.lock().unwrap().sessions.get_mut(session_id) {
            log.push(event.clone());
        }
        self.out.push(json!({
            "jsonrpc": "2.0",
            "method": "session.event",
            "params": {"sessionId": session_id, "event": event}
        }));
    }

    fn call_tool(&mut self, session_id: &str, call_id: &str, input: &str) -> u64 {
        let id = self.next_request;
        self.next_request += 1;
        self.out.push(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tool.call",
            "params": {
                "sessionId": session_id,
                "toolCallId": call_id,
                "toolName": "encrypt_string",
                "arguments": {"input": input}
            }
        }));
        id
    }

    fn knows(&self, session_id: &str) -> bool {
        self.state.lock().unwrap().sessions.contains_key(session_id)
    }

    fn on_request(&mut self, method: &str, id: Value, params: &Value) {
        let session_id = params["sessionId"].as_str().unwrap_or_default().to_string();
        match method {
            "session.create" => {
                assert_eq!(params["requestPermission"], true);
                let session_id = {
                    let mut state = self.state.lock().unwrap();
                    state.next_session += 1;
                    let session_id = format!("sess-{}", state.next_session);
                    state.sessions.insert(session_id.clone(), Vec::new());
                    session_id
                };
                self.reply(id, json!({"sessionId": session_id}));
            }
            "session.resume" | "session.getMessages" if !self.knows(&session_id) => {
                self.reply_error(id, -32000, "Session not found");
            }
            "session.resume" => self.reply(id, json!({"sessionId": session_id})),
            "session.getMessages" => {
                let events = self.state.lock().unwrap().sessions[&session_id].clone();
                self.reply(id, json!({"events": events}));
            }
            "session.send" => {
                self.reply(id, json!({"messageId": "m-1"}));
                let prompt = params["prompt"].as_str().unwrap_or_default().to_string();
                self.on_prompt(&session_id, &prompt);
            }
            "session.destroy" => {
                let mut state = self.state.lock().unwrap();
                state.sessions.remove(&session_id);
                state.destroyed.push(session_id);
                drop(state);
                self.reply(id, json!({}));
            }
            "models.list" => self.reply(
                id,
                json!({"models": [{"id": "gpt-5", "name": "GPT-5"}, {"id": "claude-sonnet-4.5", "name": "Claude Sonnet 4.5"}]}),
            ),
            "ping" => self.reply(
                id,
                json!({"message": params["message"], "timestamp": 1, "protocolVersion": 2}),
            ),
            _ => self.reply_error(id, -32601, "Method not found"),
        }
    }

    fn on_prompt(&mut self, session_id: &str, prompt: &str) {
        let earlier: Vec<String> = self.state.lock().unwrap().sessions[session_id]
            .iter()
            .filter(|e| e["type"] == "user.message")
            .filter_map(|e| e["data"]["content"].as_str().map(str::to_string))
            .collect();
        self.emit(session_id, "user.message", json!({"content": prompt}));

        if prompt.contains("encrypt") {
            self.emit(
                session_id,
                "assistant.message",
                json!({"content": "", "toolRequests": [
                    {"toolCallId": "tc-1", "name": "encrypt_string", "arguments": {"input": "Hello"}}
                ]}),
            );
            let request = self.call_tool(session_id, "tc-1", "Hello");
            self.tool_waits.insert(request, session_id.to_string());
            return;
        }

        if prompt.contains("hang") {
            self.hung.notify_one();
            return;
        }

        if prompt.contains("ghost") {
            self.out.push(json!({
                "jsonrpc": "2.0",
                "method": "session.event",
                "params": {"sessionId": "ghost", "event": {"type": "session.idle", "data": {}}}
            }));
            self.call_tool("ghost", "tc-ghost", "boo");
        }

        let answer = match earlier.iter().find(|p| p.contains("PINEAPPLE")) {
            Some(_) => "The word was PINEAPPLE.".to_string(),
            None => format!("You said: {}", prompt),
        };
        self.emit(session_id, "assistant.message", json!({"content": answer}));
        self.emit(session_id, "session.idle", json!({}));
    }

    fn on_response(&mut self, message: Value) {
        self.state.lock().unwrap().responses.push(message.clone());
        let Some(session_id) = message["id"].as_u64().and_then(|id| self.tool_waits.remove(&id))
        else {
            return;
        };
        let text = message["result"]["result"]["textResultForLlm"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        self.emit(
            &session_id,
            "tool.execution_complete",
            json!({"toolCallId": "tc-1", "success": true, "result": {"content": text}}),
        );
        self.emit(
            &session_id,
            "assistant.message",
            json!({"content": format!("Encrypted: {}", text)}),
        );
        self.emit(&session_id, "session.idle", json!({}));
    }
}

// ==================== Helpers ====================

#[derive(Deserialize)]
struct EncryptArgs {
    input: String,
}

fn encrypt_tool() -> ToolRegistration {
    ToolRegistration::typed(
        ToolDefinition::new("encrypt_string", "Encrypts a string")
            .with_parameter(ToolParameter::new("input", "String to encrypt", true)),
        |_inv, args: EncryptArgs| async move { Ok(ToolOutput::text(args.input.to_uppercase())) },
    )
}

fn text(message: Option<harness_domain::Message>) -> String {
    message.and_then(|m| m.content).unwrap_or_default()
}

// ==================== Tests ====================

#[tokio::test]
async fn test_start_list_models_and_ping() {
    let cli = FakeCli::start().await;
    let client = cli.client();
    assert_eq!(client.state(), ClientState::Disconnected);

    client.start().await.unwrap();
    assert_eq!(client.state(), ClientState::Connected);

    let models = client.list_models().await.unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].id, "gpt-5");

    let pong = client.ping("hi").await.unwrap();
    assert_eq!(pong.message, "hi");

    assert!(client.stop().await.is_empty());
    assert_eq!(client.state(), ClientState::Stopped);
}

#[tokio::test]
async fn test_tool_round_trip_over_the_wire() {
    let cli = FakeCli::start().await;
    let client = cli.client();
    client.start().await.unwrap();

    let session = client
        .create_session(
            SessionConfig::new()
                .with_tool(encrypt_tool())
                .with_permission_policy(Arc::new(ApproveAll)),
        )
        .await
        .unwrap();

    let reply = session
        .send_and_wait("Use encrypt_string to encrypt this string: Hello", WAIT)
        .await
        .unwrap();
    assert!(text(reply).contains("HELLO"));

    let tool_reply = cli.response_to(1000).await;
    assert_eq!(tool_reply["result"]["result"]["resultType"], "success");
    assert_eq!(tool_reply["result"]["result"]["textResultForLlm"], "HELLO");

    session.close().await.unwrap();
    client.stop().await;
}

#[tokio::test]
async fn test_resume_recalls_earlier_turn() {
    let cli = FakeCli::start().await;

    let first = cli.client();
    first.start().await.unwrap();
    let session = first.create_session(SessionConfig::new()).await.unwrap();
    let session_id = session.id().to_string();
    session
        .send_and_wait("Remember this word: PINEAPPLE", WAIT)
        .await
        .unwrap();
    drop(session);
    first.force_stop();

    let second = cli.client();
    second.start().await.unwrap();
    let resumed = second
        .resume_session(session_id.clone(), ResumeSessionConfig::new())
        .await
        .unwrap();
    assert_eq!(resumed.id().as_str(), session_id);

    let history = resumed.messages();
    assert_eq!(history[0].role, Role::User);
    assert!(history[0].content.as_deref().unwrap().contains("PINEAPPLE"));

    let reply = resumed
        .send_and_wait("What was the word?", WAIT)
        .await
        .unwrap();
    assert!(text(reply).contains("PINEAPPLE"));
    second.stop().await;
}

#[tokio::test]
async fn test_resume_unknown_session_fails() {
    let cli = FakeCli::start().await;
    let client = cli.client();
    client.start().await.unwrap();

    let err = client
        .resume_session("no-such-session", ResumeSessionConfig::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::SessionNotFound(_)));
    client.stop().await;
}

#[tokio::test]
async fn test_stop_fails_outstanding_wait_with_channel_closed() {
    let cli = FakeCli::start().await;
    let client = cli.client();
    client.start().await.unwrap();

    let session = Arc::new(client.create_session(SessionConfig::new()).await.unwrap());
    let waiting = Arc::clone(&session);
    let hung = cli.hung.notified();
    let wait = tokio::spawn(async move { waiting.send_and_wait("hang forever", WAIT).await });
    hung.await;

    client.stop().await;
    let result = wait.await.unwrap();
    assert!(matches!(result, Err(SessionError::ChannelClosed)));
    assert_eq!(
        cli.state.lock().unwrap().destroyed,
        vec![session.id().to_string()]
    );
}

#[tokio::test]
async fn test_unknown_session_traffic_is_rejected() {
    let cli = FakeCli::start().await;
    let client = cli.client();
    client.start().await.unwrap();

    let session = client.create_session(SessionConfig::new()).await.unwrap();
    let reply = session.send_and_wait("ghost", WAIT).await.unwrap();
    assert_eq!(text(reply), "You said: ghost");

    let rejected = cli.response_to(1000).await;
    assert_eq!(rejected["error"]["code"], -32001);
    client.stop().await;
}

#[tokio::test]
async fn test_start_after_stop_reconnects() {
    let cli = FakeCli::start().await;
    let client = cli.client();
    client.start().await.unwrap();
    client.stop().await;

    client.start().await.unwrap();
    assert_eq!(client.state(), ClientState::Connected);
    let session = client.create_session(SessionConfig::new()).await.unwrap();
    let reply = session.send_and_wait("again", WAIT).await.unwrap();
    assert_eq!(text(reply), "You said: again");
    client.stop().await;
}
