//! Line-oriented chat loop over one session.

use colored::Colorize;
use harness_application::{Session, SessionError};
use harness_domain::{Role, SessionEvent, event_kinds};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

/// What the loop should do with one input line.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Skip,
    Quit,
    Help,
    History,
    Prompt(&'a str),
    Unknown(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Skip,
        "/quit" | "/exit" | "/q" => Input::Quit,
        "/help" | "/h" | "/?" => Input::Help,
        "/history" => Input::History,
        cmd if cmd.starts_with('/') => Input::Unknown(cmd),
        prompt => Input::Prompt(prompt),
    }
}

pub struct ChatLoop {
    session: Session,
    timeout: Duration,
}

impl ChatLoop {
    pub fn new(session: Session, timeout: Duration) -> Self {
        Self { session, timeout }
    }

    /// Read prompts from stdin until EOF or `/quit`, then close the session.
    pub async fn run(self) -> Result<(), SessionError> {
        let printer = spawn_event_printer(self.session.subscribe());
        self.print_welcome();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let result = loop {
            print_prompt();
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    println!("Bye!");
                    break Ok(());
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    break Ok(());
                }
            };

            match parse_input(&line) {
                Input::Skip => continue,
                Input::Quit => {
                    println!("Bye!");
                    break Ok(());
                }
                Input::Help => print_help(),
                Input::History => self.print_history(),
                Input::Unknown(cmd) => {
                    println!("Unknown command: {}", cmd);
                    println!("Type /help for available commands");
                }
                Input::Prompt(prompt) => {
                    if let Err(e) = self.ask(prompt).await {
                        break Err(e);
                    }
                }
            }
        };

        printer.abort();
        let closed = self.session.close().await;
        result.and(closed)
    }

    /// One turn. Turn-local failures are reported and the loop goes on;
    /// errors that end the session are returned.
    async fn ask(&self, prompt: &str) -> Result<(), SessionError> {
        match self.session.send_and_wait(prompt, Some(self.timeout)).await {
            Ok(Some(reply)) => {
                println!();
                println!("{}", reply.content.as_deref().unwrap_or_default());
                println!();
                Ok(())
            }
            Ok(None) => {
                println!("(no reply)");
                Ok(())
            }
            Err(e @ SessionError::TurnTimedOut(_)) => {
                eprintln!("{}", e.to_string().yellow());
                if let Err(abort_err) = self.session.abort().await {
                    warn!("Failed to abort the timed-out turn: {}", abort_err);
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn print_welcome(&self) {
        println!();
        println!("Session {}", self.session.id().to_string().bold());
        println!("Type /help for commands, /quit to exit.");
        println!();
    }

    fn print_history(&self) {
        for message in self.session.messages() {
            let label = match message.role {
                Role::User => "you".green(),
                Role::Assistant => "assistant".cyan(),
                Role::Tool => "tool".blue(),
            };
            println!("{:>10}: {}", label, message.content.as_deref().unwrap_or(""));
        }
    }
}

fn print_prompt() {
    use std::io::Write;
    print!(">>> ");
    let _ = std::io::stdout().flush();
}

fn print_help() {
    println!();
    println!("Commands:");
    println!("  /help, /h, /?     - Show this help");
    println!("  /history          - Show the conversation so far");
    println!("  /quit, /exit, /q  - Exit chat");
    println!();
}

/// Side-channel line for events worth showing while a turn runs.
fn describe(event: &SessionEvent) -> Option<String> {
    match event.event_type.as_str() {
        event_kinds::ASSISTANT_REASONING => event.content().map(|text| format!("[reasoning] {}", text)),
        event_kinds::TOOL_EXECUTION_START => {
            Some(format!("[tool] {}", event.tool_name().unwrap_or("unknown")))
        }
        _ => None,
    }
}

fn spawn_event_printer(mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = describe(&event) {
                        println!("{}", line.blue());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use harness_application::{
        AgentConnection, ConnectionError, InboundEvent, MessageOptions, OutboundReply,
        SessionConfig, SessionContext, SessionLink, SessionSpec,
    };
    use harness_domain::SessionId;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    /// Backend that accepts prompts, never answers, and cannot abort.
    #[derive(Default)]
    struct SilentBackend {
        routes: Mutex<Vec<mpsc::UnboundedSender<InboundEvent>>>,
        aborts: AtomicUsize,
    }

    #[async_trait]
    impl AgentConnection for SilentBackend {
        async fn create_session(&self, _spec: &SessionSpec) -> Result<SessionLink, ConnectionError> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.routes.lock().unwrap().push(tx);
            Ok(SessionLink {
                session_id: SessionId::new("s1"),
                inbound: rx,
            })
        }

        async fn resume_session(
            &self,
            session_id: &SessionId,
            _spec: &SessionSpec,
        ) -> Result<SessionLink, ConnectionError> {
            Err(ConnectionError::SessionNotFound(session_id.to_string()))
        }

        async fn send_prompt(
            &self,
            _session_id: &SessionId,
            _options: &MessageOptions,
        ) -> Result<(), ConnectionError> {
            Ok(())
        }

        async fn respond(&self, _replies: Vec<OutboundReply>) -> Result<(), ConnectionError> {
            Ok(())
        }

        async fn abort(&self, _session_id: &SessionId) -> Result<(), ConnectionError> {
            self.aborts.fetch_add(1, Ordering::SeqCst);
            Err(ConnectionError::Timeout("session.abort".to_string()))
        }

        async fn destroy_session(&self, _session_id: &SessionId) -> Result<(), ConnectionError> {
            Ok(())
        }

        fn release_session(&self, _session_id: &SessionId) {}
    }

    #[tokio::test]
    async fn test_timed_out_turn_keeps_chat_running_when_abort_fails() {
        let backend = Arc::new(SilentBackend::default());
        let ctx = SessionContext::new(backend.clone() as Arc<dyn AgentConnection>);
        let session = Session::create(&ctx, SessionConfig::new()).await.unwrap();
        let chat = ChatLoop::new(session, Duration::from_millis(20));

        assert!(chat.ask("hello").await.is_ok());
        assert_eq!(backend.aborts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("   "), Input::Skip);
        assert_eq!(parse_input("/q"), Input::Quit);
        assert_eq!(parse_input("/history"), Input::History);
        assert_eq!(parse_input("/nope"), Input::Unknown("/nope"));
        assert_eq!(parse_input("  hello  "), Input::Prompt("hello"));
    }

    #[test]
    fn test_describe_events() {
        let reasoning = SessionEvent::new("assistant.reasoning", json!({"content": "thinking"}));
        assert_eq!(describe(&reasoning).as_deref(), Some("[reasoning] thinking"));

        let tool = SessionEvent::new("tool.execution_start", json!({"toolName": "encrypt_string"}));
        assert_eq!(describe(&tool).as_deref(), Some("[tool] encrypt_string"));

        let idle = SessionEvent::new("session.idle", json!({}));
        assert!(describe(&idle).is_none());
    }
}
