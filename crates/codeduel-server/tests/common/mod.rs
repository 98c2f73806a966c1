use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use codeduel_core::net::messages::{ClientMessage, ServerMessage};
use codeduel_core::net::protocol::{decode_server_message, encode_client_message};
use codeduel_core::test_helpers::echo_problem;

use codeduel_server::config::ServerConfig;
use codeduel_server::coordinator::Collaborators;
use codeduel_server::error::CollaboratorError;
use codeduel_server::hint::{HintProvider, HintRequest};
use codeduel_server::judge::{Judge, JudgeRequest, JudgeResponse};
use codeduel_server::problems::ProblemCatalog;
use codeduel_server::state::AppState;
use codeduel_server::build_app_with;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Test cases in the problem every test battle uses.
pub const CASES: usize = 4;

/// Judge stand-in keyed on the submitted code:
/// `SOLVED` echoes every argument, `HALF` echoes only arguments up to 2,
/// `CRASH` makes the judge unreachable, anything else prints nothing.
pub struct EchoJudge;

impl Judge for EchoJudge {
    fn execute(&self, request: JudgeRequest) -> BoxFuture<'_, Result<JudgeResponse, CollaboratorError>> {
        Box::pin(async move {
            let source = request
                .files
                .first()
                .map(|f| f.content.clone())
                .unwrap_or_default();
            if source.starts_with("CRASH") {
                return Err(CollaboratorError::Unreachable("judge offline".into()));
            }
            let arg = echo_argument(&source).unwrap_or(0);
            let echoes = source.starts_with("SOLVED") || (source.starts_with("HALF") && arg <= 2);
            Ok(JudgeResponse {
                stdout: if echoes { format!("{arg}\n") } else { String::new() },
                stderr: String::new(),
                exit_code: Some(0),
            })
        })
    }
}

fn echo_argument(source: &str) -> Option<u64> {
    let start = source.rfind("echo(")? + "echo(".len();
    let rest = &source[start..];
    let end = rest.find(')')?;
    rest[..end].trim().parse().ok()
}

pub struct StubHints;

impl HintProvider for StubHints {
    fn hint(&self, request: HintRequest) -> BoxFuture<'_, Result<String, CollaboratorError>> {
        Box::pin(async move { Ok(format!("Think about {}", request.title)) })
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    /// Server whose disconnected players forfeit after `secs`.
    pub async fn with_grace(secs: u64) -> Self {
        let mut config = ServerConfig::default();
        config.battle.disconnect_grace_secs = secs;
        Self::from_config(config).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let collaborators = Collaborators {
            judge: Arc::new(EchoJudge),
            hints: Arc::new(StubHints),
            problems: ProblemCatalog::new(vec![echo_problem(CASES)]).unwrap(),
        };
        let (app, state) = build_app_with(config, collaborators);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            state,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub async fn connect(&self) -> WsStream {
        let (stream, _) = tokio_tungstenite::connect_async(self.ws_url()).await.unwrap();
        stream
    }
}

pub async fn ws_send(stream: &mut WsStream, msg: &ClientMessage) {
    let encoded = encode_client_message(msg).unwrap();
    stream.send(Message::Text(encoded.into())).await.unwrap();
}

pub async fn ws_send_raw(stream: &mut WsStream, text: &str) {
    stream.send(Message::Text(text.to_string().into())).await.unwrap();
}

/// Read the next server event. Panics after 2 seconds of silence.
pub async fn ws_read(stream: &mut WsStream) -> ServerMessage {
    let deadline = Duration::from_secs(2);
    loop {
        let frame = tokio::time::timeout(deadline, stream.next())
            .await
            .expect("timed out waiting for server message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return decode_server_message(text.as_str()).unwrap();
        }
    }
}

/// Read the next server event if one arrives within `wait`.
pub async fn ws_try_read(stream: &mut WsStream, wait: Duration) -> Option<ServerMessage> {
    loop {
        match tokio::time::timeout(wait, stream.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(decode_server_message(text.as_str()).unwrap());
            },
            Ok(Some(Ok(_))) => continue,
            _ => return None,
        }
    }
}

pub async fn set_name(stream: &mut WsStream, name: &str) {
    ws_send(
        stream,
        &ClientMessage::UpdateName(codeduel_core::net::messages::UpdateNameMsg {
            player_name: name.to_string(),
        }),
    )
    .await;
    match ws_read(stream).await {
        ServerMessage::NameUpdated(m) => assert_eq!(m.player_name, name),
        other => panic!("Expected NameUpdated, got: {other:?}"),
    }
}

/// Connect and name a player.
pub async fn named_player(server: &TestServer, name: &str) -> WsStream {
    let mut stream = server.connect().await;
    set_name(&mut stream, name).await;
    stream
}
