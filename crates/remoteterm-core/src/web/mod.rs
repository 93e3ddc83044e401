//! Web bridge: auth pages, cookie sessions, origin-checked WebSocket
//! terminal
//!
//! Request handling has three phases: no password configured yet (setup
//! page), password configured but no valid cookie (login page), and
//! authenticated (terminal page + socket upgrade). Each socket connection
//! gets its own shell session immediately, raw-streamed to the browser's
//! terminal emulator.

mod pages;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::auth::{hash_password, verify_password, SessionTokens};
use crate::command::is_interactive_command;
use crate::config::Config;
use crate::pty::PtySession;
use crate::registry::{SessionRecord, SessionRegistry};
use crate::sink::OutputSink;
use crate::stream;

const SESSION_COOKIE: &str = "session";

/// Shared server state. The token and config maps sit behind plain mutexes;
/// contention is a handful of page loads, never the streaming path.
pub struct WebState {
    registry: Arc<SessionRegistry>,
    auth: Mutex<SessionTokens>,
    config: Mutex<Config>,
    next_id: AtomicI64,
}

impl WebState {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(SessionRegistry::new()),
            auth: Mutex::new(SessionTokens::new()),
            config: Mutex::new(config),
            next_id: AtomicI64::new(1),
        })
    }

    fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        let Some(token) = session_cookie(headers) else {
            return false;
        };
        self.auth
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_valid(&token)
    }

    fn password_hash(&self) -> Option<String> {
        self.config
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .webui_password_hash
            .clone()
    }
}

pub fn router(state: Arc<WebState>) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/setup-password", post(handle_setup_password))
        .route("/login", post(handle_login))
        .route("/logout", post(handle_logout))
        .route("/ws", get(handle_ws))
        .with_state(state)
}

/// Serve the web bridge on localhost only.
pub async fn serve(port: u16, config: Config) -> Result<()> {
    let state = WebState::new(config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("cannot bind 127.0.0.1:{port}"))?;
    info!(port, "WebUI started: http://127.0.0.1:{port}");
    axum::serve(listener, app).await.context("WebUI server error")
}

// ========== HTTP handlers ==========

async fn handle_root(State(state): State<Arc<WebState>>, headers: HeaderMap) -> Response {
    if state.password_hash().is_none() {
        return Html(pages::setup_page(None)).into_response();
    }
    if !state.is_authenticated(&headers) {
        return Html(pages::login_page(None)).into_response();
    }
    Html(pages::TERMINAL_PAGE).into_response()
}

#[derive(Deserialize)]
struct SetupForm {
    #[serde(default)]
    password: String,
    #[serde(default)]
    confirm: String,
}

async fn handle_setup_password(
    State(state): State<Arc<WebState>>,
    Form(form): Form<SetupForm>,
) -> Response {
    // Once a hash exists the setup endpoint is closed
    if state.password_hash().is_some() {
        return redirect_home(None);
    }

    if form.password.is_empty() {
        return Html(pages::setup_page(Some("Password cannot be empty"))).into_response();
    }
    if form.password != form.confirm {
        return Html(pages::setup_page(Some("Passwords do not match"))).into_response();
    }

    let hash = match hash_password(&form.password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "password hashing failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let config_snapshot = {
        let mut config = state.config.lock().unwrap_or_else(|e| e.into_inner());
        config.webui_password_hash = Some(hash);
        config.clone()
    };
    if let Err(e) = config_snapshot.save() {
        warn!(error = %e, "could not persist config");
    }

    match create_session_cookie(&state) {
        Ok(cookie) => redirect_home(Some(cookie)),
        Err(e) => {
            error!(error = %e, "session token creation failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    password: String,
}

async fn handle_login(State(state): State<Arc<WebState>>, Form(form): Form<LoginForm>) -> Response {
    let Some(hash) = state.password_hash() else {
        return redirect_home(None);
    };

    if !verify_password(&form.password, &hash) {
        return Html(pages::login_page(Some("Invalid password"))).into_response();
    }

    match create_session_cookie(&state) {
        Ok(cookie) => redirect_home(Some(cookie)),
        Err(e) => {
            error!(error = %e, "session token creation failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_logout(State(state): State<Arc<WebState>>, headers: HeaderMap) -> Response {
    if let Some(token) = session_cookie(&headers) {
        state
            .auth
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&token);
    }
    let clear = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0");
    redirect_home(Some(clear))
}

async fn handle_ws(
    State(state): State<Arc<WebState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.is_authenticated(&headers) || !origin_allowed(&headers) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

fn create_session_cookie(state: &WebState) -> Result<String> {
    let token = state
        .auth
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .create()?;
    Ok(format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict"
    ))
}

fn redirect_home(cookie: Option<String>) -> Response {
    let mut response = (StatusCode::SEE_OTHER, "").into_response();
    let headers = response.headers_mut();
    headers.insert(header::LOCATION, "/".parse().expect("static header"));
    if let Some(cookie) = cookie {
        if let Ok(value) = cookie.parse() {
            headers.insert(header::SET_COOKIE, value);
        }
    }
    response
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookies.split(';') {
        if let Some(value) = part.trim().strip_prefix("session=") {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Browser sockets must come from this server's own pages: Origin absent
/// (non-browser client) or equal to the Host under http/https.
fn origin_allowed(headers: &HeaderMap) -> bool {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return true;
    };
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    if origin.is_empty() {
        return true;
    }
    let Some(host) = headers.get(header::HOST).and_then(|h| h.to_str().ok()) else {
        return false;
    };
    origin == format!("http://{host}") || origin == format!("https://{host}")
}

// ========== WebSocket session ==========

/// Frames from the browser client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientFrame {
    Command {
        #[serde(default)]
        content: String,
    },
    Input {
        #[serde(default)]
        content: String,
    },
    Resize {
        #[serde(default)]
        rows: u16,
        #[serde(default)]
        cols: u16,
    },
    Stop,
    Status,
}

/// Frames to the browser client. Output carries raw terminal bytes with
/// ANSI sequences preserved.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ServerFrame {
    Output {
        content: String,
        #[serde(rename = "chatId")]
        chat_id: i64,
    },
    Status {
        content: String,
        #[serde(rename = "chatId")]
        chat_id: i64,
    },
}

/// Sink over one socket; a lock serializes writers because frames from the
/// streamer and status replies would otherwise interleave.
pub struct WebSocketSink {
    sender: tokio::sync::Mutex<SplitSink<WebSocket, WsMessage>>,
    chat_id: i64,
}

impl WebSocketSink {
    fn new(sender: SplitSink<WebSocket, WsMessage>, chat_id: i64) -> Self {
        Self {
            sender: tokio::sync::Mutex::new(sender),
            chat_id,
        }
    }

    async fn send_frame(&self, frame: ServerFrame) {
        let Ok(json) = serde_json::to_string(&frame) else {
            return;
        };
        let mut sender = self.sender.lock().await;
        if let Err(e) = sender.send(WsMessage::Text(json)).await {
            warn!(chat_id = self.chat_id, error = %e, "websocket write error");
        }
    }
}

#[async_trait]
impl OutputSink for WebSocketSink {
    async fn send_output(&self, output: &str) {
        self.send_frame(ServerFrame::Output {
            content: output.to_string(),
            chat_id: self.chat_id,
        })
        .await;
    }

    async fn send_status(&self, status: &str) {
        self.send_frame(ServerFrame::Status {
            content: status.to_string(),
            chat_id: self.chat_id,
        })
        .await;
    }
}

async fn handle_socket(state: Arc<WebState>, socket: WebSocket) {
    let (sender, mut receiver) = socket.split();
    let chat_id = state.next_id.fetch_add(1, Ordering::SeqCst);
    info!(chat_id, "webui client connected");

    let sink = Arc::new(WebSocketSink::new(sender, chat_id));

    // A shell is ready before the first keystroke; no greeting is written so
    // the terminal starts on a clean screen
    start_shell_session(&state, chat_id, Arc::clone(&sink)).await;

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => dispatch_frame(&state, chat_id, frame, &sink).await,
                Err(e) => {
                    warn!(chat_id, error = %e, "malformed frame ignored");
                }
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(chat_id, error = %e, "websocket read error");
                break;
            }
        }
    }

    cleanup_session(&state, chat_id).await;
    info!(chat_id, "webui client disconnected");
}

async fn dispatch_frame(
    state: &Arc<WebState>,
    chat_id: i64,
    frame: ClientFrame,
    sink: &Arc<WebSocketSink>,
) {
    match frame {
        ClientFrame::Command { content } => handle_command(state, chat_id, &content, sink).await,
        ClientFrame::Input { content } => {
            if let Some(record) = state.registry.get(chat_id).await {
                if record.is_active() {
                    if let Err(e) = record.terminal.send_raw_input(&content).await {
                        warn!(chat_id, error = %e, "raw input write failed");
                    }
                }
            }
        }
        ClientFrame::Resize { rows, cols } => {
            if rows == 0 || cols == 0 {
                return;
            }
            if let Some(record) = state.registry.get(chat_id).await {
                if record.is_active() {
                    info!(chat_id, rows, cols, "resizing terminal");
                    if let Err(e) = record.terminal.resize(rows, cols) {
                        warn!(chat_id, error = %e, "resize failed");
                    }
                }
            }
        }
        ClientFrame::Stop => stop_session(state, chat_id, sink).await,
        ClientFrame::Status => {
            let status = match state.registry.get(chat_id).await {
                Some(record) if record.is_active() => record.status_text(),
                _ => "📊 Status: No active session".to_string(),
            };
            sink.send_status(&status).await;
        }
    }
}

async fn handle_command(
    state: &Arc<WebState>,
    chat_id: i64,
    command: &str,
    sink: &Arc<WebSocketSink>,
) {
    if let Some(record) = state.registry.get(chat_id).await {
        if record.is_active() {
            info!(chat_id, command = %command, "forwarding to session");
            if let Err(e) = record.terminal.send_command(command).await {
                warn!(chat_id, error = %e, "session write failed");
            }
            return;
        }
    }

    if is_interactive_command(command) {
        start_command_session(state, chat_id, command, sink).await;
    } else {
        execute_one_shot(chat_id, command.to_string(), Arc::clone(sink));
    }
}

async fn start_shell_session(state: &Arc<WebState>, chat_id: i64, sink: Arc<WebSocketSink>) {
    info!(chat_id, "starting shell session");
    let (terminal, output) = match PtySession::spawn() {
        Ok(v) => v,
        Err(e) => {
            error!(chat_id, error = %e, "failed to create terminal");
            sink.send_status("❌ Error creating terminal").await;
            return;
        }
    };

    let record = SessionRecord::new(terminal, sink, "shell".to_string());
    state.registry.insert(chat_id, record).await;

    tokio::spawn(stream::socket::run_session(
        Arc::clone(&state.registry),
        chat_id,
        output,
    ));
}

async fn start_command_session(
    state: &Arc<WebState>,
    chat_id: i64,
    command: &str,
    sink: &Arc<WebSocketSink>,
) {
    info!(chat_id, command = %command, "starting session");
    let (terminal, output) = match PtySession::spawn() {
        Ok(v) => v,
        Err(e) => {
            error!(chat_id, error = %e, "failed to create session");
            sink.send_status("❌ Error creating session").await;
            return;
        }
    };

    let record = SessionRecord::new(
        Arc::clone(&terminal),
        Arc::clone(sink) as Arc<dyn OutputSink>,
        command.to_string(),
    );
    state.registry.insert(chat_id, record).await;

    if let Err(e) = terminal.send_command(command).await {
        warn!(chat_id, error = %e, "initial command write failed");
    }

    tokio::spawn(stream::socket::run_session(
        Arc::clone(&state.registry),
        chat_id,
        output,
    ));

    sink.send_status(&format!("🔄 Interactive session started: {command}"))
        .await;
}

fn execute_one_shot(chat_id: i64, command: String, sink: Arc<WebSocketSink>) {
    tokio::spawn(async move {
        info!(chat_id, command = %command, "one-shot command");
        let (terminal, mut output) = match PtySession::spawn() {
            Ok(v) => v,
            Err(e) => {
                error!(chat_id, error = %e, "failed to create terminal");
                sink.send_status("❌ Error creating terminal").await;
                return;
            }
        };

        if let Err(e) = terminal.send_command(&command).await {
            warn!(chat_id, error = %e, "one-shot write failed");
        }
        stream::chat::stream_once(&mut output, sink.as_ref()).await;
        terminal.close().await;
        info!(chat_id, "one-shot complete");
    });
}

async fn stop_session(state: &Arc<WebState>, chat_id: i64, sink: &Arc<WebSocketSink>) {
    match state.registry.remove(chat_id).await {
        Some(record) if record.deactivate() => {
            info!(chat_id, "stopping session");
            record.signal_stop();
            record.terminal.close().await;
            sink.send_status("✅ Session ended").await;
        }
        _ => {
            sink.send_status("⚠️ No active session").await;
        }
    }
}

async fn cleanup_session(state: &Arc<WebState>, chat_id: i64) {
    if let Some(record) = state.registry.remove(chat_id).await {
        if record.deactivate() {
            info!(chat_id, "cleaning up session");
            record.signal_stop();
            record.terminal.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        headers
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn cookie_token(response: &Response) -> String {
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("set-cookie present")
            .to_str()
            .unwrap();
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Path=/"));
        cookie
            .split(';')
            .next()
            .unwrap()
            .strip_prefix("session=")
            .unwrap()
            .to_string()
    }

    #[test]
    fn cookie_extraction() {
        let headers = header_map(&[("cookie", "a=1; session=deadbeef; b=2")]);
        assert_eq!(session_cookie(&headers).as_deref(), Some("deadbeef"));

        let headers = header_map(&[("cookie", "a=1")]);
        assert_eq!(session_cookie(&headers), None);

        assert_eq!(session_cookie(&HeaderMap::new()), None);
    }

    #[test]
    fn origin_check() {
        // No Origin header: allowed (non-browser clients)
        assert!(origin_allowed(&HeaderMap::new()));

        let same = header_map(&[("origin", "http://localhost:8080"), ("host", "localhost:8080")]);
        assert!(origin_allowed(&same));

        let https = header_map(&[
            ("origin", "https://localhost:8080"),
            ("host", "localhost:8080"),
        ]);
        assert!(origin_allowed(&https));

        let cross = header_map(&[("origin", "http://evil.example"), ("host", "localhost:8080")]);
        assert!(!origin_allowed(&cross));

        let scheme = header_map(&[
            ("origin", "ftp://localhost:8080"),
            ("host", "localhost:8080"),
        ]);
        assert!(!origin_allowed(&scheme));
    }

    #[tokio::test]
    async fn first_access_serves_setup_page() {
        let state = WebState::new(Config::default());
        let response = handle_root(State(state), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("Create Password"));
    }

    #[tokio::test]
    async fn setup_password_validates_and_issues_cookie() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var(crate::config::CONFIG_DIR_ENV, dir.path());

        let state = WebState::new(Config::default());

        // Empty password rejected
        let response = handle_setup_password(
            State(Arc::clone(&state)),
            Form(SetupForm {
                password: String::new(),
                confirm: String::new(),
            }),
        )
        .await;
        assert!(body_string(response).await.contains("Password cannot be empty"));

        // Mismatched confirm rejected
        let response = handle_setup_password(
            State(Arc::clone(&state)),
            Form(SetupForm {
                password: "foo".into(),
                confirm: "bar".into(),
            }),
        )
        .await;
        assert!(body_string(response).await.contains("Passwords do not match"));

        // Valid setup stores a bcrypt hash and authenticates the browser
        let response = handle_setup_password(
            State(Arc::clone(&state)),
            Form(SetupForm {
                password: "foo".into(),
                confirm: "foo".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let token = cookie_token(&response);

        assert!(state.password_hash().unwrap().starts_with("$2"));
        let headers = header_map(&[("cookie", &format!("session={token}"))]);
        assert!(state.is_authenticated(&headers));

        // Setup endpoint is closed now
        let response = handle_setup_password(
            State(Arc::clone(&state)),
            Form(SetupForm {
                password: "again".into(),
                confirm: "again".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        std::env::remove_var(crate::config::CONFIG_DIR_ENV);
    }

    #[tokio::test]
    async fn login_verifies_bcrypt_and_logout_revokes() {
        let config = Config {
            webui_password_hash: Some(hash_password("secret").unwrap()),
            ..Config::default()
        };
        let state = WebState::new(config);

        // Wrong password: login page with error
        let response = handle_login(
            State(Arc::clone(&state)),
            Form(LoginForm {
                password: "wrong".into(),
            }),
        )
        .await;
        assert!(body_string(response).await.contains("Invalid password"));

        // Correct password: cookie + redirect
        let response = handle_login(
            State(Arc::clone(&state)),
            Form(LoginForm {
                password: "secret".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let token = cookie_token(&response);

        let headers = header_map(&[("cookie", &format!("session={token}"))]);
        assert!(state.is_authenticated(&headers));

        // Authenticated root serves the terminal page
        let response = handle_root(State(Arc::clone(&state)), headers.clone()).await;
        assert!(body_string(response).await.contains("REMOTE TERMINAL"));

        // Logout revokes the server-side session and clears the cookie
        let response = handle_logout(State(Arc::clone(&state)), headers.clone()).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));
        assert!(!state.is_authenticated(&headers));
    }

    #[tokio::test]
    async fn unauthenticated_root_serves_login_page() {
        let config = Config {
            webui_password_hash: Some(hash_password("pw").unwrap()),
            ..Config::default()
        };
        let state = WebState::new(config);
        let response = handle_root(State(state), HeaderMap::new()).await;
        let body = body_string(response).await;
        assert!(body.contains("Enter your password"));
    }
}
