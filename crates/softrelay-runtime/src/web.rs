//! Configuration portal: HTTP API and WebSocket push channel.

#![allow(missing_docs)]

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, warn};

use crate::config::{ConfigManager, RestoreSource};
use crate::control::{Command, CommandSender};
use crate::error::RuntimeError;
use crate::snapshot::SharedSnapshot;

/// Minimum spacing between snapshot pushes on the WebSocket channel.
const WS_MIN_PUSH_INTERVAL: Duration = Duration::from_millis(100);
/// Heartbeat push when the snapshot sequence is quiet.
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);
/// Read slice per session loop turn.
const WS_READ_TIMEOUT: Duration = Duration::from_millis(25);

const SCHEMA_VERSION: u32 = 1;

/// Shared portal dependencies.
#[derive(Clone)]
pub struct PortalState {
    pub manager: Arc<ConfigManager>,
    pub snapshot: Arc<SharedSnapshot>,
    pub commands: CommandSender,
}

/// Running portal: HTTP API plus the WebSocket push listener.
pub struct PortalServer {
    http_addr: SocketAddr,
    ws_addr: SocketAddr,
}

impl PortalServer {
    #[must_use]
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    #[must_use]
    pub fn ws_addr(&self) -> SocketAddr {
        self.ws_addr
    }
}

/// Start the portal on the given listen addresses (port 0 binds ephemerally).
pub fn start_portal(
    http_listen: &str,
    ws_listen: &str,
    state: PortalState,
) -> Result<PortalServer, RuntimeError> {
    let server = Server::http(http_listen)
        .map_err(|err| RuntimeError::Portal(format!("http bind {http_listen}: {err}").into()))?;
    let http_addr = server
        .server_addr()
        .to_ip()
        .ok_or_else(|| RuntimeError::Portal("http listener has no ip address".into()))?;

    let ws_listener = TcpListener::bind(ws_listen)
        .map_err(|err| RuntimeError::Portal(format!("ws bind {ws_listen}: {err}").into()))?;
    let ws_addr = ws_listener
        .local_addr()
        .map_err(|err| RuntimeError::Portal(format!("ws addr: {err}").into()))?;

    let http_state = state.clone();
    thread::spawn(move || {
        for request in server.incoming_requests() {
            handle_http_request(request, &http_state);
        }
    });

    let ws_state = state;
    thread::spawn(move || {
        for stream in ws_listener.incoming() {
            match stream {
                Ok(stream) => spawn_ws_session(stream, ws_state.clone()),
                Err(err) => warn!("ws accept failed: {err}"),
            }
        }
    });

    Ok(PortalServer { http_addr, ws_addr })
}

fn handle_http_request(mut request: tiny_http::Request, state: &PortalState) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let body = read_body(&mut request);

    let response = match (&method, url.as_str()) {
        (Method::Get, "/api/config/active") => active_response(state),
        (Method::Post, "/api/config/staged/save") => staged_save_response(state, body),
        (Method::Post, "/api/config/staged/validate") => validate_response(state, body),
        (Method::Post, "/api/config/commit") => commit_response(state, body),
        (Method::Post, "/api/config/restore") => restore_response(state, body),
        (Method::Get, "/api/snapshot") => Ok(state.snapshot.read().to_wire()),
        (Method::Post, "/api/command") => command_response(state, body),
        (Method::Get, "/api/settings") => settings_response(state),
        (Method::Post, "/api/settings") => settings_update_response(state, body),
        (Method::Post, "/api/settings/reboot") => hook_response("reboot"),
        (Method::Post, "/api/settings/reconnect") => hook_response("reconnect"),
        _ => Err(RuntimeError::NotFound(
            format!("{method} {url} is not a portal route").into(),
        )),
    };

    let (status, payload) = match response {
        Ok(payload) => (200, payload),
        Err(err) => (status_for(&err), error_envelope(&err)),
    };
    let http = Response::from_string(payload.to_string())
        .with_status_code(StatusCode(status))
        .with_header(Header::from_bytes("Content-Type", "application/json").unwrap());
    let _ = request.respond(http);
}

fn read_body(request: &mut tiny_http::Request) -> Option<Value> {
    let mut text = String::new();
    request.as_reader().read_to_string(&mut text).ok()?;
    if text.trim().is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(&text).ok()?;
    // An explicit JSON null means "no body" (commit/validate fall back to
    // the staged slot).
    (!value.is_null()).then_some(value)
}

fn status_for(err: &RuntimeError) -> u16 {
    match err {
        RuntimeError::InvalidRequest(_)
        | RuntimeError::ValidationFailed(_)
        | RuntimeError::CommandRejected(_) => 400,
        RuntimeError::NotFound(_) => 404,
        _ => 500,
    }
}

fn error_envelope(err: &RuntimeError) -> Value {
    json!({
        "ok": false,
        "error": { "code": err.code(), "message": err.to_string() },
    })
}

fn active_response(state: &PortalState) -> Result<Value, RuntimeError> {
    let (cards, version) = state.manager.active()?;
    Ok(json!({
        "ok": true,
        "schemaVersion": SCHEMA_VERSION,
        "activeVersion": version,
        "config": { "cards": cards },
    }))
}

fn staged_save_response(state: &PortalState, body: Option<Value>) -> Result<Value, RuntimeError> {
    let body = body.ok_or_else(|| RuntimeError::InvalidRequest("missing JSON body".into()))?;
    state.manager.stage_save(&body)?;
    Ok(json!({ "ok": true, "stagedVersion": "staged" }))
}

fn validate_response(state: &PortalState, body: Option<Value>) -> Result<Value, RuntimeError> {
    let report = state.manager.validate(body.as_ref())?;
    Ok(json!({ "ok": report.is_ok(), "validation": report.to_wire() }))
}

fn commit_response(state: &PortalState, body: Option<Value>) -> Result<Value, RuntimeError> {
    let outcome = state.manager.commit(body.as_ref())?;
    Ok(json!({
        "ok": true,
        "activeVersion": outcome.active_version,
        "historyHead": {
            "lkg": outcome.history_head.lkg,
            "slot1": outcome.history_head.slot1,
            "slot2": outcome.history_head.slot2,
            "slot3": outcome.history_head.slot3,
        },
    }))
}

fn restore_response(state: &PortalState, body: Option<Value>) -> Result<Value, RuntimeError> {
    let body = body.ok_or_else(|| RuntimeError::InvalidRequest("missing JSON body".into()))?;
    let source = body
        .get("source")
        .and_then(Value::as_str)
        .and_then(RestoreSource::parse_token)
        .ok_or_else(|| RuntimeError::InvalidRequest("unknown restore source".into()))?;
    let outcome = state.manager.restore(source)?;
    Ok(json!({
        "ok": true,
        "restoredFrom": source.wire_token(),
        "activeVersion": outcome.active_version,
    }))
}

fn command_response(state: &PortalState, body: Option<Value>) -> Result<Value, RuntimeError> {
    let body = body.ok_or_else(|| RuntimeError::InvalidRequest("missing JSON body".into()))?;
    let command = Command::from_wire(&body, state.manager.layout())?;
    state.commands.send(command)?;
    Ok(json!({ "ok": true }))
}

fn settings_response(state: &PortalState) -> Result<Value, RuntimeError> {
    let settings = state.manager.portal_settings()?;
    Ok(json!({ "ok": true, "settings": settings.to_wire() }))
}

fn settings_update_response(state: &PortalState, body: Option<Value>) -> Result<Value, RuntimeError> {
    let body = body.ok_or_else(|| RuntimeError::InvalidRequest("missing JSON body".into()))?;
    let settings = state.manager.update_portal_settings(&body)?;
    Ok(json!({ "ok": true, "settings": settings.to_wire() }))
}

fn hook_response(hook: &str) -> Result<Value, RuntimeError> {
    // Provisioning hooks are accepted; radio control itself lives outside
    // the kernel.
    debug!("portal {hook} hook accepted");
    Ok(json!({ "ok": true }))
}

fn spawn_ws_session(stream: TcpStream, state: PortalState) {
    thread::spawn(move || {
        if let Err(err) = run_ws_session(stream, &state) {
            debug!("ws session closed: {err}");
        }
    });
}

fn run_ws_session(stream: TcpStream, state: &PortalState) -> Result<(), String> {
    stream
        .set_read_timeout(Some(WS_READ_TIMEOUT))
        .map_err(|err| err.to_string())?;
    let mut socket = match tungstenite::accept(stream) {
        Ok(socket) => socket,
        Err(tungstenite::HandshakeError::Interrupted(mut mid)) => loop {
            match mid.handshake() {
                Ok(socket) => break socket,
                Err(tungstenite::HandshakeError::Interrupted(next)) => mid = next,
                Err(tungstenite::HandshakeError::Failure(err)) => return Err(err.to_string()),
            }
        },
        Err(tungstenite::HandshakeError::Failure(err)) => return Err(err.to_string()),
    };

    let mut last_seq = 0_u64;
    let mut last_push: Option<Instant> = None;

    loop {
        match socket.read() {
            Ok(tungstenite::Message::Text(text)) => {
                let reply = handle_ws_command(&text, state);
                ws_send(&mut socket, &reply)?;
            }
            Ok(tungstenite::Message::Close(_)) => return Ok(()),
            Ok(_) => {}
            Err(tungstenite::Error::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                return Ok(())
            }
            Err(err) => return Err(err.to_string()),
        }

        let now = Instant::now();
        let seq = state.snapshot.seq();
        let since_push = last_push.map(|at| now.duration_since(at));
        let seq_due =
            seq != last_seq && since_push.map_or(true, |since| since >= WS_MIN_PUSH_INTERVAL);
        let heartbeat_due = since_push.map_or(true, |since| since >= WS_HEARTBEAT_INTERVAL);
        if seq_due || heartbeat_due {
            let snapshot = state.snapshot.read();
            let frame = json!({
                "type": "runtime_snapshot",
                "schemaVersion": SCHEMA_VERSION,
                "tsMs": snapshot.ts_ms,
                "scanIntervalMs": snapshot.scan_interval_ms,
                "lastCompleteScanMs": snapshot.last_complete_scan_us / 1000,
                "runMode": snapshot.run_mode.wire_token(),
                "snapshotSeq": snapshot.seq,
                "kernelPaused": snapshot.kernel_paused,
                "storageDegraded": snapshot.storage_degraded,
                "testMode": snapshot.test_mode_wire(),
                "cards": crate::card::cards_to_wire(&snapshot.cards),
            });
            ws_send(&mut socket, &frame)?;
            last_seq = snapshot.seq;
            last_push = Some(now);
        }
    }
}

fn handle_ws_command(text: &str, state: &PortalState) -> Value {
    let request: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            return json!({
                "type": "command_result",
                "requestId": Value::Null,
                "ok": false,
                "error": { "code": "INVALID_REQUEST", "message": err.to_string() },
            })
        }
    };
    let request_id = request.get("requestId").cloned().unwrap_or(Value::Null);
    if request.get("type").and_then(Value::as_str) != Some("command") {
        let err = RuntimeError::InvalidRequest("frame type must be 'command'".into());
        return ws_command_result(request_id, Err(err));
    }
    let result = Command::from_wire(&request, state.manager.layout())
        .and_then(|command| state.commands.send(command));
    ws_command_result(request_id, result)
}

fn ws_command_result(request_id: Value, result: Result<(), RuntimeError>) -> Value {
    match result {
        Ok(()) => json!({ "type": "command_result", "requestId": request_id, "ok": true }),
        Err(err) => json!({
            "type": "command_result",
            "requestId": request_id,
            "ok": false,
            "error": { "code": err.code(), "message": err.to_string() },
        }),
    }
}

fn ws_send<S>(socket: &mut tungstenite::WebSocket<S>, payload: &Value) -> Result<(), String>
where
    S: Read + Write,
{
    socket
        .send(tungstenite::Message::Text(payload.to_string()))
        .map_err(|err| err.to_string())
}
