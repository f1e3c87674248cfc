/*!
Stub miner firmware device for tests without hardware

Serves the management API surface on an ephemeral local port: unlock
endpoint issuing bearer tokens, token-checked telemetry reads with
canned values, and control POSTs recorded for assertions. Control
writes also adjust the canned telemetry so a "verify via telemetry"
flow observes an effect.

Fault injection: fail the next N requests with a device error, stall
the next N requests past any client timeout, or expire the current
session token to exercise re-authentication.
*/

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Longer than any client-side timeout a test would configure
const STALL_FOR: Duration = Duration::from_secs(30);

/// One control write the stub received
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCommand {
    pub path: String,
    pub body: Value,
}

#[derive(Debug)]
struct StubInner {
    username: String,
    password: String,
    token: Option<String>,
    auth_count: u32,
    fail_next: u32,
    stall_next: u32,
    hashrate_limit_percent: f64,
    power_limit_percent: f64,
    recorded: Vec<RecordedCommand>,
}

impl StubInner {
    /// Nameplate values the canned telemetry is derived from
    const BASE_HASHRATE_THS: f64 = 110.0;
    const BASE_POWER_WATTS: f64 = 3400.0;

    fn telemetry(&self) -> Value {
        let hashrate = Self::BASE_HASHRATE_THS * self.hashrate_limit_percent / 100.0;
        let power = Self::BASE_POWER_WATTS * self.power_limit_percent / 100.0;
        json!({
            "hashrate_ths": hashrate,
            "power_watts": power,
            "chip_temp_c": 64.5,
            "board_temp_c": 57.0,
            "fan_rpm": 5400,
            "uptime_secs": 93_600,
            "accepted_shares": 45_210,
            "rejected_shares": 38,
            "efficiency_w_per_th": power / hashrate.max(0.001),
        })
    }

    fn summary(&self) -> Value {
        json!({
            "model": "Antminer S19j Pro",
            "firmware_version": "1.2.6-stub",
            "status": "mining",
            "uptime_secs": 93_600,
            "hashrate_ths": Self::BASE_HASHRATE_THS * self.hashrate_limit_percent / 100.0,
            "power_watts": Self::BASE_POWER_WATTS * self.power_limit_percent / 100.0,
        })
    }

    fn chips(&self) -> Value {
        json!({
            "chains": [
                {
                    "id": 0,
                    "chip_count": 126,
                    "hashrate_ths": 36.6,
                    "temp_c": 63.0,
                    "status": "healthy",
                    "chips": [
                        { "id": 0, "hashrate_ths": 0.29, "temp_c": 62.0, "status": "active" },
                        { "id": 1, "hashrate_ths": 0.29, "temp_c": 64.0, "status": "active" }
                    ]
                },
                { "id": 1, "chip_count": 126, "hashrate_ths": 36.8, "temp_c": 65.5, "status": "healthy" },
                { "id": 2, "chip_count": 126, "hashrate_ths": 36.4, "temp_c": 66.0, "status": "healthy" }
            ]
        })
    }
}

#[derive(Clone)]
struct StubState {
    inner: Arc<Mutex<StubInner>>,
}

/// In-process firmware device
pub struct StubMiner {
    addr: SocketAddr,
    state: StubState,
    server: tokio::task::JoinHandle<()>,
}

impl StubMiner {
    /// Start a stub accepting the default `admin`/`admin` login
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with_login("admin", "admin").await
    }

    pub async fn spawn_with_login(username: &str, password: &str) -> anyhow::Result<Self> {
        let state = StubState {
            inner: Arc::new(Mutex::new(StubInner {
                username: username.to_string(),
                password: password.to_string(),
                token: None,
                auth_count: 0,
                fail_next: 0,
                stall_next: 0,
                hashrate_limit_percent: 100.0,
                power_limit_percent: 100.0,
                recorded: Vec::new(),
            })),
        };

        let app = Router::new()
            .route("/auth", post(unlock))
            .route("/summary", get(get_summary))
            .route("/chips", get(get_chips))
            .route("/telemetry", get(get_telemetry))
            .route("/hashrate-limit", post(post_hashrate_limit))
            .route("/power-limit", post(post_power_limit))
            .route("/overclock", post(post_overclock))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                debug!("stub miner server stopped: {e}");
            }
        });

        Ok(Self {
            addr,
            state,
            server,
        })
    }

    /// Host string (with port) clients should connect to
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    /// Control writes received so far, in order
    pub fn recorded(&self) -> Vec<RecordedCommand> {
        self.state.inner.lock().recorded.clone()
    }

    /// How many times a login was accepted
    pub fn auth_count(&self) -> u32 {
        self.state.inner.lock().auth_count
    }

    /// Drop the current token; the next bearer request gets a 401
    pub fn expire_session(&self) {
        self.state.inner.lock().token = None;
    }

    /// Answer the next `n` requests with a device error
    pub fn set_fail_next(&self, n: u32) {
        self.state.inner.lock().fail_next = n;
    }

    /// Accept but do not answer the next `n` requests, so the client
    /// side runs into its own timeout
    pub fn set_stall_next(&self, n: u32) {
        self.state.inner.lock().stall_next = n;
    }
}

impl Drop for StubMiner {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Consume one injected stall, if armed; the lock is released before
/// the caller sleeps
fn take_stall(state: &StubState) -> bool {
    let mut inner = state.inner.lock();
    if inner.stall_next > 0 {
        inner.stall_next -= 1;
        return true;
    }
    false
}

async fn stall_if_armed(state: &StubState) {
    if take_stall(state) {
        tokio::time::sleep(STALL_FOR).await;
    }
}

/// Consume one injected failure, if armed
fn take_fault(inner: &mut StubInner) -> bool {
    if inner.fail_next > 0 {
        inner.fail_next -= 1;
        return true;
    }
    false
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn authorized(inner: &StubInner, headers: &HeaderMap) -> bool {
    match (&inner.token, bearer_token(headers)) {
        (Some(expected), Some(given)) => expected == given,
        _ => false,
    }
}

async fn unlock(
    State(state): State<StubState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    stall_if_armed(&state).await;
    let mut inner = state.inner.lock();
    if take_fault(&mut inner) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "injected fault"})),
        );
    }
    let username = body.get("username").and_then(Value::as_str);
    let password = body.get("password").and_then(Value::as_str);
    if username != Some(inner.username.as_str()) || password != Some(inner.password.as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "bad login"})),
        );
    }
    let token = uuid::Uuid::new_v4().to_string();
    inner.token = Some(token.clone());
    inner.auth_count += 1;
    (StatusCode::OK, Json(json!({ "token": token })))
}

fn read_endpoint(
    state: &StubState,
    headers: &HeaderMap,
    payload: impl FnOnce(&StubInner) -> Value,
) -> (StatusCode, Json<Value>) {
    let mut inner = state.inner.lock();
    if take_fault(&mut inner) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "injected fault"})),
        );
    }
    if !authorized(&inner, headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "no session"})),
        );
    }
    (StatusCode::OK, Json(payload(&inner)))
}

async fn get_summary(
    State(state): State<StubState>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    stall_if_armed(&state).await;
    read_endpoint(&state, &headers, StubInner::summary)
}

async fn get_chips(
    State(state): State<StubState>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    stall_if_armed(&state).await;
    read_endpoint(&state, &headers, StubInner::chips)
}

async fn get_telemetry(
    State(state): State<StubState>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    stall_if_armed(&state).await;
    read_endpoint(&state, &headers, StubInner::telemetry)
}

fn control_endpoint(
    state: &StubState,
    headers: &HeaderMap,
    path: &str,
    body: Value,
    effect: impl FnOnce(&mut StubInner, &Value),
) -> (StatusCode, Json<Value>) {
    let mut inner = state.inner.lock();
    if take_fault(&mut inner) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "injected fault"})),
        );
    }
    if !authorized(&inner, headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "no session"})),
        );
    }
    effect(&mut inner, &body);
    inner.recorded.push(RecordedCommand {
        path: path.to_string(),
        body,
    });
    (StatusCode::OK, Json(json!({"status": "applied"})))
}

async fn post_hashrate_limit(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    stall_if_armed(&state).await;
    control_endpoint(&state, &headers, "/hashrate-limit", body, |inner, body| {
        if let Some(percent) = body.get("percent").and_then(Value::as_f64) {
            inner.hashrate_limit_percent = percent;
        }
    })
}

async fn post_power_limit(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    stall_if_armed(&state).await;
    control_endpoint(&state, &headers, "/power-limit", body, |inner, body| {
        if let Some(percent) = body.get("percent").and_then(Value::as_f64) {
            inner.power_limit_percent = percent;
        }
    })
}

async fn post_overclock(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    stall_if_armed(&state).await;
    control_endpoint(&state, &headers, "/overclock", body, |inner, body| {
        if let Some(percent) = body.get("power_limit_percent").and_then(Value::as_f64) {
            inner.power_limit_percent = percent;
        }
    })
}
