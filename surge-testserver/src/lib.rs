use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub use axum::http::StatusCode;

pub const PATH_RESERVAS: &str = "/reservas";
pub const PATH_HEALTH: &str = "/health";

const STATUS_PENDING_PAYMENT: &str = "PENDING_PAYMENT";

/// Behaviour knobs for `POST /reservas`.
#[derive(Debug, Clone, Default)]
pub struct TestServerOptions {
    /// Answer every reservation with this status instead of `202`, without storing anything.
    pub force_status: Option<StatusCode>,
    /// Artificial latency added before answering a reservation.
    pub delay: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    saw_json_content_type: Arc<AtomicU64>,
    rejected_payloads: Arc<AtomicU64>,
    user_ids: Arc<Mutex<HashSet<String>>>,
}

impl TestServerStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_saw_json_content_type(&self) {
        self.saw_json_content_type.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_rejected_payloads(&self) {
        self.rejected_payloads.fetch_add(1, Ordering::Relaxed);
    }

    fn saw_user_id(&self, user_id: &str) {
        self.user_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(user_id.to_string());
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn saw_json_content_type(&self) -> u64 {
        self.saw_json_content_type.load(Ordering::Relaxed)
    }

    pub fn rejected_payloads(&self) -> u64 {
        self.rejected_payloads.load(Ordering::Relaxed)
    }

    pub fn distinct_user_ids(&self) -> usize {
        self.user_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub reservation_id: String,
    pub user_id: String,
    pub amount: serde_json::Number,
    pub status: String,
}

#[derive(Clone)]
struct AppState {
    options: TestServerOptions,
    stats: TestServerStats,
    reservations: Arc<Mutex<HashMap<String, Reservation>>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

fn bad_request(error: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error })).into_response()
}

fn default_amount() -> serde_json::Number {
    serde_json::Number::from(100)
}

async fn handle_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.stats.inc_requests_total();

    if headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("application/json"))
    {
        state.stats.inc_saw_json_content_type();
    }

    if !state.options.delay.is_zero() {
        sleep(state.options.delay).await;
    }

    if let Some(status) = state.options.force_status {
        return (status, Json(ErrorBody { error: "forced status" })).into_response();
    }

    let Ok(Value::Object(payload)) = serde_json::from_slice::<Value>(&body) else {
        state.stats.inc_rejected_payloads();
        return bad_request("body must be a JSON object");
    };

    let user_id = match payload.get("userId") {
        None => "anon".to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(_) => {
            state.stats.inc_rejected_payloads();
            return bad_request("userId must be a non-empty string");
        }
    };
    let amount = match payload.get("amount") {
        None => default_amount(),
        Some(Value::Number(n)) => n.clone(),
        Some(_) => {
            state.stats.inc_rejected_payloads();
            return bad_request("amount must be a number");
        }
    };

    state.stats.saw_user_id(&user_id);

    let reservation = Reservation {
        reservation_id: uuid::Uuid::new_v4().to_string(),
        user_id,
        amount,
        status: STATUS_PENDING_PAYMENT.to_string(),
    };
    state
        .reservations
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(reservation.reservation_id.clone(), reservation.clone());

    (StatusCode::ACCEPTED, Json(reservation)).into_response()
}

async fn handle_get(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    state.stats.inc_requests_total();

    let found = state
        .reservations
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(&id)
        .cloned();

    match found {
        Some(r) => (StatusCode::OK, Json(r)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "reservation not found",
            }),
        )
            .into_response(),
    }
}

async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    state.stats.inc_requests_total();
    Json(serde_json::json!({ "status": "ok", "service": "reservas" }))
}

pub fn router(options: TestServerOptions, stats: TestServerStats) -> Router {
    let state = AppState {
        options,
        stats,
        reservations: Arc::default(),
    };

    Router::new()
        .route(PATH_RESERVAS, post(handle_create))
        .route("/reservas/{id}", get(handle_get))
        .route(PATH_HEALTH, get(handle_health))
        .with_state(state)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerOptions::default()).await
    }

    pub async fn start_with(options: TestServerOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(options, stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn reservas_url(&self) -> String {
        format!("{}{PATH_RESERVAS}", self.base_url)
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
