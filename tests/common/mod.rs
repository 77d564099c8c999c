// SPDX-License-Identifier: MIT

//! Shared test harness: a recording reply sink, a scripted Strava stub
//! server, and an app builder wiring both to an in-memory database.

use async_trait::async_trait;
use axum::extract::{Form, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use kudobot::config::Config;
use kudobot::db::Database;
use kudobot::error::AppError;
use kudobot::models::Update;
use kudobot::routes::create_router;
use kudobot::services::{
    Button, CommandRouter, LinkService, MutualLikeService, PendingLinks, ReplySink, StravaClient,
    StravaService,
};
use kudobot::AppState;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ─── Recording reply sink ────────────────────────────────────────

/// Everything the bot tried to send, in order.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Sent {
    Text {
        user_id: i64,
        text: String,
        buttons: Vec<Button>,
    },
    Photo {
        user_id: i64,
        url: String,
    },
    Edit {
        chat_id: i64,
        message_id: i64,
        text: String,
    },
    Ack {
        callback_id: String,
        toast: Option<String>,
    },
}

/// `ReplySink` that records instead of talking to Telegram.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<Sent>>,
    photo_send_error: AtomicBool,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn all(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Text messages delivered to one user, in order.
    pub fn texts_to(&self, user_id: i64) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text {
                    user_id: uid, text, ..
                } if uid == user_id => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Photo URLs delivered to one user, in order.
    pub fn photos_to(&self, user_id: i64) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Photo {
                    user_id: uid, url, ..
                } if uid == user_id => Some(url),
                _ => None,
            })
            .collect()
    }

    /// The URL behind the last URL button sent to a user (the authorize link).
    pub fn last_url_button_to(&self, user_id: i64) -> Option<String> {
        self.all()
            .into_iter()
            .rev()
            .filter_map(|s| match s {
                Sent::Text {
                    user_id: uid,
                    buttons,
                    ..
                } if uid == user_id => Some(buttons),
                _ => None,
            })
            .flat_map(|buttons| buttons.into_iter())
            .find_map(|b| match b.action {
                kudobot::services::telegram::ButtonAction::Url(url) => Some(url),
                _ => None,
            })
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Make every subsequent `send_photo` fail with a transport error.
    pub fn break_photo_delivery(&self) {
        self.photo_send_error.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn send_text(
        &self,
        user_id: i64,
        text: &str,
        buttons: &[Button],
    ) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(Sent::Text {
            user_id,
            text: text.to_string(),
            buttons: buttons.to_vec(),
        });
        Ok(())
    }

    async fn send_photo(&self, user_id: i64, url: &str) -> Result<(), AppError> {
        if self.photo_send_error.load(Ordering::SeqCst) {
            return Err(AppError::Transport("photo delivery failed".to_string()));
        }
        self.sent.lock().unwrap().push(Sent::Photo {
            user_id,
            url: url.to_string(),
        });
        Ok(())
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(Sent::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn acknowledge_callback(
        &self,
        callback_id: &str,
        toast: Option<&str>,
    ) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(Sent::Ack {
            callback_id: callback_id.to_string(),
            toast: toast.map(|t| t.to_string()),
        });
        Ok(())
    }
}

// ─── Scripted Strava stub ────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum StubResp {
    Json(Value),
    Status(u16),
}

impl IntoResponse for StubResp {
    fn into_response(self) -> Response {
        match self {
            StubResp::Json(v) => Json(v).into_response(),
            StubResp::Status(s) => StatusCode::from_u16(s)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response(),
        }
    }
}

/// Scripted Strava API double. Responses are keyed by access token so tests
/// can verify which token a call was made with.
pub struct StravaStub {
    pub exchange: Mutex<StubResp>,
    pub refresh: Mutex<StubResp>,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub activities_calls: AtomicUsize,
    pub athlete_by_token: Mutex<HashMap<String, Value>>,
    pub activities_by_token: Mutex<HashMap<String, Value>>,
    pub photos_by_activity: Mutex<HashMap<String, StubResp>>,
    /// Statuses served (in order) before the scripted activities response.
    pub activities_failures: Mutex<Vec<u16>>,
}

impl Default for StravaStub {
    fn default() -> Self {
        Self {
            exchange: Mutex::new(StubResp::Status(400)),
            refresh: Mutex::new(StubResp::Status(400)),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            activities_calls: AtomicUsize::new(0),
            athlete_by_token: Mutex::new(HashMap::new()),
            activities_by_token: Mutex::new(HashMap::new()),
            photos_by_activity: Mutex::new(HashMap::new()),
            activities_failures: Mutex::new(Vec::new()),
        }
    }
}

#[allow(dead_code)]
impl StravaStub {
    /// Script a successful code exchange.
    pub fn grant_on_exchange(&self, access: &str, refresh: &str, expires_in: i64) {
        *self.exchange.lock().unwrap() = StubResp::Json(json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": expires_in,
        }));
    }

    /// Script a successful token refresh.
    pub fn grant_on_refresh(&self, access: &str, refresh: &str, expires_in: i64) {
        *self.refresh.lock().unwrap() = StubResp::Json(json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": expires_in,
        }));
    }

    pub fn fail_refresh(&self, status: u16) {
        *self.refresh.lock().unwrap() = StubResp::Status(status);
    }

    pub fn set_athlete(&self, token: &str, id: u64, firstname: &str, lastname: &str) {
        self.athlete_by_token.lock().unwrap().insert(
            token.to_string(),
            json!({ "id": id, "firstname": firstname, "lastname": lastname }),
        );
    }

    pub fn set_activities(&self, token: &str, activities: Value) {
        self.activities_by_token
            .lock()
            .unwrap()
            .insert(token.to_string(), activities);
    }

    pub fn set_photos(&self, activity_id: u64, photos: Value) {
        self.photos_by_activity
            .lock()
            .unwrap()
            .insert(activity_id.to_string(), StubResp::Json(photos));
    }

    /// Answer the photos call for one activity with a bare status.
    pub fn fail_photos(&self, activity_id: u64, status: u16) {
        self.photos_by_activity
            .lock()
            .unwrap()
            .insert(activity_id.to_string(), StubResp::Status(status));
    }

    /// Answer the next activities calls with these statuses, in order,
    /// before falling back to the scripted response.
    pub fn fail_next_activities(&self, statuses: &[u16]) {
        self.activities_failures
            .lock()
            .unwrap()
            .extend_from_slice(statuses);
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.to_string())
}

async fn stub_token(
    State(stub): State<Arc<StravaStub>>,
    Form(form): Form<HashMap<String, String>>,
) -> StubResp {
    if form.get("grant_type").map(|s| s.as_str()) == Some("refresh_token") {
        stub.refresh_calls.fetch_add(1, Ordering::SeqCst);
        stub.refresh.lock().unwrap().clone()
    } else {
        stub.exchange_calls.fetch_add(1, Ordering::SeqCst);
        stub.exchange.lock().unwrap().clone()
    }
}

async fn stub_athlete(State(stub): State<Arc<StravaStub>>, headers: HeaderMap) -> StubResp {
    let Some(token) = bearer(&headers) else {
        return StubResp::Status(401);
    };
    match stub.athlete_by_token.lock().unwrap().get(&token) {
        Some(v) => StubResp::Json(v.clone()),
        None => StubResp::Status(401),
    }
}

async fn stub_activities(State(stub): State<Arc<StravaStub>>, headers: HeaderMap) -> StubResp {
    stub.activities_calls.fetch_add(1, Ordering::SeqCst);

    {
        let mut failures = stub.activities_failures.lock().unwrap();
        if !failures.is_empty() {
            return StubResp::Status(failures.remove(0));
        }
    }

    let Some(token) = bearer(&headers) else {
        return StubResp::Status(401);
    };
    match stub.activities_by_token.lock().unwrap().get(&token) {
        Some(v) => StubResp::Json(v.clone()),
        None => StubResp::Status(401),
    }
}

async fn stub_photos(
    State(stub): State<Arc<StravaStub>>,
    Path(activity_id): Path<String>,
) -> StubResp {
    match stub.photos_by_activity.lock().unwrap().get(&activity_id) {
        Some(resp) => resp.clone(),
        None => StubResp::Json(json!([])),
    }
}

/// Start the stub server on an ephemeral port; returns (stub, base URL).
pub async fn spawn_strava_stub() -> (Arc<StravaStub>, String) {
    let stub = Arc::new(StravaStub::default());

    let app = axum::Router::new()
        .route("/oauth/token", post(stub_token))
        .route("/api/v3/athlete", get(stub_athlete))
        .route("/api/v3/athlete/activities", get(stub_activities))
        .route("/api/v3/activities/{id}/photos", get(stub_photos))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    (stub, format!("http://{}", addr))
}

// ─── App builder ─────────────────────────────────────────────────

#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub db: Database,
    pub sink: Arc<RecordingSink>,
    pub stub: Arc<StravaStub>,
    pub pending: Arc<PendingLinks>,
    pub links: LinkService,
    pub strava: StravaService,
    pub commands: CommandRouter,
    pub config: Config,
}

/// Build a full app against an in-memory database and the Strava stub.
#[allow(dead_code)]
pub async fn spawn_app() -> TestApp {
    let (stub, stub_base) = spawn_strava_stub().await;

    let config = Config::default();
    let db = Database::in_memory().await.expect("in-memory db");

    let sink = Arc::new(RecordingSink::default());
    let sink_dyn: Arc<dyn ReplySink> = sink.clone();

    let strava = StravaService::new(
        StravaClient::with_urls(
            config.strava_client_id.clone(),
            config.strava_client_secret.clone(),
            format!("{}/api/v3", stub_base),
            format!("{}/oauth/token", stub_base),
        ),
        db.clone(),
    );

    let pending = Arc::new(PendingLinks::new());
    let links = LinkService::new(
        pending.clone(),
        strava.clone(),
        db.clone(),
        sink_dyn.clone(),
        config.strava_client_id.clone(),
        config.oauth_redirect_uri(),
    );

    let mutual = MutualLikeService::new(db.clone(), strava.clone(), sink_dyn.clone());
    let commands = CommandRouter::new(
        db.clone(),
        strava.clone(),
        links.clone(),
        mutual,
        sink_dyn,
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        commands: commands.clone(),
        links: links.clone(),
    });

    TestApp {
        router: create_router(state),
        db,
        sink,
        stub,
        pending,
        links,
        strava,
        commands,
        config,
    }
}

// ─── Update builders ─────────────────────────────────────────────

/// A text-command update as Telegram would deliver it.
#[allow(dead_code)]
pub fn command_update(user_id: i64, text: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": 1,
        "message": {
            "message_id": 10,
            "chat": { "id": user_id, "type": "private" },
            "from": { "id": user_id, "is_bot": false, "first_name": "T" },
            "text": text
        }
    }))
    .expect("valid update")
}

/// A callback-button update (like button, legacy code, ...).
#[allow(dead_code)]
pub fn callback_update(user_id: i64, data: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": 2,
        "callback_query": {
            "id": format!("cb-{}-{}", user_id, data),
            "from": { "id": user_id, "is_bot": false, "first_name": "T" },
            "data": data,
            "message": {
                "message_id": 11,
                "chat": { "id": user_id, "type": "private" }
            }
        }
    }))
    .expect("valid update")
}

/// Extract the `state` query parameter from an authorize URL.
#[allow(dead_code)]
pub fn state_param(url: &str) -> String {
    url.split("state=")
        .nth(1)
        .map(|rest| rest.split('&').next().unwrap_or(rest))
        .expect("authorize URL carries a state")
        .to_string()
}
