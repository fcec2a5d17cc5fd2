use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, RwLock};

use crate::config::GaConfig;
use crate::data::{
    BestSchedule, ConflictIssue, FitnessReport, Publication, RankedSchedule, Session, Timetable,
};
use crate::fitness::{FitnessEvaluator, detect_conflicts};
use crate::publish::{
    self, BulkEntry, InMemoryRoster, InMemorySink, ResultSink, Role, RosterSource, ScheduleError,
};

/// Roster store shared between requests.
#[derive(Clone, Default)]
pub struct SharedRoster(Arc<RwLock<InMemoryRoster>>);

impl SharedRoster {
    fn insert(&self, owner: &str, sessions: Vec<Session>) -> Result<(), ScheduleError> {
        self.0
            .write()
            .map_err(|_| ScheduleError::Source("roster store lock poisoned".into()))?
            .insert(owner, sessions);
        Ok(())
    }
}

impl RosterSource for SharedRoster {
    fn fetch_sessions(&self, owner: &str, role: Role) -> Result<Vec<Session>, ScheduleError> {
        self.0
            .read()
            .map_err(|_| ScheduleError::Source("roster store lock poisoned".into()))?
            .fetch_sessions(owner, role)
    }
}

/// Result store shared between requests.
#[derive(Clone, Default)]
pub struct SharedResults(Arc<Mutex<InMemorySink>>);

impl SharedResults {
    fn latest_best(&self, owner: &str) -> Result<Option<BestSchedule>, ScheduleError> {
        let store = self
            .0
            .lock()
            .map_err(|_| ScheduleError::Sink("result store lock poisoned".into()))?;
        Ok(store.best.iter().rev().find(|d| d.owner == owner).cloned())
    }
}

impl ResultSink for SharedResults {
    fn save_ranked(&mut self, documents: &[RankedSchedule]) -> Result<(), ScheduleError> {
        self.0
            .lock()
            .map_err(|_| ScheduleError::Sink("result store lock poisoned".into()))?
            .save_ranked(documents)
    }

    fn save_best(&mut self, document: &BestSchedule) -> Result<(), ScheduleError> {
        self.0
            .lock()
            .map_err(|_| ScheduleError::Sink("result store lock poisoned".into()))?
            .save_best(document)
    }
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<GaConfig>,
    rosters: SharedRoster,
    results: SharedResults,
}

impl AppState {
    pub fn new(config: GaConfig) -> Self {
        Self {
            config: Arc::new(config),
            rosters: SharedRoster::default(),
            results: SharedResults::default(),
        }
    }

    fn config_with_seed(&self, seed: Option<u64>) -> GaConfig {
        let mut config = (*self.config).clone();
        if seed.is_some() {
            config.seed = seed;
        }
        config
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub owner: String,
    pub role: String,
    /// Replaces the stored roster for `owner` before the run.
    pub sessions: Option<Vec<Session>>,
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOwner {
    pub owner: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    pub owners: Vec<BulkOwner>,
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResponse {
    pub issues: Vec<ConflictIssue>,
    pub fitness: FitnessReport,
}

type ApiError = (StatusCode, String);

fn reject(e: ScheduleError) -> ApiError {
    let status = match e {
        ScheduleError::InvalidRole(_) | ScheduleError::Config(_) => StatusCode::BAD_REQUEST,
        ScheduleError::Source(_) | ScheduleError::Sink(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!("Request failed: {}", e);
    (status, e.to_string())
}

async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ScheduleError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(reject)
}

async fn put_roster_handler(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(sessions): Json<Vec<Session>>,
) -> Result<StatusCode, ApiError> {
    state.rosters.insert(&owner, sessions).map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn generate_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<Publication>, ApiError> {
    let role: Role = request.role.parse().map_err(reject)?;
    if let Some(sessions) = request.sessions {
        state.rosters.insert(&request.owner, sessions).map_err(reject)?;
    }
    let config = state.config_with_seed(request.seed);
    let owner = request.owner;
    let rosters = state.rosters.clone();
    let mut results = state.results.clone();

    let published = blocking(move || {
        let mut rng = config.rng();
        publish::run_for_owner(&owner, role, &rosters, &mut results, &config, &mut rng)
    })
    .await?;

    match published {
        Some(p) => Ok(Json(p)),
        None => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "No valid sessions found; no schedule produced.".to_string(),
        )),
    }
}

async fn bulk_handler(
    State(state): State<AppState>,
    Json(request): Json<BulkRequest>,
) -> Result<Json<Vec<BulkEntry>>, ApiError> {
    let config = state.config_with_seed(request.seed);
    let owners: Vec<(String, String)> = request
        .owners
        .into_iter()
        .map(|o| (o.owner, o.role))
        .collect();
    let rosters = state.rosters.clone();
    let mut results = state.results.clone();

    let report = blocking(move || {
        let mut rng = config.rng();
        publish::run_bulk(&owners, &rosters, &mut results, &config, &mut rng)
    })
    .await?;
    Ok(Json(report))
}

async fn best_handler(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<BestSchedule>, ApiError> {
    match state.results.latest_best(&owner).map_err(reject)? {
        Some(best) => Ok(Json(best)),
        None => Err((StatusCode::NOT_FOUND, format!("No schedule stored for {owner}"))),
    }
}

async fn conflicts_handler(
    State(state): State<AppState>,
    Json(timetable): Json<Timetable>,
) -> Json<ConflictResponse> {
    Json(ConflictResponse {
        issues: detect_conflicts(&timetable),
        fitness: FitnessEvaluator::from_config(&state.config).evaluate(&timetable),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/roster/:owner", put(put_roster_handler))
        .route("/v1/timetable/generate", post(generate_handler))
        .route("/v1/timetable/generate/bulk", post(bulk_handler))
        .route("/v1/timetable/conflicts", post(conflicts_handler))
        .route("/v1/timetable/:owner/best", get(best_handler))
        .with_state(state)
}

pub async fn run_server(config: GaConfig, addr: &str) -> std::io::Result<()> {
    let app = router(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await
}
