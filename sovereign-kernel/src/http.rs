/**
 * API REST SOVEREIGN - Serveur HTTP du kernel
 *
 * RÔLE :
 * Expose le shell de navigation à n'importe quel frontend (web, terminal).
 * Le frontend affiche des `PanelSnapshot` et relaie les actions utilisateur.
 *
 * ROUTES :
 * - /health, /system/health        ouvertes, liveness + santé kernel
 * - /screens, /navigate/{screen}   catalogue des écrans et navigation
 * - /panel, /panel/{action}        snapshot et actions sur le panneau actif
 *
 * ERREURS :
 * - 404 écran inconnu ou aucun panneau monté
 * - 409 action non supportée par l'écran
 * - 400 paramètre invalide
 *
 * SÉCURITÉ :
 * - Header x-api-key obligatoire sur toutes routes sauf /health*
 * - Clé attendue dans SOVEREIGN_API_KEY ; absente = tout est refusé
 */

use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::health::{HealthTracker, KernelHealth};
use crate::panel::{PanelError, PanelSnapshot};
use crate::screens::Screen;
use crate::shell::{MeshShell, NavigationError};

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    let path = req.uri().path();

    if path.starts_with("/health") {
        return Ok(next.run(req).await);
    }

    let expected = std::env::var("SOVEREIGN_API_KEY").unwrap_or_default();
    if expected.is_empty() {
        warn!("SOVEREIGN_API_KEY not set, API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        warn!(%path, "rejected request without valid api key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

#[derive(Clone)]
pub struct AppState {
    pub shell: Arc<MeshShell>,
    pub health_tracker: HealthTracker,
}

#[derive(Debug, Serialize)]
struct ScreenView {
    path: &'static str,
    title: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct RefreshParams {
    #[serde(default)]
    reseed: bool,
}

fn status_for(err: &NavigationError) -> StatusCode {
    match err {
        NavigationError::UnknownScreen(_) | NavigationError::NoActivePanel => StatusCode::NOT_FOUND,
        NavigationError::Panel(PanelError::Unsupported { .. } | PanelError::Unmounted) => StatusCode::CONFLICT,
        NavigationError::Panel(PanelError::InvalidParameter { .. }) => StatusCode::BAD_REQUEST,
        NavigationError::Panel(PanelError::Telemetry(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: NavigationError) -> ApiError {
    (status_for(&err), Json(json!({ "error": err.to_string() })))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/screens", get(list_screens))
        .route("/navigate/{screen}", post(navigate))
        .route("/panel", get(get_panel))
        .route("/panel/refresh", post(refresh_panel))
        .route("/panel/parameters", post(set_parameters))
        .route("/panel/beacon/toggle", post(toggle_beacon))
        .route("/panel/onboarding/begin", post(begin_onboarding))
        .route("/panel/uplink/start", post(start_uplink))
        .route("/panel/verification/run", post(run_verification))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.shell))
}

// GET /screens
async fn list_screens() -> Json<Vec<ScreenView>> {
    Json(
        Screen::ALL
            .iter()
            .map(|s| ScreenView { path: s.path(), title: s.title() })
            .collect(),
    )
}

// POST /navigate/{screen}
async fn navigate(State(app): State<AppState>, Path(screen): Path<String>) -> ApiResult<PanelSnapshot> {
    app.shell.navigate_path(&screen).map(Json).map_err(reject)
}

// GET /panel
async fn get_panel(State(app): State<AppState>) -> ApiResult<PanelSnapshot> {
    app.shell.snapshot().map(Json).map_err(reject)
}

// POST /panel/refresh?reseed=true
async fn refresh_panel(
    State(app): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> ApiResult<Value> {
    let request = app.shell.refresh(params.reseed).map_err(reject)?;
    Ok(Json(json!({ "request": request, "reseeded": params.reseed })))
}

// POST /panel/parameters {"sector": "Zulu-2"}
async fn set_parameters(
    State(app): State<AppState>,
    Json(updates): Json<BTreeMap<String, String>>,
) -> ApiResult<Value> {
    let request = app.shell.set_parameters(&updates).map_err(reject)?;
    Ok(Json(json!({ "request": request })))
}

async fn toggle_beacon(State(app): State<AppState>) -> ApiResult<Value> {
    let active = app.shell.toggle_beacon().map_err(reject)?;
    Ok(Json(json!({ "active": active })))
}

async fn begin_onboarding(State(app): State<AppState>) -> ApiResult<Value> {
    let started = app.shell.begin_onboarding().map_err(reject)?;
    Ok(Json(json!({ "started": started })))
}

async fn start_uplink(State(app): State<AppState>) -> ApiResult<Value> {
    let started = app.shell.start_uplink().map_err(reject)?;
    Ok(Json(json!({ "started": started })))
}

async fn run_verification(State(app): State<AppState>) -> ApiResult<Value> {
    let started = app.shell.run_verification().map_err(reject)?;
    Ok(Json(json!({ "started": started })))
}
