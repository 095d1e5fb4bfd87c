use axum::{extract::State, http::StatusCode, routing::post, Json};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use race_predictor::config::Settings;
use race_predictor::data::load_records;
use race_predictor::{
    ArtifactStore, Corpus, Error, Provenance, QualifyingPredictor, QualifyingRow, StaticTables, StrategyPrediction,
    StrategyPredictor, StrategyRequest, TrackId,
};

type ApiError = (StatusCode, Json<serde_json::Value>);

#[derive(Deserialize, Debug)]
struct QualifyingRequest {
    track: TrackId,
}

#[derive(Clone)]
struct AppState {
    qualifying: Arc<QualifyingPredictor>,
    strategy: Arc<StrategyPredictor>,
}

fn reject(e: Error) -> ApiError {
    let status = match &e {
        Error::UnknownTrack(_) | Error::UnknownDriver(_) | Error::UnknownTeam(_) | Error::UnknownLabel { .. } => {
            StatusCode::BAD_REQUEST
        }
        Error::ModelUnavailable(_) | Error::NoViableStrategy(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("request failed: {}", e);
    }
    (status, Json(json!({ "error": e.to_string() })))
}

fn join_failed(e: tokio::task::JoinError) -> ApiError {
    tracing::error!("prediction task failed: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "prediction task failed" })))
}

fn log_pred() -> bool {
    std::env::var("LOG_PRED").ok().as_deref() == Some("1")
}

async fn qualifying(
    State(state): State<AppState>,
    Json(req): Json<QualifyingRequest>,
) -> Result<Json<Vec<QualifyingRow>>, ApiError> {
    let predictor = state.qualifying.clone();
    let out = tokio::task::spawn_blocking(move || predictor.predict(req.track))
        .await
        .map_err(join_failed)?
        .map_err(reject)?;

    if log_pred() {
        let head: Vec<String> = out
            .rows
            .iter()
            .take(3)
            .map(|r| format!("P{} {} {:.3}", r.position, r.driver_name, r.lap_time))
            .collect();
        tracing::info!(
            "qualifying track={} drivers={} retrained={} top=[{}]",
            req.track,
            out.rows.len(),
            matches!(out.provenance, Provenance::Retrained { .. }),
            head.join(", ")
        );
    }
    Ok(Json(out.rows))
}

async fn strategy(
    State(state): State<AppState>,
    Json(req): Json<StrategyRequest>,
) -> Result<Json<StrategyPrediction>, ApiError> {
    let predictor = state.strategy.clone();
    let out = tokio::task::spawn_blocking(move || predictor.predict(&req))
        .await
        .map_err(join_failed)?
        .map_err(reject)?;

    if log_pred() {
        tracing::info!(
            "strategy track={} p{} wet={} best={} ({:.3}) alternatives={}",
            req.track,
            req.start_position,
            req.is_wet,
            out.prediction.best_strategy,
            out.prediction.best_strategy_confidence,
            out.prediction.alternative_strategies.len()
        );
    }
    Ok(Json(out.prediction))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;
    let model_cfg = settings.model_config()?;
    let tables = match &settings.tables_path {
        Some(p) => StaticTables::load(p)?,
        None => StaticTables::builtin(),
    };
    let tables = Arc::new(tables);

    let corpus = Corpus::build(
        load_records(&settings.historical_path)?,
        load_records(&settings.current_path)?,
        &tables,
    )?;
    let strategy_records = load_records(&settings.strategy_path)?;
    let store = ArtifactStore::new(&settings.model_dir);

    let state = AppState {
        qualifying: Arc::new(QualifyingPredictor::new(
            Arc::new(corpus),
            tables.clone(),
            model_cfg.qualifying,
            store.clone(),
        )),
        strategy: Arc::new(StrategyPredictor::new(
            Arc::new(strategy_records),
            tables,
            model_cfg.strategy,
            store,
        )),
    };

    // Warmup so the first request does not pay for training
    let (q, s) = (state.qualifying.clone(), state.strategy.clone());
    let provenance = tokio::task::spawn_blocking(move || -> race_predictor::Result<_> { Ok((q.warm()?, s.warm()?)) })
        .await??;
    tracing::info!("warmup ok; qualifying {:?}, strategy {:?}", provenance.0, provenance.1);

    let app = axum::Router::new()
        .route("/qualifying", post(qualifying))
        .route("/strategy", post(strategy))
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
