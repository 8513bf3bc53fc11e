use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::catalog;
use crate::cli::ServeArgs;
use crate::lookup::{LookupError, LookupOptions, lookup};
use crate::relay::{ChatRelay, ChatTurn};
use crate::store::{self, DataStore};

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn DataStore>,
    relay: Arc<ChatRelay>,
    lookup: LookupOptions,
}

impl AppState {
    pub fn new(store: Arc<dyn DataStore>, relay: ChatRelay, lookup: LookupOptions) -> Self {
        Self {
            store,
            relay: Arc::new(relay),
            lookup,
        }
    }
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let http = opts.http.client()?;
    let store = store::open(&opts.store, http.clone()).context("open data store")?;
    let relay = opts.relay.relay(http);
    let state = AppState::new(
        store,
        relay,
        LookupOptions {
            encounter_cap: opts.encounter_cap,
        },
    );

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/payers", get(api_payers))
        .route("/api/procedures", get(api_procedures))
        .route("/api/search", get(api_search))
        .route("/api/chat", post(api_chat))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.into(),
        }),
    )
        .into_response()
}

async fn api_payers(State(st): State<AppState>) -> impl IntoResponse {
    match catalog::list_payers(st.store.as_ref()).await {
        Ok(v) => Json(v).into_response(),
        Err(e) => {
            tracing::error!("Error fetching insurance plans: {e:#}");
            error_response(StatusCode::BAD_GATEWAY, "Failed to fetch insurance plans")
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProceduresParams {
    q: Option<String>,
}

async fn api_procedures(
    State(st): State<AppState>,
    Query(p): Query<ProceduresParams>,
) -> impl IntoResponse {
    match catalog::list_procedures(st.store.as_ref(), p.q.as_deref()).await {
        Ok(v) => Json(v).into_response(),
        Err(e) => {
            tracing::error!("Error fetching procedures: {e:#}");
            error_response(StatusCode::BAD_GATEWAY, "Failed to fetch procedures")
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    procedure: String,
    payer: String,
}

async fn api_search(
    State(st): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> impl IntoResponse {
    let Ok(Query(p)) = params else {
        return error_response(StatusCode::BAD_REQUEST, "procedure and payer are required");
    };
    if p.procedure.trim().is_empty() || p.payer.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "procedure and payer are required");
    }

    match lookup(st.store.as_ref(), &p.procedure, &p.payer, st.lookup).await {
        Ok(out) => Json(out).into_response(),
        Err(LookupError::NotFound(why)) => {
            tracing::warn!("Lookup found nothing: {why}");
            error_response(StatusCode::NOT_FOUND, why)
        }
        Err(e @ LookupError::Upstream(_)) => {
            tracing::error!("Lookup failed: {e}");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    messages: Vec<ChatTurn>,
}

async fn api_chat(
    State(st): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("Chat API error: {e}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process chat request",
            );
        }
    };

    match st.relay.relay(&req.messages).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => {
            tracing::error!("Chat API error: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.client_message())
        }
    }
}
