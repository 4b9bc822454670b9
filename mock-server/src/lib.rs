//! In-memory company API that answers in every shape the request adapter
//! classifies: plain success, validation errors, server messages, bare error
//! statuses, authentication failures and malformed bodies.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

/// Token accepted by `GET /me`.
pub const API_TOKEN: &str = "test-token";

/// Id of the company present in a fresh store.
pub const SEED_ID: u64 = 7;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: u64,
    pub name: String,
}

#[derive(Deserialize)]
pub struct CompanyInput {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    companies: Arc<RwLock<BTreeMap<u64, Company>>>,
    next_id: Arc<AtomicU64>,
}

impl AppState {
    fn seeded() -> Self {
        let mut companies = BTreeMap::new();
        companies.insert(
            SEED_ID,
            Company {
                id: SEED_ID,
                name: "Acme".to_string(),
            },
        );
        Self {
            companies: Arc::new(RwLock::new(companies)),
            next_id: Arc::new(AtomicU64::new(SEED_ID + 1)),
        }
    }
}

pub fn app() -> Router {
    Router::new()
        .route("/companies", get(list_companies).post(create_company))
        .route(
            "/companies/{id}",
            get(get_company).put(update_company).delete(delete_company),
        )
        .route("/me", get(me))
        .route("/failure", get(failure))
        .route("/malformed", get(malformed))
        .route("/unavailable", get(unavailable))
        .route("/proxied", get(proxied))
        .with_state(AppState::seeded())
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "mock server listening");
    }
    axum::serve(listener, app()).await
}

fn message(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn validation_failed(errors: Value) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "message": "Invalid data", "errors": errors })),
    )
        .into_response()
}

fn validated_name(input: &CompanyInput) -> Result<String, Response> {
    match input.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(validation_failed(json!({ "name": ["required"] }))),
    }
}

async fn list_companies(State(state): State<AppState>) -> Json<Vec<Company>> {
    let companies = state.companies.read().await;
    Json(companies.values().cloned().collect())
}

async fn create_company(
    State(state): State<AppState>,
    Json(input): Json<CompanyInput>,
) -> Response {
    let name = match validated_name(&input) {
        Ok(name) => name,
        Err(response) => return response,
    };
    let company = Company {
        id: state.next_id.fetch_add(1, Ordering::SeqCst),
        name,
    };
    state
        .companies
        .write()
        .await
        .insert(company.id, company.clone());
    tracing::debug!(id = company.id, "company created");
    (StatusCode::CREATED, Json(company)).into_response()
}

async fn get_company(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let companies = state.companies.read().await;
    match companies.get(&id) {
        Some(company) => Json(company.clone()).into_response(),
        None => message(StatusCode::NOT_FOUND, "Company not found"),
    }
}

async fn update_company(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(input): Json<CompanyInput>,
) -> Response {
    let name = match validated_name(&input) {
        Ok(name) => name,
        Err(response) => return response,
    };
    let mut companies = state.companies.write().await;
    match companies.get_mut(&id) {
        Some(company) => {
            company.name = name;
            Json(company.clone()).into_response()
        }
        None => message(StatusCode::NOT_FOUND, "Company not found"),
    }
}

async fn delete_company(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let mut companies = state.companies.write().await;
    match companies.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => message(StatusCode::NOT_FOUND, "Company not found"),
    }
}

async fn me(headers: HeaderMap) -> Response {
    let expected = format!("Bearer {API_TOKEN}");
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected);
    if authorized {
        Json(json!({ "id": 1, "name": "Test User" })).into_response()
    } else {
        message(StatusCode::UNAUTHORIZED, "Unauthenticated.")
    }
}

async fn failure() -> Response {
    message(StatusCode::INTERNAL_SERVER_ERROR, "Internal failure")
}

async fn malformed() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        "{not json",
    )
        .into_response()
}

async fn unavailable() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn proxied() -> Response {
    message(
        StatusCode::PROXY_AUTHENTICATION_REQUIRED,
        "Proxy authentication required",
    )
}
