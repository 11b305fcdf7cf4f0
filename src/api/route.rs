use crate::{
    analysis,
    api::{
        error::ApiError,
        response::{created, with_total_count, ApiResponse},
    },
    db::{task, transaction},
    models::{ChainSummary, NewTask},
    state::AppState,
    validation::{parse_titles, validate_address, validate_limit, validate_offset},
};
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

// POST /track query parameters
#[derive(Deserialize)]
pub struct TrackQuery {
    chain: i64,
    address: String,
    tags: Option<String>,
    services: Option<String>,
}

#[derive(Serialize)]
pub struct TrackResponse {
    tasks: Vec<i64>,
    address: i64,
}

// GET /addresses query parameters, exactly one lookup key is used
#[derive(Deserialize)]
pub struct AddressQuery {
    hash: Option<String>,
    tag: Option<i64>,
    service: Option<i64>,
}

// GET /analysis/address query parameters
#[derive(Deserialize)]
pub struct AnalysisQuery {
    chain: i64,
    address: String,
}

// GET /transactions query parameters
#[derive(Deserialize)]
pub struct TransactionsQuery {
    chain: i64,
    address: String,
    offset: Option<i64>,
    limit: Option<i64>,
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/track", post(track_address))
        .route("/addresses", get(list_addresses))
        .route("/addresses/{id}", get(get_address))
        .route("/tags", get(list_tags))
        .route("/tags/{id}", get(get_tag))
        .route("/services", get(list_services))
        .route("/services/{id}", get(get_service))
        .route("/chains", get(list_chains))
        .route("/chains/{id}", get(get_chain))
        .route("/tasks", get(list_tasks))
        .route("/transactions", get(get_transactions))
        .route("/analysis/address", get(address_relations))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

// Enqueues one crawl task per query template of the chain and seeds the
// address with the requested annotations.
async fn track_address(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrackQuery>,
) -> Result<Response, ApiError> {
    let hash = validate_address(&params.address)?;
    let chain = state
        .config
        .chain(params.chain)
        .ok_or_else(|| ApiError::NotFound(format!("chain {}", params.chain)))?;

    let queries = chain.task_queries(&format!("0x{}", hex::encode(&hash)));
    if queries.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "chain {} has no query templates",
            chain.id
        )));
    }

    let mut tags = BTreeSet::new();
    for title in parse_titles(params.tags.as_deref()) {
        tags.insert(state.registry.resolve_tag(&title).await?);
    }
    let mut services = BTreeSet::new();
    for title in parse_titles(params.services.as_deref()) {
        services.insert(state.registry.resolve_service(&title).await?);
    }

    let mut task_ids = Vec::with_capacity(queries.len());
    for query in queries {
        let new_task = NewTask {
            address: hash.clone(),
            chain: chain.id,
            tags: tags.clone(),
            services: services.clone(),
            query,
        };
        task_ids.push(task::create_task(&state.db_pool, &new_task).await?);
    }

    let address_id = state
        .registry
        .merge_annotations(chain.id, &hash, &tags, &services)
        .await?;

    info!(
        "Tracking {} on {} with tasks {:?}",
        params.address, chain.name, task_ids
    );

    Ok(created(TrackResponse {
        tasks: task_ids,
        address: address_id,
    }))
}

async fn list_addresses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AddressQuery>,
) -> Result<Response, ApiError> {
    let addresses = match (params.hash, params.tag, params.service) {
        (Some(hash), None, None) => {
            let hash = validate_address(&hash)?;
            state.registry.addresses_by_hash(&hash).await?
        }
        (None, Some(tag), None) => state.registry.addresses_by_tag(tag).await?,
        (None, None, Some(service)) => state.registry.addresses_by_service(service).await?,
        _ => {
            return Err(ApiError::BadRequest(
                "exactly one of hash, tag or service is required".to_string(),
            ))
        }
    };

    let count = addresses.len() as i64;
    Ok(with_total_count(addresses, count))
}

async fn get_address(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let address = state
        .registry
        .find_address_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("address {}", id)))?;
    Ok(ApiResponse { data: address }.into_response())
}

async fn get_tag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let tag = state
        .registry
        .find_tag(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("tag {}", id)))?;
    Ok(ApiResponse { data: tag }.into_response())
}

async fn get_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let service = state
        .registry
        .find_service(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("service {}", id)))?;
    Ok(ApiResponse { data: service }.into_response())
}

async fn list_chains(State(state): State<Arc<AppState>>) -> Response {
    let chains: Vec<ChainSummary> = state.config.chains.iter().map(ChainSummary::from).collect();
    let count = chains.len() as i64;
    with_total_count(chains, count)
}

async fn get_chain(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let chain = state
        .config
        .chain(id)
        .ok_or_else(|| ApiError::NotFound(format!("chain {}", id)))?;
    Ok(ApiResponse {
        data: ChainSummary::from(chain),
    }
    .into_response())
}

// Inputs, outputs and mixed counterparties of one tracked address
async fn address_relations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalysisQuery>,
) -> Result<Response, ApiError> {
    let hash = validate_address(&params.address)?;
    let relation = analysis::relation(&state.registry, params.chain, &hash)
        .await?
        .ok_or_else(|| ApiError::NotFound("Address is not tracked".to_string()))?;
    Ok(ApiResponse { data: relation }.into_response())
}

async fn list_tags(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let tags = state.registry.list_tags().await?;
    Ok(ApiResponse { data: tags }.into_response())
}

async fn list_services(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let services = state.registry.list_services().await?;
    Ok(ApiResponse { data: services }.into_response())
}

async fn list_tasks(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let tasks = task::list_tasks(&state.db_pool).await?;
    let count = tasks.len() as i64;
    Ok(with_total_count(tasks, count))
}

async fn get_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TransactionsQuery>,
) -> Result<Response, ApiError> {
    let hash = validate_address(&params.address)?;
    let offset = validate_offset(params.offset)?;
    let limit = validate_limit(params.limit)?;

    let address_id = state
        .registry
        .resolve_address_ids(params.chain, &hash)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound("Address is not tracked".to_string()))?;

    let (transactions, total_count) =
        transaction::transactions_for_address(&state.db_pool, params.chain, address_id, offset, limit)
            .await?;

    Ok(with_total_count(transactions, total_count))
}
