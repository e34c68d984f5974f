use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::Stream;
use serde_json::json;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use crate::{
    accounts,
    error::AppResult,
    jobs::{self, TriggerOutcome},
    middleware::validation::validate_index_path,
    state::AppState,
    types::{AccountSummary, RefreshRequest},
};

pub async fn list_accounts(State(state): State<AppState>) -> AppResult<Json<Vec<AccountSummary>>> {
    let rows = accounts::status_rows(&state.db).await?;
    let summaries = state
        .accounts
        .iter()
        .map(|entry| {
            let a = &entry.account;
            let row = rows.iter().find(|r| r.id == a.id);
            AccountSummary {
                id: a.id.clone(),
                name: a.name.clone(),
                mode: a.kind.as_str().to_string(),
                is_default: a.is_default,
                connected: entry.backend().is_ok(),
                status: row.map(|r| r.status.clone()).unwrap_or_else(|| "idle".to_string()),
                cookie_status: row.map(|r| r.cookie_status.clone()).unwrap_or_else(|| "idle".to_string()),
                files_count: row.map(|r| r.files_count).unwrap_or_default(),
                last_synced_at: row.and_then(|r| r.last_synced_at.clone()),
                last_error: row.and_then(|r| r.last_error.clone()),
            }
        })
        .collect();
    Ok(Json(summaries))
}

fn trigger_response(account_id: &str, outcome: TriggerOutcome) -> Response {
    let status = match outcome {
        TriggerOutcome::Accepted => StatusCode::ACCEPTED,
        TriggerOutcome::Busy => StatusCode::CONFLICT,
        TriggerOutcome::Skipped(_) => StatusCode::OK,
    };
    (status, Json(outcome.into_response(account_id))).into_response()
}

pub async fn trigger_sync(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let outcome = jobs::trigger_full_sync(&state, &id)?;
    Ok(trigger_response(&id, outcome))
}

pub async fn trigger_refresh(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(req): Query<RefreshRequest>,
) -> AppResult<Response> {
    let path = validate_index_path(&req.path)?;
    let outcome = jobs::trigger_incremental_sync(&state, &id, &path).await?;
    Ok(trigger_response(&id, outcome))
}

pub async fn trigger_cookie(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let outcome = jobs::trigger_cookie_refresh(&state, &id)?;
    Ok(trigger_response(&id, outcome))
}

pub async fn sync_all(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::ACCEPTED, Json(jobs::trigger_all(&state, jobs::trigger_full_sync)))
}

pub async fn refresh_all_cookies(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::ACCEPTED, Json(jobs::trigger_all(&state, jobs::trigger_cookie_refresh)))
}

/// Live sync events of one account.
pub async fn account_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>> {
    state.accounts.require(&id)?;
    let rx = state.events.subscribe();

    let stream = BroadcastStream::new(rx)
        .filter_map(|res| res.ok())
        .filter(move |ev| ev.account_id() == id)
        .map(|ev| {
            let data = serde_json::to_string(&ev)
                .unwrap_or_else(|_| json!({"type":"warning","message":"serialization error"}).to_string());
            Ok::<Event, std::convert::Infallible>(Event::default().data(data))
        });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(10)).text("keep-alive")))
}
