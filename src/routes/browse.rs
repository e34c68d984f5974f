use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::{
    download::DownloadTarget,
    error::{AppError, AppResult},
    jobs,
    middleware::validation::{sanitize_for_logging, validate_index_path},
    state::AppState,
    types::{Listing, SearchResponse},
};

/// Cookie carrying a folder password, so the browser does not have to repeat it.
const PASSWORD_COOKIE: &str = "dir_pwd";

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub key: String,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub file_id: String,
    #[serde(default)]
    pub password: Option<String>,
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| decode_cookie_value(v))
}

/// Cookie values are form-encoded so passwords may hold non-ASCII text, spaces or `;`.
/// A value that does not decode to UTF-8 is used as sent.
pub(crate) fn decode_cookie_value(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            tracing::debug!("{} cookie is not percent-encoded UTF-8: {}", PASSWORD_COOKIE, e);
            raw.to_string()
        }
    }
}

fn schedule_session_refresh(state: &AppState, account_id: &str) {
    if let Err(err) = jobs::trigger_cookie_refresh(state, account_id) {
        tracing::warn!("could not schedule session refresh for {}: {}", account_id, err);
    }
}

fn supplied_password(explicit: Option<String>, headers: &HeaderMap) -> Option<String> {
    explicit.filter(|p| !p.is_empty()).or_else(|| cookie_value(headers, PASSWORD_COOKIE))
}

pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<Listing>> {
    let entry = state.accounts.require(&id)?;
    let path = validate_index_path(&q.path)?;
    let password = supplied_password(q.password, &headers);
    let listing = state.query.list_by_path(entry, &path, password.as_deref()).await?;
    if listing.session_expired {
        schedule_session_refresh(&state, &id);
    }
    Ok(Json(listing))
}

pub async fn search(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<SearchQuery>,
) -> AppResult<Json<SearchResponse>> {
    let entry = state.accounts.require(&id)?;
    let items = state.query.search(entry, &q.key, q.limit).await?;
    tracing::debug!("search {} in {} -> {} hits", sanitize_for_logging(&q.key), id, items.len());
    Ok(Json(SearchResponse { account_id: id, key: q.key, items }))
}

/// Redirects to the remote download URL, or streams the file of a native account.
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(q): Query<DownloadQuery>,
    req: Request,
) -> AppResult<Response> {
    let entry = state.accounts.require(&id)?;
    let password = supplied_password(q.password, &headers);
    let target = match state.downloads.resolve(entry, &q.file_id, password.as_deref()).await {
        Ok(t) => t,
        Err(e @ AppError::SessionExpired(_)) => {
            schedule_session_refresh(&state, &id);
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    match target {
        DownloadTarget::Url(url) => Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response()),
        DownloadTarget::Local(path) => match ServeFile::new(path).oneshot(req).await {
            Ok(res) => Ok(res.into_response()),
            Err(never) => match never {},
        },
    }
}
