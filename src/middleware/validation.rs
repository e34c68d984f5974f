use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::{AppError, AppResult};

/// Longest index path accepted from clients, in bytes.
pub const MAX_INDEX_PATH_LEN: usize = 4096;

/// Body size limit for admin POSTs, shared with the `DefaultBodyLimit` layer.
pub fn max_body_size() -> usize {
    std::env::var("CLOUDINDEX_MAX_BODY_SIZE")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(64 * 1024)
        .clamp(1024, 1024 * 1024)
}

/// Rejects traversal sequences in the URI (path and query) and oversized bodies before
/// any handler runs.
pub async fn validate_request_middleware(req: Request, next: Next) -> Response {
    let uri = req.uri();
    if contains_path_traversal(uri.path()) || uri.query().is_some_and(contains_path_traversal) {
        return AppError::ValidationError {
            field: "uri".to_string(),
            message: "path traversal detected in request".to_string(),
        }
        .into_response();
    }

    if let Some(ua) = req.headers().get("user-agent").and_then(|v| v.to_str().ok()) {
        if is_suspicious_user_agent(ua) {
            tracing::warn!("Suspicious user agent: {}", sanitize_for_logging(ua));
        }
    }

    let declared = req
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if let Some(length) = declared {
        let limit = max_body_size();
        if length > limit {
            return AppError::BadRequest(format!("request body exceeds {} bytes", limit)).into_response();
        }
    }

    next.run(req).await
}

/// `..` segments, encoded dots/slashes and NUL bytes, in raw or percent-encoded form.
pub fn contains_path_traversal(path: &str) -> bool {
    if path.contains('\0') {
        return true;
    }
    if path.split(['/', '\\', '=', '&']).any(|seg| seg == ".." || seg.contains("....")) {
        return true;
    }
    let lower = path.to_ascii_lowercase();
    ["%2e%2e", "%252e%252e", "%2e/", "/%2e", "%2f%2e", "%2e%5c", "%5c%2e", "%00"]
        .iter()
        .any(|p| lower.contains(p))
}

fn is_suspicious_user_agent(ua: &str) -> bool {
    let ua = ua.to_ascii_lowercase();
    ["nikto", "sqlmap", "havij", "acunetix", "masscan"].iter().any(|tool| ua.contains(tool))
}

/// Validates a user supplied index path (e.g. `/Movies/2024`).
pub fn validate_index_path(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    let invalid = |message: &str| AppError::ValidationError { field: "path".to_string(), message: message.to_string() };
    if trimmed.len() > MAX_INDEX_PATH_LEN {
        return Err(invalid("path too long"));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(invalid("path contains control characters"));
    }
    if trimmed.split('/').any(|seg| seg == "..") {
        return Err(invalid("path must not contain '..' segments"));
    }
    Ok(if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() })
}

/// Strips control characters and caps the length of values written to logs.
pub fn sanitize_for_logging(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_traversal() {
        assert!(contains_path_traversal("/api/../etc/passwd"));
        assert!(contains_path_traversal("path=/a/../b"));
        assert!(contains_path_traversal("/api/%2e%2e/x"));
        assert!(contains_path_traversal("a\0b"));
        assert!(!contains_path_traversal("/api/accounts/main/list"));
        assert!(!contains_path_traversal("path=/Movies/a..b"));
    }

    #[test]
    fn index_path_rules() {
        assert_eq!(validate_index_path("").unwrap(), "/");
        assert_eq!(validate_index_path(" /Movies ").unwrap(), "/Movies");
        assert!(validate_index_path("/a/../b").is_err());
        assert!(validate_index_path("/a\nb").is_err());
        assert!(validate_index_path(&"x".repeat(MAX_INDEX_PATH_LEN + 1)).is_err());
    }

    #[test]
    fn log_sanitizing() {
        assert_eq!(sanitize_for_logging("a\r\nb"), "ab");
        assert_eq!(sanitize_for_logging(&"y".repeat(500)).len(), 200);
    }
}
