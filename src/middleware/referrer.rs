use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::AppConfig;
use crate::error::AppError;

/// Hotlink protection for listings and downloads.
///
/// Requests without a `Referer`, or from the serving host itself, always pass. Other
/// referrers pass only when their host is in `index.only_referrer`; an empty list
/// disables the check.
#[derive(Clone, Debug, Default)]
pub struct ReferrerPolicy {
    allowed: Arc<Vec<String>>,
}

impl ReferrerPolicy {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed: Arc::new(allowed) }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.allowed_referrers())
    }

    pub fn permits(&self, referer: Option<&str>, request_host: Option<&str>) -> bool {
        let Some(authority) = referer.and_then(referer_authority) else {
            return true;
        };
        if request_host.is_some_and(|h| h.eq_ignore_ascii_case(&authority)) {
            return true;
        }
        if self.allowed.is_empty() {
            return true;
        }
        let bare = authority.split(':').next().unwrap_or(&authority);
        self.allowed.iter().any(|a| *a == authority || a == bare)
    }
}

/// `host[:port]` of a referrer URL, lowercased. Unparsable or hostless values count as
/// no referrer at all.
fn referer_authority(raw: &str) -> Option<String> {
    let url = url::Url::parse(raw).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

pub async fn referrer_middleware(State(policy): State<ReferrerPolicy>, req: Request, next: Next) -> Response {
    let headers = req.headers();
    let referer = headers.get(header::REFERER).and_then(|v| v.to_str().ok());
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    if policy.permits(referer, host) {
        return next.run(req).await;
    }
    tracing::info!("hotlink blocked: referer {:?} on {}", referer, req.uri().path());
    AppError::Forbidden("Hotlink Forbidden".to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::ReferrerPolicy;

    #[test]
    fn open_policy_allows_everything() {
        let policy = ReferrerPolicy::default();
        assert!(policy.permits(Some("https://elsewhere.example/page"), Some("index.local")));
        assert!(policy.permits(None, None));
    }

    #[test]
    fn restricted_policy() {
        let policy = ReferrerPolicy::new(vec!["blog.example".into(), "wiki.example:8443".into()]);
        assert!(policy.permits(None, Some("index.local")));
        assert!(policy.permits(Some("not a url"), Some("index.local")));
        assert!(policy.permits(Some("http://index.local:8080/x"), Some("index.local:8080")));
        assert!(policy.permits(Some("https://BLOG.example/post"), Some("index.local")));
        assert!(policy.permits(Some("https://blog.example:444/post"), Some("index.local")));
        assert!(policy.permits(Some("https://wiki.example:8443/"), Some("index.local")));
        assert!(!policy.permits(Some("https://wiki.example/"), Some("index.local")));
        assert!(!policy.permits(Some("https://evil.example/"), Some("index.local")));
    }
}
