use axum::http::HeaderMap;
use std::net::IpAddr;

/// Client IP from `X-Forwarded-For` (first hop), then `X-Real-IP`, then the socket
/// address, falling back to loopback when nothing is known.
pub fn extract_ip_from_headers(headers: &HeaderMap, fallback: Option<IpAddr>) -> IpAddr {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|hv| hv.to_str().ok())
        .and_then(|h| h.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());
    let real = || {
        headers
            .get("x-real-ip")
            .and_then(|hv| hv.to_str().ok())
            .and_then(|h| h.trim().parse::<IpAddr>().ok())
    };
    forwarded.or_else(real).or(fallback).unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.3"));
        assert_eq!(extract_ip_from_headers(&headers, None), IpAddr::from([10, 0, 0, 1]));
    }

    #[test]
    fn falls_back_to_socket_then_loopback() {
        let headers = HeaderMap::new();
        let sock = IpAddr::from([192, 168, 1, 9]);
        assert_eq!(extract_ip_from_headers(&headers, Some(sock)), sock);
        assert_eq!(extract_ip_from_headers(&headers, None), IpAddr::from([127, 0, 0, 1]));
    }
}
