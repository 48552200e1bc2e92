pub mod csrf;

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use http::header::{self, HeaderValue};
use http::{HeaderMap, Request};

use crate::settings::{CookieSettings, SameSite};

/// A cookie about to be attached to a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub domain: Option<String>,
    pub expires: Option<SystemTime>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Cookie {
    /// Serialise into a `Set-Cookie` header value.
    pub fn header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        out.push_str(&format!("; Path={}", self.path));
        if let Some(domain) = &self.domain {
            out.push_str(&format!("; Domain={domain}"));
        }
        if let Some(expires) = self.expires {
            out.push_str(&format!("; Expires={}", http_date(expires)));
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if let Some(same_site) = self.same_site.attribute() {
            out.push_str(&format!("; SameSite={same_site}"));
        }
        out
    }
}

/// Build a cookie from settings, scoping the domain to the request host.
/// `expires` of `None` produces a session cookie.
pub fn make_cookie<B>(
    req: &Request<B>,
    name: &str,
    value: &str,
    opts: &CookieSettings,
    expires: Option<SystemTime>,
) -> Cookie {
    Cookie {
        name: name.to_string(),
        value: value.to_string(),
        path: opts.path.clone(),
        domain: cookie_domain(request_host(req).as_deref(), &opts.domains),
        expires,
        secure: opts.secure,
        http_only: opts.http_only,
        same_site: opts.same_site,
    }
}

/// Append a `Set-Cookie` header. A cookie that cannot be represented as a
/// header value is dropped with a warning rather than failing the request.
pub fn append_set_cookie(headers: &mut HeaderMap, cookie: &Cookie) {
    match HeaderValue::from_str(&cookie.header_value()) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(err) => {
            tracing::warn!(cookie = %cookie.name, error = %err, "dropping unrepresentable Set-Cookie header");
        }
    }
}

/// Look a named cookie up in the request's `Cookie` headers.
pub fn request_cookie<B>(req: &Request<B>, name: &str) -> Option<String> {
    for value in req.headers().get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        for pair in value.split(';') {
            let pair = pair.trim();
            if let Some(v) = pair.strip_prefix(name).and_then(|s| s.strip_prefix('=')) {
                return Some(v.to_string());
            }
        }
    }
    None
}

/// Pick the configured domain scoping the cookie for this request: the
/// longest configured domain the request host falls under.
fn cookie_domain(host: Option<&str>, domains: &[String]) -> Option<String> {
    if domains.is_empty() {
        return None;
    }
    let Some(host) = host else {
        return None;
    };
    let matched = domains
        .iter()
        .filter(|domain| {
            let bare = domain.trim_start_matches('.');
            host == bare || host.ends_with(&format!(".{bare}"))
        })
        .max_by_key(|domain| domain.len());
    if matched.is_none() {
        tracing::warn!(host, "request host matched none of the configured cookie domains");
    }
    matched.cloned()
}

/// Request host, preferring the URI authority over the `Host` header, with
/// any port stripped.
fn request_host<B>(req: &Request<B>) -> Option<String> {
    if let Some(host) = req.uri().host() {
        return Some(host.to_string());
    }
    let host = req.headers().get(header::HOST)?.to_str().ok()?;
    let host = host.rsplit_once(':').map_or(host, |(h, _)| h);
    Some(host.to_string())
}

fn http_date(t: SystemTime) -> String {
    DateTime::<Utc>::from(t)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn request(host: &str) -> Request<()> {
        Request::builder()
            .uri("/oauth2/callback")
            .header(header::HOST, host)
            .body(())
            .unwrap()
    }

    fn opts() -> CookieSettings {
        CookieSettings {
            domains: vec!["example.com".to_string(), "app.example.com".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_header_value_attributes() {
        let cookie = Cookie {
            name: "_gateward_csrf".to_string(),
            value: "abc".to_string(),
            path: "/".to_string(),
            domain: Some("example.com".to_string()),
            expires: Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
        };
        let header = cookie.header_value();
        assert!(header.starts_with("_gateward_csrf=abc; Path=/; Domain=example.com; Expires="));
        assert!(header.contains("GMT"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("Secure"));
        assert!(header.ends_with("SameSite=Lax"));
    }

    #[test]
    fn test_unset_attributes_are_omitted() {
        let cookie = Cookie {
            name: "c".to_string(),
            value: "v".to_string(),
            path: "/".to_string(),
            domain: None,
            expires: None,
            secure: false,
            http_only: false,
            same_site: SameSite::Unset,
        };
        assert_eq!(cookie.header_value(), "c=v; Path=/");
    }

    #[test]
    fn test_longest_domain_wins() {
        let cookie = make_cookie(&request("api.app.example.com"), "c", "v", &opts(), None);
        assert_eq!(cookie.domain.as_deref(), Some("app.example.com"));

        let cookie = make_cookie(&request("www.example.com"), "c", "v", &opts(), None);
        assert_eq!(cookie.domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_unmatched_host_gets_no_domain() {
        let cookie = make_cookie(&request("evil.test"), "c", "v", &opts(), None);
        assert_eq!(cookie.domain, None);
    }

    #[test]
    fn test_host_port_is_stripped() {
        let cookie = make_cookie(&request("example.com:4180"), "c", "v", &opts(), None);
        assert_eq!(cookie.domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_request_cookie_lookup() {
        let req = Request::builder()
            .uri("/")
            .header(header::COOKIE, "a=1; _gateward_csrf=value|123|sig; b=2")
            .body(())
            .unwrap();
        assert_eq!(
            request_cookie(&req, "_gateward_csrf").as_deref(),
            Some("value|123|sig")
        );
        assert_eq!(request_cookie(&req, "missing"), None);
    }

    #[test]
    fn test_append_set_cookie() {
        let mut headers = HeaderMap::new();
        let cookie = Cookie {
            name: "c".to_string(),
            value: "v".to_string(),
            path: "/".to_string(),
            domain: None,
            expires: None,
            secure: false,
            http_only: true,
            same_site: SameSite::Strict,
        };
        append_set_cookie(&mut headers, &cookie);
        let set = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert_eq!(set, "c=v; Path=/; HttpOnly; SameSite=Strict");
    }
}
