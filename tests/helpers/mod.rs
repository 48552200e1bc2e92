use std::time::Duration;

use gateward::settings::{AuthorizationSettings, CookieSettings};
use http::header::{self, HeaderName};
use http::Request;

/// Builder for test requests.
pub struct RequestBuilder {
    method: String,
    path: String,
    headers: Vec<(HeaderName, String)>,
}

impl RequestBuilder {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn from_ip(mut self, ip: &str) -> Self {
        self.headers
            .push((HeaderName::from_static("x-real-ip"), ip.to_string()));
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.headers.push((header::HOST, host.to_string()));
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((header::COOKIE, format!("{name}={value}")));
        self
    }

    pub fn build(self) -> Request<()> {
        let mut builder = Request::builder().method(self.method.as_str()).uri(self.path);
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        builder.body(()).expect("valid test request")
    }
}

pub fn request(method: &str, path: &str) -> Request<()> {
    RequestBuilder::new(method, path).build()
}

/// Cookie settings with a usable 32-byte secret.
pub fn cookie_settings() -> CookieSettings {
    CookieSettings {
        // Not valid base64, so taken as 32 raw bytes.
        secret: "integration-test-secret-32-byte!".to_string(),
        expire: Duration::from_secs(3600),
        ..Default::default()
    }
}

/// Builder for authorization settings.
#[derive(Default)]
pub struct AuthorizationBuilder {
    settings: AuthorizationSettings,
}

impl AuthorizationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, route: &str) -> Self {
        self.settings.skip_auth_routes.push(route.to_string());
        self
    }

    pub fn regex(mut self, regex: &str) -> Self {
        self.settings.skip_auth_regex.push(regex.to_string());
        self
    }

    pub fn preflight(mut self) -> Self {
        self.settings.skip_auth_preflight = true;
        self
    }

    pub fn trusted_ip(mut self, entry: &str) -> Self {
        self.settings.trusted_ips.push(entry.to_string());
        self
    }

    pub fn build(self) -> AuthorizationSettings {
        self.settings
    }
}
