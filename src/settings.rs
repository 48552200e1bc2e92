use std::path::Path;
use std::time::Duration;

use miette::{Diagnostic, IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encryption::secret::secret_bytes;

#[derive(Debug, Error, Diagnostic)]
pub enum SettingsError {
    #[error("invalid settings: {}", .0.join("; "))]
    #[diagnostic(
        code(gateward::settings::invalid),
        help("every problem found is listed; fix them all and reload")
    )]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub authorization: AuthorizationSettings,
    #[serde(default)]
    pub cookie: CookieSettings,
}

/// Operator-declared policy for requests that skip authentication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationSettings {
    /// Route specs: either `regex` (all methods) or `METHOD=regex`.
    #[serde(default)]
    pub skip_auth_routes: Vec<String>,
    /// Bare path regexes trusted for all methods.
    #[serde(default)]
    pub skip_auth_regex: Vec<String>,
    /// Trust CORS preflight requests (equivalent to `OPTIONS=.*`).
    #[serde(default)]
    pub skip_auth_preflight: bool,
    /// IPs or CIDR ranges (v4 or v6) trusted to skip authentication.
    #[serde(default)]
    pub trusted_ips: Vec<String>,
}

/// Cookie configuration shared by the session and CSRF cookies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieSettings {
    /// Base cookie name; the CSRF cookie is `${name}_csrf`.
    pub name: String,
    /// Seed for the cookie signature and cipher key. Raw bytes or
    /// base64-url; must resolve to 16, 24, or 32 bytes.
    pub secret: String,
    /// Domains the cookie may be scoped to; the longest match against the
    /// request host wins.
    #[serde(default)]
    pub domains: Vec<String>,
    pub path: String,
    #[serde(with = "duration_secs")]
    pub expire: Duration,
    #[serde(with = "duration_secs")]
    pub refresh: Duration,
    pub secure: bool,
    pub http_only: bool,
    #[serde(default)]
    pub same_site: SameSite,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: "_gateward".to_string(),
            secret: String::new(),
            domains: Vec::new(),
            path: "/".to_string(),
            expire: Duration::from_secs(168 * 3600),
            refresh: Duration::ZERO,
            secure: true,
            http_only: true,
            same_site: SameSite::Unset,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    #[default]
    Unset,
    Lax,
    Strict,
    None,
}

impl SameSite {
    /// The `SameSite` cookie attribute value, or `None` when unset.
    pub fn attribute(&self) -> Option<&'static str> {
        match self {
            SameSite::Unset => None,
            SameSite::Lax => Some("Lax"),
            SameSite::Strict => Some("Strict"),
            SameSite::None => Some("None"),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("cookie.name", CookieSettings::default().name)
            .into_diagnostic()?
            .set_default("cookie.path", CookieSettings::default().path)
            .into_diagnostic()?
            .set_default("cookie.expire", CookieSettings::default().expire.as_secs())
            .into_diagnostic()?
            .set_default("cookie.refresh", 0u64)
            .into_diagnostic()?
            .set_default("cookie.secure", true)
            .into_diagnostic()?
            .set_default("cookie.http_only", true)
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: GATEWARD__COOKIE__SECRET=..., etc.
        builder =
            builder.add_source(config::Environment::with_prefix("GATEWARD").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let settings: Settings = cfg.try_deserialize().into_diagnostic()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check everything checkable before any engine or codec is built,
    /// reporting every problem found rather than the first.
    pub fn validate(&self) -> std::result::Result<(), SettingsError> {
        let problems = self.cookie.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::Invalid(problems))
        }
    }
}

impl CookieSettings {
    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.secret.is_empty() {
            problems.push("missing setting: cookie.secret".to_string());
        } else {
            let len = secret_bytes(&self.secret).len();
            if !matches!(len, 16 | 24 | 32) {
                problems.push(format!(
                    "cookie.secret must be 16, 24, or 32 bytes to create an AES cipher, but is {len} bytes"
                ));
            }
        }

        if self.name.is_empty() {
            problems.push("missing setting: cookie.name".to_string());
        } else if !self.name.bytes().all(is_cookie_name_byte) {
            problems.push(format!("invalid cookie name: {:?}", self.name));
        }
        if self.name.len() > 256 {
            problems.push(format!(
                "cookie name should be under 256 characters: cookie name is {} characters",
                self.name.len()
            ));
        }

        if !self.refresh.is_zero() && self.refresh >= self.expire {
            problems.push(format!(
                "cookie.refresh ({}s) must be less than cookie.expire ({}s)",
                self.refresh.as_secs(),
                self.expire.as_secs()
            ));
        }

        problems
    }
}

// RFC 6265 cookie-name token characters.
fn is_cookie_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
