//! Gateward - request-authorization core for an OAuth2 reverse-proxy
//! front-end.
//!
//! On every inbound request the [`authz::RulesEngine`] decides whether the
//! request may skip interactive authentication under operator-declared
//! policy (trusted paths, methods, and source networks). Requests that do
//! enter the OAuth flow get CSRF protection across the redirect handshake
//! from [`cookies::csrf::CsrfToken`]. The HTTP listener, provider client,
//! and session stores are consumers of this crate, not part of it.

pub mod authz;
pub mod cookies;
pub mod encryption;
pub mod ip;
pub mod netset;
pub mod session;
pub mod settings;

pub use authz::{build_rules_engine, RulesEngine};
pub use cookies::csrf::CsrfToken;
pub use session::SessionState;
pub use settings::Settings;
