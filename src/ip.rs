use std::net::{IpAddr, SocketAddr};

use http::header::HeaderName;
use http::HeaderMap;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ClientIpError {
    #[error("request has no `{0}` header")]
    #[diagnostic(code(gateward::ip::missing_header))]
    MissingHeader(HeaderName),

    #[error("could not parse a client IP from `{header}`: {value:?}")]
    #[diagnostic(
        code(gateward::ip::unparseable),
        help("the header must carry an IP address, optionally with a port")
    )]
    Unparseable { header: HeaderName, value: String },
}

/// Capability for resolving the real client IP of a proxied request from a
/// forwarded header. The transport-level peer address is the load balancer,
/// not the client, so IP-based policy must go through one of these.
pub trait RealClientIpParser: Send + Sync {
    fn client_ip(&self, headers: &HeaderMap) -> Result<IpAddr, ClientIpError>;
}

/// Parses the client IP out of a single forwarded header such as
/// `X-Real-IP` or `X-Forwarded-For`. For list-valued headers the first
/// (client-most) entry wins.
#[derive(Debug, Clone)]
pub struct ForwardHeaderParser {
    header: HeaderName,
}

impl ForwardHeaderParser {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }

    pub fn x_real_ip() -> Self {
        Self::new(HeaderName::from_static("x-real-ip"))
    }

    pub fn x_forwarded_for() -> Self {
        Self::new(HeaderName::from_static("x-forwarded-for"))
    }
}

impl RealClientIpParser for ForwardHeaderParser {
    fn client_ip(&self, headers: &HeaderMap) -> Result<IpAddr, ClientIpError> {
        let raw = headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ClientIpError::MissingHeader(self.header.clone()))?;

        let first = raw.split(',').next().unwrap_or(raw).trim();
        parse_addr(first).ok_or_else(|| ClientIpError::Unparseable {
            header: self.header.clone(),
            value: first.to_string(),
        })
    }
}

/// Accepts `ip` or `ip:port` (including `[v6]:port`).
fn parse_addr(s: &str) -> Option<IpAddr> {
    if let Ok(addr) = s.parse::<IpAddr>() {
        return Some(addr);
    }
    if let Ok(sock) = s.parse::<SocketAddr>() {
        return Some(sock.ip());
    }
    None
}

/// Resolve the real client IP for a request, or `None` when it cannot be
/// established. Resolution failure is never allowed to satisfy an IP-based
/// policy: a spoofable header must not produce a pass, so callers treat
/// `None` as not-matching.
pub fn resolve_client_ip(
    parser: Option<&dyn RealClientIpParser>,
    headers: &HeaderMap,
) -> Option<IpAddr> {
    let Some(parser) = parser else {
        tracing::warn!("client IP required by policy but no real-client-IP parser is configured");
        return None;
    };
    match parser.client_ip(headers) {
        Ok(addr) => Some(addr),
        Err(err) => {
            // Possibly a spoofed or stripped forwarded header.
            tracing::warn!(error = %err, "could not obtain real client IP");
            None
        }
    }
}
