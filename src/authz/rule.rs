use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use http::Request;
use regex::Regex;

use crate::authz::errors::AuthzError;
use crate::ip::{resolve_client_ip, RealClientIpParser};
use crate::netset::{parse_ip_net, NetSet};

/// Verb surfaced to the caller when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Allow,
    Deny,
}

impl FromStr for Policy {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALLOW" => Ok(Policy::Allow),
            "DENY" => Ok(Policy::Deny),
            other => Err(AuthzError::InvalidPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Allow => write!(f, "ALLOW"),
            Policy::Deny => write!(f, "DENY"),
        }
    }
}

/// A path pattern, keeping the raw regex string alongside its compiled
/// form. The raw form feeds the path index's literalisation heuristic.
#[derive(Debug, Clone)]
pub struct PathRegex {
    raw: String,
    compiled: Regex,
}

impl PathRegex {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.compiled.is_match(path)
    }
}

/// An authorization rule: a policy verb over optional path, method, and
/// client-network predicates. Absent predicates match anything. Immutable
/// once constructed, apart from the hit counter.
#[derive(Debug)]
pub struct Rule {
    id: String,
    policy: Policy,
    path: Option<PathRegex>,
    methods: Option<HashSet<String>>,
    ips: Option<NetSet>,

    // Heuristic only; feeds candidate-list ordering, never decisions.
    hits: AtomicU64,
}

impl Rule {
    /// Build a rule, validating every part. An empty path or empty
    /// method/IP list means the predicate is absent. All unparseable
    /// trusted-IP entries are reported together.
    pub fn new(
        id: impl Into<String>,
        policy: Policy,
        path: Option<&str>,
        methods: Option<&[&str]>,
        ips: Option<&[&str]>,
    ) -> Result<Self, AuthzError> {
        Ok(Self {
            id: id.into(),
            policy,
            path: build_path_regex(path)?,
            methods: build_method_set(methods),
            ips: build_net_set(ips)?,
            hits: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn path(&self) -> Option<&PathRegex> {
        self.path.as_ref()
    }

    pub fn methods(&self) -> Option<&HashSet<String>> {
        self.methods.as_ref()
    }

    pub fn ips(&self) -> Option<&NetSet> {
        self.ips.as_ref()
    }

    /// Times this rule has passed a policy check.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// True iff every present predicate holds for the request.
    pub fn matches<B>(
        &self,
        req: &Request<B>,
        parser: Option<&dyn RealClientIpParser>,
    ) -> bool {
        self.check_path(req) && self.check_methods(req) && self.check_ips(req, parser)
    }

    /// Policy check for an Allow pass; counts a hit on success.
    pub fn allow<B>(&self, req: &Request<B>, parser: Option<&dyn RealClientIpParser>) -> bool {
        if self.policy == Policy::Allow && self.matches(req, parser) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// Policy check for a Deny pass; counts a hit on success.
    pub fn deny<B>(&self, req: &Request<B>, parser: Option<&dyn RealClientIpParser>) -> bool {
        if self.policy == Policy::Deny && self.matches(req, parser) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        false
    }

    fn check_path<B>(&self, req: &Request<B>) -> bool {
        match &self.path {
            None => true,
            Some(path) => path.is_match(req.uri().path()),
        }
    }

    fn check_methods<B>(&self, req: &Request<B>) -> bool {
        match &self.methods {
            None => true,
            Some(methods) => methods.contains(req.method().as_str()),
        }
    }

    /// An unresolved client IP never satisfies an IP predicate: forwarded
    /// headers are spoofable, so failure to resolve must not become a pass.
    fn check_ips<B>(&self, req: &Request<B>, parser: Option<&dyn RealClientIpParser>) -> bool {
        match &self.ips {
            None => true,
            Some(ips) => match resolve_client_ip(parser, req.headers()) {
                Some(addr) => ips.has(addr),
                None => false,
            },
        }
    }
}

fn build_path_regex(path: Option<&str>) -> Result<Option<PathRegex>, AuthzError> {
    let Some(path) = path.filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    let compiled = Regex::new(path).map_err(|source| AuthzError::InvalidPathRegex {
        pattern: path.to_string(),
        source: Box::new(source),
    })?;
    Ok(Some(PathRegex {
        raw: path.to_string(),
        compiled,
    }))
}

fn build_method_set(methods: Option<&[&str]>) -> Option<HashSet<String>> {
    let methods = methods.filter(|m| !m.is_empty())?;
    Some(methods.iter().map(|m| m.to_uppercase()).collect())
}

fn build_net_set(ips: Option<&[&str]>) -> Result<Option<NetSet>, AuthzError> {
    let Some(ips) = ips.filter(|i| !i.is_empty()) else {
        return Ok(None);
    };

    let mut set = NetSet::new();
    let mut failed = Vec::new();
    for trusted in ips {
        match parse_ip_net(trusted) {
            Some(net) => set.add(net),
            None => failed.push(trusted.to_string()),
        }
    }
    if !failed.is_empty() {
        return Err(AuthzError::InvalidTrustedIps(failed.join(", ")));
    }
    Ok(Some(set))
}
