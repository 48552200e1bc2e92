use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use http::Request;
use parking_lot::RwLock;

use crate::authz::rule::Rule;
use crate::ip::{resolve_client_ip, RealClientIpParser};
use crate::netset::NetSet;

/// The methods the method index recognises. A rule naming anything outside
/// this list is still accepted; the unknown method just goes unindexed and
/// is caught by the linear fallback.
pub const HTTP_METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "TRACE", "PATCH", "CONNECT",
];

/// Contract shared by the rule indices.
///
/// `match_rules` returns an ordered snapshot of candidate rules; the engine
/// re-validates every candidate with the full rule predicates, so an index
/// may over-approximate freely. `promote` performs the one-step bubble of a
/// just-matched candidate toward the front of its bucket.
pub trait RuleIndex {
    fn name(&self) -> &'static str;

    /// Times this index has produced a non-empty candidate set.
    fn hits(&self) -> u64;

    /// Returns true iff the rule carries information this index can
    /// exploit; such rules are filed, all others are skipped.
    fn index_rule(&mut self, rule: &Arc<Rule>) -> bool;

    fn match_rules<B>(&self, req: &Request<B>) -> Vec<Arc<Rule>>;

    fn promote<B>(&self, req: &Request<B>, pos: usize);
}

/// One-step bubble toward the front of a bucket: a candidate that just
/// matched swaps with its predecessor when it has more hits. Positions are
/// re-checked under the lock since a racing evaluation may have reordered
/// the bucket after the caller's snapshot was taken.
fn promote_in(bucket: &RwLock<Vec<Arc<Rule>>>, pos: usize) {
    if pos == 0 {
        return;
    }
    let mut rules = bucket.write();
    if pos < rules.len() && rules[pos - 1].hits() < rules[pos].hits() {
        rules.swap(pos - 1, pos);
    }
}

/// Indexes rules whose path regex is, effectively, a literal string.
///
/// One leading `^` and one trailing `$` are stripped from the raw pattern
/// and the remainder is used as an exact-match key against the request
/// path. No attempt is made to detect embedded metacharacters: a rule like
/// `/foo/.*` is simply filed under the useless key `/foo/.*`, which no real
/// path equals, and the linear fallback picks it up. Patterns anchoring any
/// other way (e.g. `(?:^)/foo$`) likewise fall through. That limitation
/// is accepted; the index never re-parses patterns to be smarter.
#[derive(Debug, Default)]
pub struct PathIndex {
    paths: HashMap<String, RwLock<Vec<Arc<Rule>>>>,
    hits: AtomicU64,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RuleIndex for PathIndex {
    fn name(&self) -> &'static str {
        "Path"
    }

    fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    fn index_rule(&mut self, rule: &Arc<Rule>) -> bool {
        let Some(path) = rule.path() else {
            return false;
        };
        let raw = path.raw();
        if raw.is_empty() {
            return false;
        }

        let key = raw.strip_prefix('^').unwrap_or(raw);
        let key = key.strip_suffix('$').unwrap_or(key);
        self.paths
            .entry(key.to_string())
            .or_default()
            .get_mut()
            .push(rule.clone());
        true
    }

    fn match_rules<B>(&self, req: &Request<B>) -> Vec<Arc<Rule>> {
        let Some(bucket) = self.paths.get(req.uri().path()) else {
            return Vec::new();
        };
        let rules = bucket.read().clone();
        if !rules.is_empty() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        rules
    }

    fn promote<B>(&self, req: &Request<B>, pos: usize) {
        if let Some(bucket) = self.paths.get(req.uri().path()) {
            promote_in(bucket, pos);
        }
    }
}

/// Indexes rules by HTTP method, one bucket per recognised method.
#[derive(Debug)]
pub struct MethodsIndex {
    methods: HashMap<&'static str, RwLock<Vec<Arc<Rule>>>>,
    hits: AtomicU64,
}

impl MethodsIndex {
    pub fn new() -> Self {
        Self {
            methods: HTTP_METHODS
                .iter()
                .map(|m| (*m, RwLock::new(Vec::new())))
                .collect(),
            hits: AtomicU64::new(0),
        }
    }
}

impl Default for MethodsIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleIndex for MethodsIndex {
    fn name(&self) -> &'static str {
        "Methods"
    }

    fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    fn index_rule(&mut self, rule: &Arc<Rule>) -> bool {
        let Some(methods) = rule.methods() else {
            return false;
        };
        for method in methods {
            if let Some(bucket) = self.methods.get_mut(method.as_str()) {
                bucket.get_mut().push(rule.clone());
            }
        }
        true
    }

    fn match_rules<B>(&self, req: &Request<B>) -> Vec<Arc<Rule>> {
        let Some(bucket) = self.methods.get(req.method().as_str()) else {
            return Vec::new();
        };
        let rules = bucket.read().clone();
        if !rules.is_empty() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        rules
    }

    fn promote<B>(&self, req: &Request<B>, pos: usize) {
        if let Some(bucket) = self.methods.get(req.method().as_str()) {
            promote_in(bucket, pos);
        }
    }
}

/// Indexes IP-restricted rules behind a single accumulator network set.
///
/// The accumulator is the union of every indexed rule's networks: when the
/// client IP falls inside it, all IP-restricted rules become candidates
/// (the engine narrows them down); when it does not, or cannot be
/// resolved at all, none do.
pub struct IpsIndex {
    rules: RwLock<Vec<Arc<Rule>>>,
    trusted: NetSet,
    parser: Option<Arc<dyn RealClientIpParser>>,
    hits: AtomicU64,
}

impl IpsIndex {
    pub fn new(parser: Option<Arc<dyn RealClientIpParser>>) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            trusted: NetSet::new(),
            parser,
            hits: AtomicU64::new(0),
        }
    }
}

impl RuleIndex for IpsIndex {
    fn name(&self) -> &'static str {
        "Network"
    }

    fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    fn index_rule(&mut self, rule: &Arc<Rule>) -> bool {
        let Some(ips) = rule.ips() else {
            return false;
        };
        for net in ips.nets() {
            self.trusted.add(*net);
        }
        self.rules.get_mut().push(rule.clone());
        true
    }

    fn match_rules<B>(&self, req: &Request<B>) -> Vec<Arc<Rule>> {
        let Some(addr) = resolve_client_ip(self.parser.as_deref(), req.headers()) else {
            // Possibly spoofed forwarded header: nothing matches.
            return Vec::new();
        };
        if !self.trusted.has(addr) {
            return Vec::new();
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.rules.read().clone()
    }

    fn promote<B>(&self, _req: &Request<B>, pos: usize) {
        promote_in(&self.rules, pos);
    }
}
