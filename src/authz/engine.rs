use std::collections::HashSet;
use std::sync::Arc;

use http::Request;
use parking_lot::RwLock;
use rand::Rng;

use crate::authz::index::{IpsIndex, MethodsIndex, PathIndex, RuleIndex};
use crate::authz::rule::Rule;
use crate::ip::RealClientIpParser;

/// Rule count past which evaluation switches from the plain linear scan to
/// index-assisted lookup with self-reorganisation.
const OPTIMIZE_THRESHOLD: usize = 5;

/// One evaluation in this many triggers an index-reordering pass.
const REORDER_ONE_IN: u32 = 100;

/// Tag for dispatching to the engine's index singletons. The active list
/// orders these by first activation, then drifts toward high-hit-first
/// under the probabilistic reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexKind {
    Path,
    Methods,
    Ips,
}

/// Evaluates Allow/Deny rules against requests.
///
/// Small rule sets are scanned linearly in insertion order. Past
/// `OPTIMIZE_THRESHOLD` rules, active indices produce candidate lists
/// first and a linear sweep over whatever they did not cover completes the
/// evaluation, so index misses can never change an answer, only its cost.
///
/// Evaluation never fails: every runtime defect (unresolvable client IP,
/// racing reorder) collapses to "no match" or to the fallback sweep.
pub struct RulesEngine {
    rules: Vec<Arc<Rule>>,
    active: RwLock<Vec<IndexKind>>,
    optimize: bool,

    path_index: PathIndex,
    methods_index: MethodsIndex,
    ips_index: IpsIndex,

    parser: Option<Arc<dyn RealClientIpParser>>,
}

impl std::fmt::Debug for RulesEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulesEngine")
            .field("rules", &self.rules.len())
            .field("optimize", &self.optimize)
            .finish()
    }
}

impl RulesEngine {
    pub fn new(parser: Option<Arc<dyn RealClientIpParser>>) -> Self {
        Self {
            rules: Vec::new(),
            active: RwLock::new(Vec::new()),
            optimize: false,
            path_index: PathIndex::new(),
            methods_index: MethodsIndex::new(),
            ips_index: IpsIndex::new(parser.clone()),
            parser,
        }
    }

    /// Append a rule and offer it to each index singleton. An index joins
    /// the active list the first time it accepts a rule.
    pub fn add_rule(&mut self, rule: Rule) {
        let rule = Arc::new(rule);
        self.rules.push(rule.clone());

        if self.path_index.index_rule(&rule) {
            self.activate(IndexKind::Path);
        }
        if self.methods_index.index_rule(&rule) {
            self.activate(IndexKind::Methods);
        }
        if self.ips_index.index_rule(&rule) {
            self.activate(IndexKind::Ips);
        }

        if self.rules.len() > OPTIMIZE_THRESHOLD {
            self.optimize = true;
        }
    }

    /// All rules, in insertion order.
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    /// True iff some ALLOW rule matches the request.
    pub fn allow<B>(&self, req: &Request<B>) -> bool {
        self.check(req, |rule, req| rule.allow(req, self.parser.as_deref()))
    }

    /// True iff some DENY rule matches the request.
    pub fn deny<B>(&self, req: &Request<B>) -> bool {
        self.check(req, |rule, req| rule.deny(req, self.parser.as_deref()))
    }

    fn check<B>(&self, req: &Request<B>, checker: impl Fn(&Rule, &Request<B>) -> bool) -> bool {
        if !self.optimize {
            return self.rules.iter().any(|rule| checker(rule, req));
        }

        // Occasionally drift high-hit indices toward the front.
        if rand::thread_rng().gen_range(0..REORDER_ONE_IN) == 0 {
            self.prioritize_indices();
        }

        // Memoize rules already evaluated, so overlapping indices and the
        // fallback sweep never evaluate (or hit-count) a rule twice.
        let mut checked: HashSet<String> = HashSet::with_capacity(self.rules.len());

        let order = self.active.read().clone();
        for kind in order {
            let candidates = self.match_rules(kind, req);
            for (pos, rule) in candidates.iter().enumerate() {
                if checked.contains(rule.id()) {
                    continue;
                }
                if checker(rule, req) {
                    self.promote(kind, req, pos);
                    return true;
                }
                checked.insert(rule.id().to_string());
            }
        }

        // Whatever no index surfaced: the deterministic, insertion-ordered
        // sweep. Never reordered: it is the stable baseline the indices
        // are checked against.
        for rule in &self.rules {
            if checked.contains(rule.id()) {
                continue;
            }
            if checker(rule, req) {
                return true;
            }
        }

        false
    }

    fn activate(&mut self, kind: IndexKind) {
        let name = self.index_name(kind);
        let active = self.active.get_mut();
        if !active.contains(&kind) {
            tracing::debug!(index = name, "rule index activated");
            active.push(kind);
        }
    }

    /// One pairwise pass, front to back: a single bubble step per
    /// triggering call, not a sort. The list converges toward high-hit
    /// order under a stable workload without ever paying for full sorting
    /// on the hot path.
    fn prioritize_indices(&self) {
        let mut active = self.active.write();
        for i in 1..active.len() {
            if self.index_hits(active[i - 1]) < self.index_hits(active[i]) {
                active.swap(i - 1, i);
            }
        }
    }

    fn match_rules<B>(&self, kind: IndexKind, req: &Request<B>) -> Vec<Arc<Rule>> {
        match kind {
            IndexKind::Path => self.path_index.match_rules(req),
            IndexKind::Methods => self.methods_index.match_rules(req),
            IndexKind::Ips => self.ips_index.match_rules(req),
        }
    }

    fn promote<B>(&self, kind: IndexKind, req: &Request<B>, pos: usize) {
        match kind {
            IndexKind::Path => self.path_index.promote(req, pos),
            IndexKind::Methods => self.methods_index.promote(req, pos),
            IndexKind::Ips => self.ips_index.promote(req, pos),
        }
    }

    fn index_hits(&self, kind: IndexKind) -> u64 {
        match kind {
            IndexKind::Path => self.path_index.hits(),
            IndexKind::Methods => self.methods_index.hits(),
            IndexKind::Ips => self.ips_index.hits(),
        }
    }

    fn index_name(&self, kind: IndexKind) -> &'static str {
        match kind {
            IndexKind::Path => self.path_index.name(),
            IndexKind::Methods => self.methods_index.name(),
            IndexKind::Ips => self.ips_index.name(),
        }
    }

    #[cfg(test)]
    fn set_optimize(&mut self, optimize: bool) {
        self.optimize = optimize;
    }
}
