use std::sync::Arc;

use crate::authz::engine::RulesEngine;
use crate::authz::errors::AuthzError;
use crate::authz::rule::{Policy, Rule};
use crate::ip::RealClientIpParser;
use crate::settings::AuthorizationSettings;

/// Build a `RulesEngine` from operator settings.
///
/// Every rejected entry is collected and reported together, so a reload
/// surfaces the whole set of problems at once instead of one per attempt.
pub fn build_rules_engine(
    settings: &AuthorizationSettings,
    parser: Option<Arc<dyn RealClientIpParser>>,
) -> Result<RulesEngine, AuthzError> {
    let mut engine = RulesEngine::new(parser.clone());
    let mut problems = Vec::new();

    add_route_rules(settings, &mut engine, &mut problems);
    add_regex_rules(settings, &mut engine, &mut problems);
    add_preflight_rule(settings, &mut engine, &mut problems);
    add_trusted_ip_rule(settings, parser.is_some(), &mut engine, &mut problems);

    if !problems.is_empty() {
        return Err(AuthzError::InvalidRules(problems));
    }

    tracing::info!(rules = engine.rules().len(), "authorization rules loaded");
    Ok(engine)
}

/// Routes are `regex` (all methods) or `METHOD=regex`. Only the first `=`
/// splits; the regex itself may contain more.
fn add_route_rules(
    settings: &AuthorizationSettings,
    engine: &mut RulesEngine,
    problems: &mut Vec<String>,
) {
    for (i, route) in settings.skip_auth_routes.iter().enumerate() {
        let id = format!("route-{i}");
        let result = match route.split_once('=') {
            None => Rule::new(&id, Policy::Allow, Some(route.as_str()), None, None),
            Some((method, regex)) => {
                Rule::new(&id, Policy::Allow, Some(regex), Some(&[method]), None)
            }
        };
        match result {
            Ok(rule) => {
                let methods = rule
                    .methods()
                    .map(|m| {
                        let mut sorted: Vec<&str> = m.iter().map(String::as_str).collect();
                        sorted.sort_unstable();
                        sorted.join(",")
                    })
                    .unwrap_or_else(|| "ALL".to_string());
                tracing::info!(
                    methods = %methods,
                    path = route_path(route),
                    "skipping auth for allowlisted route"
                );
                engine.add_rule(rule);
            }
            Err(err) => problems.push(err.to_string()),
        }
    }
}

fn route_path(route: &str) -> &str {
    match route.split_once('=') {
        Some((_, regex)) => regex,
        None => route,
    }
}

fn add_regex_rules(
    settings: &AuthorizationSettings,
    engine: &mut RulesEngine,
    problems: &mut Vec<String>,
) {
    for (i, regex) in settings.skip_auth_regex.iter().enumerate() {
        match Rule::new(format!("regex-{i}"), Policy::Allow, Some(regex.as_str()), None, None) {
            Ok(rule) => {
                tracing::info!(path = %regex, "skipping auth for allowlisted path regex");
                engine.add_rule(rule);
            }
            Err(err) => problems.push(err.to_string()),
        }
    }
}

/// The preflight toggle trusts OPTIONS requests to any path.
fn add_preflight_rule(
    settings: &AuthorizationSettings,
    engine: &mut RulesEngine,
    problems: &mut Vec<String>,
) {
    if !settings.skip_auth_preflight {
        return;
    }
    match Rule::new("preflight", Policy::Allow, None, Some(&["OPTIONS"]), None) {
        Ok(rule) => {
            tracing::info!("skipping auth for OPTIONS preflight requests");
            engine.add_rule(rule);
        }
        Err(err) => problems.push(err.to_string()),
    }
}

/// All trusted networks fold into a single rule. With no entries no rule
/// is added at all: a trusted-IP rule without networks would have no
/// predicates left and allow everything.
fn add_trusted_ip_rule(
    settings: &AuthorizationSettings,
    has_parser: bool,
    engine: &mut RulesEngine,
    problems: &mut Vec<String>,
) {
    if settings.trusted_ips.is_empty() {
        return;
    }
    if has_parser {
        tracing::warn!(
            "mixing trusted IPs with forwarded-header client IP parsing is a potential \
             security vulnerability: an attacker can inject a trusted IP into the forwarded \
             header unless it is stripped upstream"
        );
    }

    let entries: Vec<&str> = settings.trusted_ips.iter().map(String::as_str).collect();
    match Rule::new("trustedIP", Policy::Allow, None, None, Some(&entries)) {
        Ok(rule) => {
            for trusted in &settings.trusted_ips {
                tracing::info!(cidr = %trusted, "skipping auth for trusted IP/CIDR range");
            }
            engine.add_rule(rule);
        }
        Err(err) => problems.push(err.to_string()),
    }
}
