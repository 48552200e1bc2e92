use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("invalid policy type: {0}")]
    #[diagnostic(
        code(gateward::authz::invalid_policy),
        help("valid policies are ALLOW and DENY")
    )]
    InvalidPolicy(String),

    #[error("error compiling path regex /{pattern}/: {source}")]
    #[diagnostic(code(gateward::authz::invalid_path_regex))]
    InvalidPathRegex {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("could not parse trusted IP network(s): {0}")]
    #[diagnostic(
        code(gateward::authz::invalid_trusted_ips),
        help("entries must be bare IPs or CIDR ranges, IPv4 or IPv6")
    )]
    InvalidTrustedIps(String),

    #[error("invalid authorization rule(s): {}", .0.join("; "))]
    #[diagnostic(
        code(gateward::authz::invalid_rules),
        help("every rejected rule is listed; fix them all and reload")
    )]
    InvalidRules(Vec<String>),
}
