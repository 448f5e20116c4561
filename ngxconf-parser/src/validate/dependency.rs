//! Cross-directive checks
//!
//! Each rule is a pure function over the whole tree. Rules never look at
//! each other's findings, so disabling one leaves the others unchanged.

use super::{locate, Validator};
use crate::parser::ast::{Config, NodeRef};
use crate::parser::classifier::unquote;
use crate::parser::context::Context;
use crate::parser::kinds::DirectiveKind;
use ngxconf_core::Error;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// Directives whose first parameter may name an upstream
const PASS_DIRECTIVES: [&str; 6] = [
    "proxy_pass",
    "fastcgi_pass",
    "uwsgi_pass",
    "scgi_pass",
    "grpc_pass",
    "memcached_pass",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyRule {
    /// `proxy_pass backend;` needs an `upstream backend` in the same scope
    UpstreamExists,
    /// `ssl_certificate` and `ssl_certificate_key` come in pairs per block
    SslPair,
    /// An upstream lists at least one server
    NonEmptyUpstream,
    /// No two servers on one port share a `server_name`
    DuplicateServerName,
    /// One `events` block; several `http` blocks are only a warning
    SingleEvents,
}

impl DependencyRule {
    pub const ALL: [DependencyRule; 5] = [
        DependencyRule::UpstreamExists,
        DependencyRule::SslPair,
        DependencyRule::NonEmptyUpstream,
        DependencyRule::DuplicateServerName,
        DependencyRule::SingleEvents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyRule::UpstreamExists => "upstream-exists",
            DependencyRule::SslPair => "ssl-pair",
            DependencyRule::NonEmptyUpstream => "non-empty-upstream",
            DependencyRule::DuplicateServerName => "duplicate-server-name",
            DependencyRule::SingleEvents => "single-events",
        }
    }

    fn check(self, config: &Config) -> Vec<Error> {
        match self {
            DependencyRule::UpstreamExists => upstream_exists(config),
            DependencyRule::SslPair => ssl_pair(config),
            DependencyRule::NonEmptyUpstream => non_empty_upstream(config),
            DependencyRule::DuplicateServerName => duplicate_server_name(config),
            DependencyRule::SingleEvents => single_events(config),
        }
    }
}

impl fmt::Display for DependencyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs a set of [`DependencyRule`]s
#[derive(Debug, Clone)]
pub struct DependencyValidator {
    rules: Vec<DependencyRule>,
}

impl DependencyValidator {
    /// All rules enabled
    pub fn new() -> Self {
        Self {
            rules: DependencyRule::ALL.to_vec(),
        }
    }

    /// Only the given rules
    pub fn only(rules: impl IntoIterator<Item = DependencyRule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    /// Disable one rule
    pub fn without(mut self, rule: DependencyRule) -> Self {
        self.rules.retain(|r| *r != rule);
        self
    }

    pub fn rules(&self) -> &[DependencyRule] {
        &self.rules
    }
}

impl Default for DependencyValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator for DependencyValidator {
    fn name(&self) -> &'static str {
        "dependency"
    }

    fn validate(&self, config: &Config) -> Vec<Error> {
        self.rules.iter().flat_map(|rule| rule.check(config)).collect()
    }
}

// ============================================================
// Scopes
// ============================================================

/// A node with the `http` or `stream` block it belongs to
struct Scoped<'a> {
    node: NodeRef<'a>,
    context: Context,
    /// Index of the enclosing `http`/`stream` block in walk order
    scope: Option<usize>,
}

fn scoped_walk(config: &Config) -> Vec<Scoped<'_>> {
    let mut open: Vec<(usize, usize)> = Vec::new();
    let mut next_scope = 0;
    let mut nodes = Vec::new();
    for visit in config.walk() {
        while open.last().is_some_and(|(depth, _)| *depth >= visit.depth) {
            open.pop();
        }
        nodes.push(Scoped {
            node: visit.node,
            context: visit.context,
            scope: open.last().map(|(_, scope)| *scope),
        });
        if matches!(visit.node.kind(), DirectiveKind::Http | DirectiveKind::Stream) {
            open.push((visit.depth, next_scope));
            next_scope += 1;
        }
    }
    nodes
}

/// The children of a block as nginx sees them: includes replaced by the
/// top-level directives of the files they expanded to
fn effective_children<'a>(node: NodeRef<'a>) -> Vec<NodeRef<'a>> {
    let mut out = Vec::new();
    let mut pending: Vec<NodeRef<'a>> = node.children().collect();
    pending.reverse();
    while let Some(child) = pending.pop() {
        match child.kind() {
            DirectiveKind::Include(include) if include.is_expanded() => {
                for config in include.configs.iter().rev() {
                    let mut top: Vec<NodeRef<'a>> = config.top_level().collect();
                    top.reverse();
                    pending.extend(top);
                }
            }
            _ => out.push(child),
        }
    }
    out
}

// ============================================================
// Rules
// ============================================================

/// Upstream name referenced by a pass target, if it names one
fn upstream_reference(target: &str) -> Option<&str> {
    if target.contains('$') {
        return None;
    }
    let host = match target.split_once("://") {
        Some((_, rest)) => rest.split('/').next().unwrap_or_default(),
        None if target.contains('/') => return None,
        None => target,
    };
    let addressed = host.is_empty()
        || host.contains(['.', ':', '['])
        || host.eq_ignore_ascii_case("localhost");
    (!addressed).then_some(host)
}

fn upstream_exists(config: &Config) -> Vec<Error> {
    let nodes = scoped_walk(config);
    let mut defined: HashMap<Option<usize>, HashSet<&str>> = HashMap::new();
    let mut all: HashSet<&str> = HashSet::new();
    for scoped in &nodes {
        if let Some(upstream) = scoped.node.as_upstream() {
            defined.entry(scoped.scope).or_default().insert(upstream.name());
            all.insert(upstream.name());
        }
    }

    let mut errors = Vec::new();
    for scoped in &nodes {
        let name = scoped.node.name();
        if !PASS_DIRECTIVES.contains(&name) {
            continue;
        }
        let Some(target) = scoped.node.param(0).map(unquote) else {
            continue;
        };
        let Some(upstream) = upstream_reference(&target) else {
            continue;
        };
        let known = match scoped.scope {
            Some(_) => defined
                .get(&scoped.scope)
                .is_some_and(|names| names.contains(upstream)),
            // A snippet outside any http/stream block may use any upstream
            None => all.contains(upstream),
        };
        if !known {
            let error = Error::dependency(format!(
                "'{}' in {} refers to upstream '{}' which is not defined",
                name, scoped.context, upstream
            ));
            errors.push(locate(error, scoped.node));
        }
    }
    errors
}

fn ssl_pair(config: &Config) -> Vec<Error> {
    let mut errors = Vec::new();
    for node in config.descendants().filter(|n| n.block().is_some()) {
        let children = effective_children(node);
        let find = |name: &str| children.iter().find(|c| c.name() == name).copied();
        let cert = find("ssl_certificate");
        let key = find("ssl_certificate_key");
        let (present, missing) = match (cert, key) {
            (Some(cert), None) => (cert, "ssl_certificate_key"),
            (None, Some(key)) => (key, "ssl_certificate"),
            _ => continue,
        };
        let error = Error::dependency(format!(
            "'{}' in {} has no matching '{}'",
            present.name(),
            node.name(),
            missing
        ));
        errors.push(locate(error, present));
    }
    errors
}

fn non_empty_upstream(config: &Config) -> Vec<Error> {
    config
        .upstreams()
        .into_iter()
        .filter(|u| u.servers().is_empty())
        .map(|u| {
            let error = Error::dependency(format!("upstream '{}' has no servers", u.name()));
            locate(error, u.node())
        })
        .collect()
}

fn duplicate_server_name(config: &Config) -> Vec<Error> {
    let mut seen: HashMap<(Option<usize>, u16, String), usize> = HashMap::new();
    let mut errors = Vec::new();
    for scoped in scoped_walk(config) {
        let Some(server) = scoped.node.as_server() else {
            continue;
        };
        // `listen 80; listen [::]:80;` is one port for name collisions
        let ports: BTreeSet<u16> = server.ports().into_iter().collect();
        let names: BTreeSet<String> = server
            .server_names()
            .into_iter()
            .map(|n| unquote(n).to_ascii_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        for name in names {
            for &port in &ports {
                let key = (scoped.scope, port, name.clone());
                match seen.get(&key) {
                    Some(first) => {
                        let error = Error::dependency(format!(
                            "server name '{}' on port {} is already used by the server on line {}",
                            name, port, first
                        ));
                        errors.push(locate(error, scoped.node));
                    }
                    None => {
                        seen.insert(key, scoped.node.line());
                    }
                }
            }
        }
    }
    errors
}

fn single_events(config: &Config) -> Vec<Error> {
    let mut errors = Vec::new();
    let top: Vec<NodeRef<'_>> = config
        .walk()
        .filter(|v| v.context == Context::Main)
        .map(|v| v.node)
        .collect();

    let events: Vec<_> = top.iter().filter(|n| n.name() == "events").collect();
    for extra in events.iter().skip(1) {
        let error = Error::dependency(format!(
            "'events' is declared {} times; only one is allowed",
            events.len()
        ));
        errors.push(locate(error, **extra));
    }

    let http: Vec<_> = top.iter().filter(|n| n.name() == "http").collect();
    for extra in http.iter().skip(1) {
        let error = Error::dependency(format!(
            "'http' is declared {} times; its blocks are merged",
            http.len()
        ))
        .warning();
        errors.push(locate(error, **extra));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parser::Parser;
    use crate::parser::registry::Registry;
    use ngxconf_core::{ErrorKind, Severity};

    fn check(validator: &DependencyValidator, source: &str) -> Vec<Error> {
        let config = Parser::new(&Registry::standard()).parse(source).unwrap();
        validator.validate(&config)
    }

    fn check_all(source: &str) -> Vec<Error> {
        check(&DependencyValidator::new(), source)
    }

    #[test]
    fn test_upstream_reference() {
        assert_eq!(upstream_reference("backend"), Some("backend"));
        assert_eq!(upstream_reference("http://backend/api"), Some("backend"));
        assert_eq!(upstream_reference("grpc://backend"), Some("backend"));
        assert_eq!(upstream_reference("http://example.com"), None);
        assert_eq!(upstream_reference("http://127.0.0.1:8080"), None);
        assert_eq!(upstream_reference("http://localhost"), None);
        assert_eq!(upstream_reference("http://backend:8080"), None);
        assert_eq!(upstream_reference("unix:/run/php.sock"), None);
        assert_eq!(upstream_reference("http://$backend"), None);
        assert_eq!(upstream_reference("10.0.0.1:9000"), None);
    }

    #[test]
    fn test_missing_upstream() {
        let errors = check_all(
            "http { upstream app { server 127.0.0.1:8080; }\n server { location / { proxy_pass http://api; } location /a { proxy_pass http://app; } } }",
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::Dependency);
        assert!(errors[0].message.contains("'api'"));
        assert_eq!(errors[0].line, Some(2));
    }

    #[test]
    fn test_upstream_scopes_are_separate() {
        let errors = check_all(
            "http { upstream db { server 10.0.0.1; } }\nstream { server { listen 5432; proxy_pass db; } }",
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("stream_server"));
    }

    #[test]
    fn test_empty_upstream() {
        let errors = check_all("http { upstream empty { } }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("upstream 'empty' has no servers"));
    }

    #[test]
    fn test_ssl_pair() {
        let errors = check_all("http { server { listen 443 ssl; ssl_certificate /etc/cert.pem; } }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("ssl_certificate_key"));

        let errors = check_all("http { server { ssl_certificate_key /etc/key.pem; } }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("no matching 'ssl_certificate'"));

        assert!(check_all("http { server { ssl_certificate a; ssl_certificate_key b; } }").is_empty());
    }

    #[test]
    fn test_duplicate_server_name() {
        let source = "http {\n server { listen 80; server_name a.com; }\n server { listen 80; server_name A.com; }\n server { listen 8080; server_name a.com; }\n}";
        let errors = check_all(source);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, Some(3));
        assert!(errors[0].message.contains("line 2"));

        // Default port is 80, empty names are ignored
        let errors = check_all(
            "http { server { server_name a.com \"\"; } server { listen 80; server_name a.com \"\"; } }",
        );
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_dual_stack_server_is_not_a_duplicate() {
        let source = "http { server { listen 80; listen [::]:80; server_name example.com www.example.com Example.com; } }";
        assert!(check_all(source).is_empty());

        let source = "http {\n server { listen 80; listen [::]:80; server_name example.com; }\n server { listen [::]:80; server_name example.com; }\n}";
        let errors = check_all(source);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, Some(3));
    }

    #[test]
    fn test_top_level_upstream_snippet() {
        let errors = check_all("upstream empty {}");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("upstream 'empty' has no servers"));

        let source = "upstream app { server 10.0.0.1:80; }\nserver { location / { proxy_pass http://app; } }";
        assert!(check_all(source).is_empty());
        let source = "server { location / { proxy_pass http://nowhere; } }";
        assert_eq!(check_all(source).len(), 1);
    }

    #[test]
    fn test_events_and_http_counts() {
        let errors = check_all("events { }\nevents { }\nhttp { }\nhttp { }");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].severity, Severity::Error);
        assert_eq!(errors[0].line, Some(2));
        assert_eq!(errors[1].severity, Severity::Warning);
        assert_eq!(errors[1].line, Some(4));
    }

    #[test]
    fn test_rules_are_independent() {
        let source =
            "http { server { ssl_certificate /c.pem; location / { proxy_pass http://missing; } } }";
        let all = check_all(source);
        assert_eq!(all.len(), 2);

        let without_ssl = check(&DependencyValidator::new().without(DependencyRule::SslPair), source);
        assert_eq!(without_ssl.len(), 1);
        assert!(without_ssl[0].message.contains("'missing'"));

        let without_upstream = check(
            &DependencyValidator::new().without(DependencyRule::UpstreamExists),
            source,
        );
        assert_eq!(without_upstream.len(), 1);
        assert!(without_upstream[0].message.contains("ssl_certificate_key"));
    }
}
