//! Context validation
//!
//! Checks every directive against a table of the contexts nginx accepts it
//! in. Directives missing from the table are third-party or unknown and are
//! never flagged.

use super::{locate, Validator};
use crate::parser::ast::Config;
use crate::parser::context::Context;
use ngxconf_core::Error;
use std::collections::HashMap;

use Context::{
    Events as E, Http as H, If as I, LimitExcept as LE, Location as L, Main as M, Server as S,
    Stream as ST, StreamServer as SS, StreamUpstream as SU, Upstream as U,
};

const HTTP_ANY: &[Context] = &[H, S, L];
const HTTP_ANY_IF: &[Context] = &[H, S, L, I];
const STREAM_ANY: &[Context] = &[H, S, ST, SS];
const PASS: &[Context] = &[L, I];

/// Directive name to the contexts it may appear in
const RULES: &[(&str, &[Context])] = &[
    // main
    ("user", &[M]),
    ("worker_processes", &[M]),
    ("worker_rlimit_nofile", &[M]),
    ("worker_cpu_affinity", &[M]),
    ("worker_priority", &[M]),
    ("worker_shutdown_timeout", &[M]),
    ("pid", &[M]),
    ("daemon", &[M]),
    ("master_process", &[M]),
    ("load_module", &[M]),
    ("env", &[M]),
    ("pcre_jit", &[M]),
    ("thread_pool", &[M]),
    ("timer_resolution", &[M]),
    ("lock_file", &[M]),
    ("working_directory", &[M]),
    ("events", &[M]),
    ("http", &[M]),
    ("stream", &[M]),
    ("error_log", &[M, H, S, L, ST, SS]),
    // events
    ("worker_connections", &[E]),
    ("use", &[E]),
    ("multi_accept", &[E]),
    ("accept_mutex", &[E]),
    ("accept_mutex_delay", &[E]),
    ("worker_aio_requests", &[E]),
    // structure
    ("server", &[H, ST, U, SU]),
    ("upstream", &[H, ST]),
    ("location", &[S, L]),
    ("if", &[S, L]),
    ("limit_except", &[L]),
    ("map", &[H, ST]),
    ("geo", &[H, ST]),
    ("split_clients", &[H, ST]),
    ("types", HTTP_ANY),
    // server and location
    ("listen", &[S, SS]),
    ("server_name", &[S]),
    ("root", HTTP_ANY_IF),
    ("alias", &[L]),
    ("index", HTTP_ANY),
    ("try_files", &[S, L]),
    ("internal", &[L]),
    ("return", &[S, L, I, SS]),
    ("rewrite", &[S, L, I]),
    ("set", &[S, L, I]),
    ("break", &[S, L, I]),
    ("error_page", HTTP_ANY_IF),
    ("add_header", HTTP_ANY_IF),
    ("expires", HTTP_ANY_IF),
    ("charset", HTTP_ANY_IF),
    ("default_type", HTTP_ANY),
    ("client_max_body_size", HTTP_ANY),
    ("client_body_timeout", HTTP_ANY),
    ("send_timeout", HTTP_ANY),
    ("server_tokens", HTTP_ANY),
    ("sendfile", HTTP_ANY_IF),
    ("tcp_nopush", HTTP_ANY),
    ("tcp_nodelay", &[H, S, L, ST, SS]),
    ("keepalive_timeout", &[H, S, L, U]),
    ("keepalive_requests", &[H, S, L, U]),
    ("gzip", HTTP_ANY_IF),
    ("gzip_types", HTTP_ANY),
    ("server_names_hash_bucket_size", &[H]),
    ("log_format", &[H, ST]),
    ("access_log", &[H, S, L, I, LE, ST, SS]),
    ("allow", &[H, S, L, LE, ST, SS]),
    ("deny", &[H, S, L, LE, ST, SS]),
    ("auth_basic", &[H, S, L, LE]),
    ("auth_basic_user_file", &[H, S, L, LE]),
    ("resolver", &[H, S, L, U, ST, SS]),
    ("resolver_timeout", &[H, S, L, ST, SS]),
    // proxying
    ("proxy_pass", &[L, I, LE, SS]),
    ("fastcgi_pass", PASS),
    ("uwsgi_pass", PASS),
    ("scgi_pass", PASS),
    ("grpc_pass", PASS),
    ("memcached_pass", PASS),
    ("proxy_set_header", HTTP_ANY),
    ("proxy_redirect", HTTP_ANY),
    ("proxy_buffering", HTTP_ANY),
    ("proxy_cache", HTTP_ANY),
    ("proxy_cache_path", &[H]),
    ("proxy_connect_timeout", &[H, S, L, ST, SS]),
    ("proxy_read_timeout", HTTP_ANY),
    ("proxy_timeout", &[ST, SS]),
    ("proxy_protocol", &[ST, SS]),
    // limits
    ("limit_req_zone", &[H]),
    ("limit_req", HTTP_ANY),
    ("limit_conn_zone", &[H, ST]),
    ("limit_conn", &[H, S, L, ST, SS]),
    // ssl
    ("ssl_certificate", STREAM_ANY),
    ("ssl_certificate_key", STREAM_ANY),
    ("ssl_protocols", STREAM_ANY),
    ("ssl_ciphers", STREAM_ANY),
    ("ssl_prefer_server_ciphers", STREAM_ANY),
    ("ssl_session_cache", STREAM_ANY),
    ("ssl_session_timeout", STREAM_ANY),
    // upstream
    ("keepalive", &[U]),
    ("ip_hash", &[U]),
    ("least_conn", &[U, SU]),
    ("hash", &[U, SU]),
    ("random", &[U, SU]),
    ("zone", &[U, SU]),
];

/// Checks that directives sit in contexts that accept them
pub struct ContextValidator {
    rules: HashMap<&'static str, &'static [Context]>,
}

impl ContextValidator {
    pub fn new() -> Self {
        Self {
            rules: RULES.iter().copied().collect(),
        }
    }

    /// Add or replace the permitted contexts of one directive
    pub fn allow(mut self, name: &'static str, contexts: &'static [Context]) -> Self {
        self.rules.insert(name, contexts);
        self
    }

    /// Contexts `name` may appear in, `None` when the directive is unlisted
    pub fn permitted(&self, name: &str) -> Option<&'static [Context]> {
        self.rules.get(name).copied()
    }
}

impl Default for ContextValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(contexts: &[Context]) -> String {
    contexts.iter().map(Context::as_str).collect::<Vec<_>>().join(", ")
}

impl Validator for ContextValidator {
    fn name(&self) -> &'static str {
        "context"
    }

    fn validate(&self, config: &Config) -> Vec<Error> {
        config
            .walk()
            .filter(|visit| !visit.context.is_data() && visit.context != Context::Other)
            .filter_map(|visit| {
                let name = visit.node.name();
                let permitted = self.permitted(name)?;
                if permitted.contains(&visit.context) {
                    return None;
                }
                let error = Error::context(format!(
                    "'{}' is not allowed in {} (allowed in: {})",
                    name,
                    visit.context,
                    describe(permitted)
                ));
                Some(locate(error, visit.node))
            })
            .collect()
    }
}
