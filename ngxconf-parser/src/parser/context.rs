//! Context labels
//!
//! A context names the kind of block a directive sits in. The parser and
//! both validators derive child contexts with the same rules, so a `server`
//! under `stream` is a stream server everywhere.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Context {
    Main,
    Events,
    Http,
    Server,
    Location,
    Upstream,
    Map,
    Geo,
    SplitClients,
    Stream,
    StreamServer,
    StreamUpstream,
    If,
    LimitExcept,
    /// A block the grammar does not model, such as `types` or `mail`
    Other,
}

impl Context {
    pub const ALL: [Context; 15] = [
        Context::Main,
        Context::Events,
        Context::Http,
        Context::Server,
        Context::Location,
        Context::Upstream,
        Context::Map,
        Context::Geo,
        Context::SplitClients,
        Context::Stream,
        Context::StreamServer,
        Context::StreamUpstream,
        Context::If,
        Context::LimitExcept,
        Context::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Context::Main => "main",
            Context::Events => "events",
            Context::Http => "http",
            Context::Server => "server",
            Context::Location => "location",
            Context::Upstream => "upstream",
            Context::Map => "map",
            Context::Geo => "geo",
            Context::SplitClients => "split_clients",
            Context::Stream => "stream",
            Context::StreamServer => "stream_server",
            Context::StreamUpstream => "stream_upstream",
            Context::If => "if",
            Context::LimitExcept => "limit_except",
            Context::Other => "other",
        }
    }

    pub fn from_label(label: &str) -> Option<Context> {
        Context::ALL.iter().copied().find(|c| c.as_str() == label)
    }

    /// Context of the block opened by a directive named `name` inside `self`
    pub fn child(self, name: &str) -> Context {
        match (self, name) {
            (_, "events") => Context::Events,
            (_, "http") => Context::Http,
            (_, "stream") => Context::Stream,
            (Context::Stream, "server") => Context::StreamServer,
            (_, "server") => Context::Server,
            (Context::Stream, "upstream") => Context::StreamUpstream,
            (_, "upstream") => Context::Upstream,
            (_, "location") => Context::Location,
            (_, "map") => Context::Map,
            (_, "geo") => Context::Geo,
            (_, "split_clients") => Context::SplitClients,
            (_, "if") => Context::If,
            (_, "limit_except") => Context::LimitExcept,
            _ => Context::Other,
        }
    }

    /// Blocks whose children are data entries rather than directives
    pub fn is_data(self) -> bool {
        matches!(self, Context::Map | Context::Geo | Context::SplitClients)
    }

    /// Inside `upstream` or a stream upstream, `server` is a leaf entry
    pub fn is_upstream(self) -> bool {
        matches!(self, Context::Upstream | Context::StreamUpstream)
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
