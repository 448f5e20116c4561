//! Specialization registry
//!
//! Maps a directive name, optionally paired with the context it sits in, to
//! the constructor that upgrades the generic directive into a typed kind.
//! A registry is assembled once through [`RegistryBuilder`] and is read-only
//! afterwards; the parser borrows it for the whole parse.

use crate::parser::ast::Directive;
use crate::parser::context::Context;
use crate::parser::kinds::{self, DirectiveKind};
use crate::parser::lexer::is_raw_block_directive;
use ngxconf_core::{Error, Result};
use std::collections::HashMap;

/// Upgrades a generic directive into its typed kind
pub type Specializer = fn(&Directive) -> Result<DirectiveKind>;

/// Required shape of a directive before its specializer runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Block,
    Leaf,
    Any,
}

#[derive(Clone, Copy)]
struct Entry {
    shape: Shape,
    specialize: Specializer,
}

/// Block names that exist in nginx but carry no specialization
pub const KNOWN_BLOCKS: &[&str] = &[
    "events",
    "types",
    "mail",
    "if",
    "limit_except",
    "charset_map",
    "match",
    "upstream",
    "server",
    "location",
];

/// Immutable table of specializers
pub struct Registry {
    entries: HashMap<(String, Option<Context>), Entry>,
    context_defaults: HashMap<Context, Specializer>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// A registry that specializes nothing; every directive stays generic
    pub fn empty() -> Self {
        RegistryBuilder::new().build()
    }

    /// Specializers for every typed kind this crate models
    pub fn standard() -> Self {
        use Context::*;
        let mut builder = RegistryBuilder::new()
            .register("http", None, Shape::Block, kinds::http)
            .register("stream", None, Shape::Block, kinds::stream)
            .register("server", Some(Http), Shape::Block, kinds::server)
            // conf.d and sites-enabled snippets hold bare server blocks
            .register("server", Some(Main), Shape::Block, kinds::server)
            .register("server", Some(Stream), Shape::Block, kinds::stream_server)
            .register("server", Some(Upstream), Shape::Leaf, kinds::upstream_server)
            .register(
                "server",
                Some(StreamUpstream),
                Shape::Leaf,
                kinds::stream_upstream_server,
            )
            .register("upstream", None, Shape::Block, kinds::upstream)
            .register("upstream", Some(Stream), Shape::Block, kinds::stream_upstream)
            .register("location", None, Shape::Block, kinds::location)
            .register("map", None, Shape::Block, kinds::map)
            .register("geo", None, Shape::Block, kinds::geo)
            .register("split_clients", None, Shape::Block, kinds::split_clients)
            .register("include", None, Shape::Leaf, kinds::include)
            .register("limit_req_zone", None, Shape::Leaf, kinds::limit_req_zone)
            .register("limit_conn_zone", None, Shape::Leaf, kinds::limit_conn_zone)
            .register("proxy_cache_path", None, Shape::Leaf, kinds::proxy_cache_path)
            .context_default(Map, kinds::map_entry)
            .context_default(Geo, kinds::geo_entry)
            .context_default(SplitClients, kinds::split_clients_entry);
        // Data blocks may pull their entries from other files
        for data in [Map, Geo, SplitClients] {
            builder = builder.register("include", Some(data), Shape::Leaf, kinds::include);
        }
        builder.build()
    }

    /// Number of registered name entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.context_defaults.is_empty()
    }

    fn lookup(&self, name: &str, context: Context) -> Option<Entry> {
        if let Some(entry) = self.entries.get(&(name.to_string(), Some(context))) {
            return Some(*entry);
        }
        if let Some(&specialize) = self.context_defaults.get(&context) {
            return Some(Entry {
                shape: Shape::Any,
                specialize,
            });
        }
        self.entries.get(&(name.to_string(), None)).copied()
    }

    /// Whether `name` has a specializer in `context`
    pub fn is_registered(&self, name: &str, context: Context) -> bool {
        self.entries.contains_key(&(name.to_string(), Some(context)))
            || self.entries.contains_key(&(name.to_string(), None))
    }

    /// Upgrade a directive sitting in `context`. Names without an entry stay
    /// generic; a recognized name with malformed input is an error.
    pub fn specialize(&self, directive: &Directive, context: Context) -> Result<DirectiveKind> {
        if is_raw_block_directive(directive.name()) {
            return kinds::lua_block(directive);
        }
        let Some(entry) = self.lookup(directive.name(), context) else {
            return Ok(DirectiveKind::Generic);
        };
        match (entry.shape, directive.is_block()) {
            (Shape::Block, false) => {
                return Err(Error::validation(format!(
                    "'{}' in {} requires a {{ ... }} block",
                    directive.name(),
                    context
                ))
                .at_line(directive.line));
            }
            (Shape::Leaf, true) => {
                return Err(Error::validation(format!(
                    "'{}' in {} cannot have a block",
                    directive.name(),
                    context
                ))
                .at_line(directive.line));
            }
            _ => {}
        }
        let kind = (entry.specialize)(directive)?;
        tracing::trace!(
            "specialized '{}' in {} as {}",
            directive.name(),
            context,
            kind.label()
        );
        Ok(kind)
    }

    /// Registered block names, sorted
    pub fn block_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, e)| e.shape == Shape::Block)
            .map(|((name, _), _)| name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Closest registered block name for a block directive nobody knows,
    /// if one is within two edits
    pub fn suggest(&self, name: &str) -> Option<&str> {
        if name.len() < 4 || KNOWN_BLOCKS.contains(&name) || self.block_names().contains(&name) {
            return None;
        }
        self.block_names()
            .into_iter()
            .map(|candidate| (strsim::levenshtein(name, candidate), candidate))
            .filter(|(distance, _)| *distance <= 2)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, candidate)| candidate)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Collects registry entries before freezing them into a [`Registry`]
#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<(String, Option<Context>), Entry>,
    context_defaults: HashMap<Context, Specializer>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a specializer for `name`, in one context or (with `None`)
    /// in every context without a more specific entry
    pub fn register(
        mut self,
        name: &str,
        context: Option<Context>,
        shape: Shape,
        specialize: Specializer,
    ) -> Self {
        self.entries
            .insert((name.to_string(), context), Entry { shape, specialize });
        self
    }

    /// Specializer for every directive inside `context` that has no exact
    /// entry, used for data blocks whose children are free-form entries
    pub fn context_default(mut self, context: Context, specialize: Specializer) -> Self {
        self.context_defaults.insert(context, specialize);
        self
    }

    pub fn build(self) -> Registry {
        tracing::debug!(
            "built registry with {} entries and {} context defaults",
            self.entries.len(),
            self.context_defaults.len()
        );
        Registry {
            entries: self.entries,
            context_defaults: self.context_defaults,
        }
    }
}
