//! Include expansion
//!
//! Loads a file, parses it, then replaces nothing: every `include` node keeps
//! its statement and gains the parsed trees of the files it names. Paths are
//! resolved against the directory of the including file. The chain of files
//! being loaded is kept as a stack of canonical paths to catch cycles.

use crate::parser::ast::{Config, NodeId};
use crate::parser::context::Context;
use crate::parser::kinds::DirectiveKind;
use crate::parser::parser::Parser;
use crate::parser::registry::Registry;
use ngxconf_core::{Error, ParseOptions, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Loads files and expands their includes
pub struct IncludeResolver<'r> {
    registry: &'r Registry,
    options: ParseOptions,
    stack: Vec<PathBuf>,
}

impl<'r> IncludeResolver<'r> {
    pub fn new(registry: &'r Registry, options: ParseOptions) -> Self {
        Self {
            registry,
            options,
            stack: Vec::new(),
        }
    }

    /// Parse the file at `path` as a top-level configuration
    pub fn load(&mut self, path: &Path) -> Result<Config> {
        self.load_in(path, Context::Main)
    }

    fn load_in(&mut self, path: &Path, context: Context) -> Result<Config> {
        let canonical = fs::canonicalize(path).map_err(|e| {
            Error::file(format!("cannot read '{}': {}", path.display(), e)).with_file(path)
        })?;

        if let Some(start) = self.stack.iter().position(|p| *p == canonical) {
            let chain: Vec<String> = self.stack[start..]
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|p| p.display().to_string())
                .collect();
            return Err(Error::file(format!(
                "include cycle detected: {}",
                chain.join(" -> ")
            ))
            .with_file(path));
        }
        if self.stack.len() > self.options.max_include_depth {
            return Err(Error::file(format!(
                "includes nested deeper than {} levels",
                self.options.max_include_depth
            ))
            .with_file(path));
        }

        let source = fs::read_to_string(path).map_err(|e| {
            Error::file(format!("cannot read '{}': {}", path.display(), e)).with_file(path)
        })?;
        let mut config = Parser::new(self.registry)
            .with_context(context)
            .parse(&source)
            .map_err(|e| e.with_file(path))?;
        config.set_path(path);

        if self.options.expand_includes {
            self.stack.push(canonical);
            let expanded = self.expand(&mut config);
            self.stack.pop();
            expanded?;
        }
        Ok(config)
    }

    /// Expand every `include` of an already parsed tree
    pub fn expand(&mut self, config: &mut Config) -> Result<()> {
        let base = config
            .path()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let file = config.path().map(Path::to_path_buf);

        let sites: Vec<(NodeId, Context, String, usize)> = config
            .walk()
            .filter_map(|visit| match visit.node.kind() {
                DirectiveKind::Include(include) => Some((
                    visit.node.id(),
                    visit.context,
                    include.pattern.clone(),
                    visit.node.line(),
                )),
                _ => None,
            })
            .collect();

        for (id, context, pattern, line) in sites {
            let attach = |e: Error| match &file {
                Some(f) => e.with_file(f),
                None => e,
            };
            let targets = resolve(&base, &pattern)
                .map_err(|e| attach(e.at_line(line)))?;

            let mut configs = Vec::with_capacity(targets.len());
            for target in targets {
                let included = self.load_in(&target, context).map_err(|e| attach(e))?;
                configs.push(included);
            }
            tracing::debug!("include '{}' expanded to {} file(s)", pattern, configs.len());

            if let Some(directive) = config.directive_mut(id) {
                if let DirectiveKind::Include(include) = directive.kind_mut() {
                    include.configs = configs;
                }
            }
        }
        Ok(())
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Files named by an include pattern, in sorted order
fn resolve(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let joined = if Path::new(pattern).is_absolute() {
        PathBuf::from(pattern)
    } else {
        base.join(pattern)
    };

    if !is_glob(pattern) {
        if !joined.exists() {
            return Err(Error::file(format!(
                "include target '{}' not found",
                joined.display()
            )));
        }
        return Ok(vec![joined]);
    }

    let text = joined.to_string_lossy();
    let entries = glob::glob(&text)
        .map_err(|e| Error::file(format!("invalid include pattern '{}': {}", pattern, e)))?;
    let mut matches = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::file(format!("cannot read include match: {}", e)))?;
        if path.is_file() {
            matches.push(path);
        }
    }
    matches.sort();
    if matches.is_empty() {
        tracing::warn!("include pattern '{}' matched no files", text);
    }
    Ok(matches)
}
