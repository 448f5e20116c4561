//! Validation passes over a parsed tree
//!
//! Validators only read the tree. Each one walks the whole tree, including
//! expanded includes, and returns every finding rather than stopping at the
//! first.

mod context;
mod dependency;

pub use context::ContextValidator;
pub use dependency::{DependencyRule, DependencyValidator};

use crate::parser::ast::{Config, NodeRef};
use ngxconf_core::{Error, Errors};

/// A read-only pass that reports findings
pub trait Validator: Send + Sync {
    /// Validator name for logs
    fn name(&self) -> &'static str;

    /// Every finding in the tree, in document order where that is meaningful
    fn validate(&self, config: &Config) -> Vec<Error>;
}

/// Run the context and dependency validators and gather their findings
pub fn validate(config: &Config) -> Errors {
    let context = ContextValidator::new();
    let dependency = DependencyValidator::new();
    run(config, &[&context, &dependency])
}

/// Run `validators` in order and gather their findings
pub fn run(config: &Config, validators: &[&dyn Validator]) -> Errors {
    let mut errors = Errors::new();
    for validator in validators {
        let found = validator.validate(config);
        tracing::debug!("{} validator reported {} finding(s)", validator.name(), found.len());
        errors.extend(found);
    }
    errors
}

/// Point a finding at the node's line and at the file the node came from
pub(crate) fn locate(error: Error, node: NodeRef<'_>) -> Error {
    let error = error.at_line(node.line());
    match node.config().path() {
        Some(path) => error.with_file(path),
        None => error,
    }
}
