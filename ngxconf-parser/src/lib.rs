//! nginx configuration parser
//!
//! This crate parses nginx configuration into a mutable, queryable tree,
//! validates it and writes it back out.
//!
//! # Example
//!
//! ```rust
//! use ngxconf_parser::{parse, serialize, validate, Style};
//!
//! let source = r#"
//!     events { worker_connections 1024; }
//!     http {
//!         server {
//!             listen 80;
//!             server_name example.com;
//!         }
//!     }
//! "#;
//!
//! let config = parse(source).unwrap();
//! assert!(validate(&config).is_empty());
//! assert_eq!(config.find_servers_by_name("example.com").len(), 1);
//!
//! let text = serialize(&config, &Style::default());
//! assert!(parse(&text).unwrap().same_structure(&config));
//! ```

pub mod dumper;
pub mod parser;
pub mod validate;

pub use dumper::{serialize, write_file, write_tree, Dumper};
pub use parser::{
    Block, Config, Context, Directive, DirectiveKind, IncludeResolver, NodeId, NodeRef, Parameter,
    ParameterType, Parser, Registry, Visit,
};
pub use validate::{
    validate, ContextValidator, DependencyRule, DependencyValidator, Validator,
};

pub use ngxconf_core::{Error, ErrorKind, Errors, ParseOptions, Result, Severity, Style};

use std::path::Path;
use std::sync::LazyLock;

static STANDARD: LazyLock<Registry> = LazyLock::new(Registry::standard);

/// The registry [`parse`] and [`parse_file`] use
pub fn standard_registry() -> &'static Registry {
    &STANDARD
}

/// Parse configuration text. Includes are left unexpanded.
pub fn parse(source: &str) -> Result<Config> {
    Parser::new(standard_registry()).parse(source)
}

/// Parse a file, expanding includes when `options` asks for it
pub fn parse_file(path: impl AsRef<Path>, options: &ParseOptions) -> Result<Config> {
    parse_file_with(path, options, standard_registry())
}

/// [`parse_file`] with a custom registry
pub fn parse_file_with(
    path: impl AsRef<Path>,
    options: &ParseOptions,
    registry: &Registry,
) -> Result<Config> {
    let path = path.as_ref();
    tracing::debug!("parsing {}", path.display());
    IncludeResolver::new(registry, options.clone()).load(path)
}
