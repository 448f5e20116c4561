//! Parser module for nginx configuration
//!
//! This module provides the lexer, the AST, the specialization registry and
//! the parser itself.

pub mod ast;
pub mod classifier;
pub mod context;
pub mod include;
pub mod kinds;
pub mod lexer;
pub mod parser;
pub mod query;
pub mod registry;
pub mod typed;

pub use ast::{Block, Config, Directive, NodeId, NodeRef, Parameter, Visit, Walk};
pub use classifier::{classify, ParameterType};
pub use context::Context;
pub use include::IncludeResolver;
pub use kinds::DirectiveKind;
pub use lexer::{tokenize, LexError, Token, TokenKind};
pub use parser::Parser;
pub use registry::{Registry, RegistryBuilder, Shape, Specializer};
pub use typed::{
    GeoMut, GeoView, LimitReqZoneMut, LocationView, MapMut, MapView, ServerMut, ServerView,
    SplitClientsMut, SplitClientsView, UpstreamMut, UpstreamView,
};
