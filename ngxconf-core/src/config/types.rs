//! Settings type definitions
//!
//! These types control how configuration text is parsed and regenerated.

use serde::{Deserialize, Serialize};

/// Root settings for ngxconf
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Output style used when serializing a tree
    #[serde(default)]
    pub style: Style,

    /// Options for the parser
    #[serde(default)]
    pub parse: ParseOptions,
}

/// Serializer style
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Style {
    /// Spaces per nesting level
    pub indent_width: usize,

    /// Spaces before every top-level line
    pub starting_indent: usize,

    /// Emit the directives of each block in alphabetical order.
    /// Display only: the tree is never reordered.
    pub sort_siblings: bool,

    /// Emit `name params {` instead of `name params{`
    pub space_before_block_brace: bool,

    /// Emit expanded include trees in place of their `include` statement
    pub inline_includes: bool,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            indent_width: 4,
            starting_indent: 0,
            sort_siblings: false,
            space_before_block_brace: true,
            inline_includes: false,
        }
    }
}

impl Style {
    /// Compact style: two-space indent, no space before braces
    pub fn compact() -> Self {
        Self {
            indent_width: 2,
            space_before_block_brace: false,
            ..Self::default()
        }
    }

    pub fn with_indent(mut self, indent_width: usize) -> Self {
        self.indent_width = indent_width;
        self
    }

    pub fn sorted(mut self) -> Self {
        self.sort_siblings = true;
        self
    }
}

/// Parser options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ParseOptions {
    /// Parse the files referenced by `include` and attach their trees
    pub expand_includes: bool,

    /// Deepest include nesting accepted before giving up
    pub max_include_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            expand_includes: false,
            max_include_depth: default_max_include_depth(),
        }
    }
}

fn default_max_include_depth() -> usize {
    32
}

impl ParseOptions {
    /// Options with include expansion enabled
    pub fn expanding() -> Self {
        Self {
            expand_includes: true,
            ..Self::default()
        }
    }
}
