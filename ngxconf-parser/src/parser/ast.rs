//! Abstract Syntax Tree for nginx configuration
//!
//! Nodes live in a flat arena owned by [`Config`]. A [`Block`] lists the ids
//! of its directives in order, and each node records the id of its enclosing
//! directive, so parent links never own anything. Removing a node detaches
//! it and its whole subtree; stale ids then resolve to `None`.

use crate::parser::classifier::{classify, unquote, ParameterType};
use crate::parser::context::Context;
use crate::parser::kinds::DirectiveKind;
use ngxconf_core::{Error, Result};
use smartstring::alias::String as CompactString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Identifier of a directive inside its [`Config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================
// Parameters
// ============================================================

/// A directive parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    value: String,
    kind: ParameterType,
    line_offset: usize,
}

impl Parameter {
    /// Create a parameter from its literal text (quotes included, if any)
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let kind = classify(&value);
        Self {
            value,
            kind,
            line_offset: 0,
        }
    }

    /// Lines between the owning directive's name and this parameter
    pub fn with_line_offset(mut self, line_offset: usize) -> Self {
        self.line_offset = line_offset;
        self
    }

    /// Literal text as written
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> ParameterType {
        self.kind
    }

    pub fn line_offset(&self) -> usize {
        self.line_offset
    }

    /// Value without surrounding quotes
    pub fn unquoted(&self) -> String {
        unquote(&self.value)
    }

    pub fn is_quoted(&self) -> bool {
        self.kind == ParameterType::Quoted
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl From<&str> for Parameter {
    fn from(value: &str) -> Self {
        Parameter::new(value)
    }
}

impl From<String> for Parameter {
    fn from(value: String) -> Self {
        Parameter::new(value)
    }
}

// ============================================================
// Blocks and directives
// ============================================================

/// Ordered directives between `{` and `}`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    children: Vec<NodeId>,
    raw: Option<String>,
    /// Comments after the last directive of the block
    pub trailing_comments: Vec<String>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    /// A block whose body is foreign code kept verbatim
    pub fn raw(body: impl Into<String>) -> Self {
        Self {
            children: Vec::new(),
            raw: Some(body.into()),
            trailing_comments: Vec::new(),
        }
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn raw_body(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    pub fn is_raw(&self) -> bool {
        self.raw.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.raw.is_none()
    }
}

/// One statement: a leaf ending in `;` or a block directive
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    name: CompactString,
    pub parameters: Vec<Parameter>,
    block: Option<Block>,
    /// Comment lines directly above the directive
    pub comments: Vec<String>,
    /// Comment on the same line as the end of the directive
    pub inline_comment: Option<String>,
    /// Source line of the directive name, 0 when built in code
    pub line: usize,
    kind: DirectiveKind,
}

impl Directive {
    /// A leaf directive without parameters
    pub fn new(name: &str) -> Self {
        Self {
            name: CompactString::from(name),
            parameters: Vec::new(),
            block: None,
            comments: Vec::new(),
            inline_comment: None,
            line: 0,
            kind: DirectiveKind::Generic,
        }
    }

    /// A leaf directive: `name params;`
    pub fn leaf<I, P>(name: &str, params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Parameter>,
    {
        Self::new(name).with_params(params)
    }

    /// A block directive with an empty block: `name params { }`
    pub fn new_block<I, P>(name: &str, params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Parameter>,
    {
        Self::new(name).with_params(params).with_block(Block::new())
    }

    pub fn with_params<I, P>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Parameter>,
    {
        self.parameters.extend(params.into_iter().map(Into::into));
        self
    }

    pub fn with_block(mut self, block: Block) -> Self {
        self.block = Some(block);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comments.push(comment.into());
        self
    }

    pub fn with_inline_comment(mut self, comment: impl Into<String>) -> Self {
        self.inline_comment = Some(comment.into());
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub(crate) fn with_kind(mut self, kind: DirectiveKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = CompactString::from(name);
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.as_str() == name
    }

    pub fn kind(&self) -> &DirectiveKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut DirectiveKind {
        &mut self.kind
    }

    pub(crate) fn set_kind(&mut self, kind: DirectiveKind) {
        self.kind = kind;
    }

    pub fn block(&self) -> Option<&Block> {
        self.block.as_ref()
    }

    pub(crate) fn block_mut(&mut self) -> Option<&mut Block> {
        self.block.as_mut()
    }

    pub fn is_block(&self) -> bool {
        self.block.is_some()
    }

    pub fn is_leaf(&self) -> bool {
        self.block.is_none()
    }

    /// Literal text of the parameter at `index`
    pub fn param(&self, index: usize) -> Option<&str> {
        self.parameters.get(index).map(|p| p.value())
    }

    pub fn first_param(&self) -> Option<&str> {
        self.param(0)
    }

    pub fn param_values(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.value()).collect()
    }
}

// ============================================================
// Config arena
// ============================================================

#[derive(Debug, Clone, PartialEq)]
struct Node {
    directive: Directive,
    parent: Option<NodeId>,
    live: bool,
}

/// Root of a parsed file: its top-level block plus the originating path
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    path: Option<PathBuf>,
    context: Context,
    nodes: Vec<Node>,
    root: Block,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            path: None,
            context: Context::Main,
            nodes: Vec::new(),
            root: Block::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Context the top-level directives sit in; `main` unless this tree was
    /// included from inside a block
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    pub fn context(&self) -> Context {
        self.context
    }

    pub fn root(&self) -> &Block {
        &self.root
    }

    /// Number of live directives in this file, includes not counted
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.live).count()
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    fn is_live(&self, id: NodeId) -> bool {
        self.nodes.get(id.0).is_some_and(|n| n.live)
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.is_live(id).then_some(NodeRef { config: self, id })
    }

    pub fn directive(&self, id: NodeId) -> Option<&Directive> {
        self.nodes.get(id.0).filter(|n| n.live).map(|n| &n.directive)
    }

    pub fn directive_mut(&mut self, id: NodeId) -> Option<&mut Directive> {
        self.nodes
            .get_mut(id.0)
            .filter(|n| n.live)
            .map(|n| &mut n.directive)
    }

    /// Enclosing directive, `None` for top-level nodes and stale ids
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).filter(|n| n.live).and_then(|n| n.parent)
    }

    /// Block of `parent`, or the root block when `parent` is `None`
    pub fn block_of(&self, parent: Option<NodeId>) -> Option<&Block> {
        match parent {
            None => Some(&self.root),
            Some(id) => self.directive(id).and_then(|d| d.block()),
        }
    }

    fn block_of_mut(&mut self, parent: Option<NodeId>) -> Result<&mut Block> {
        match parent {
            None => Ok(&mut self.root),
            Some(id) => {
                let directive = self
                    .directive_mut(id)
                    .ok_or_else(|| Error::validation(format!("node {} no longer exists", id)))?;
                let line = directive.line;
                let name = directive.name().to_string();
                match directive.block_mut() {
                    Some(block) if !block.is_raw() => Ok(block),
                    Some(_) => Err(Error::validation(format!(
                        "'{}' has a raw block and cannot hold directives",
                        name
                    ))
                    .at_line(line)),
                    None => Err(Error::validation(format!(
                        "'{}' is not a block directive",
                        name
                    ))
                    .at_line(line)),
                }
            }
        }
    }

    /// Comments after the last directive of a block (or of the file)
    pub fn trailing_comments_mut(&mut self, parent: Option<NodeId>) -> Result<&mut Vec<String>> {
        self.block_of_mut(parent).map(|b| &mut b.trailing_comments)
    }

    /// Child ids of `parent`, or of the root when `parent` is `None`
    pub fn children(&self, parent: Option<NodeId>) -> &[NodeId] {
        self.block_of(parent).map(|b| b.children()).unwrap_or(&[])
    }

    /// Top-level directives in order
    pub fn top_level(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.root.children.iter().map(move |&id| NodeRef { config: self, id })
    }

    /// Append a directive as the last child of `parent` (root when `None`)
    pub fn append(&mut self, parent: Option<NodeId>, directive: Directive) -> Result<NodeId> {
        let index = self.children(parent).len();
        self.insert(parent, index, directive)
    }

    /// Insert a directive at `index` among the children of `parent`
    pub fn insert(
        &mut self,
        parent: Option<NodeId>,
        index: usize,
        directive: Directive,
    ) -> Result<NodeId> {
        if directive.block().is_some_and(|b| !b.children.is_empty()) {
            return Err(Error::validation(format!(
                "'{}' already owns directives; attach it with an empty block",
                directive.name()
            )));
        }
        let id = NodeId(self.nodes.len());
        let block = self.block_of_mut(parent)?;
        let index = index.min(block.children.len());
        block.children.insert(index, id);
        self.nodes.push(Node {
            directive,
            parent,
            live: true,
        });
        Ok(id)
    }

    /// Detach a directive and its subtree. Returns false for stale ids.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if !self.is_live(id) {
            return false;
        }
        let parent = self.nodes[id.0].parent;
        if let Ok(block) = self.block_of_mut(parent) {
            block.children.retain(|&c| c != id);
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current.0];
            node.live = false;
            if let Some(block) = node.directive.block() {
                stack.extend(block.children.iter().copied());
            }
        }
        true
    }

    /// Context a node sits in, derived from its ancestors
    pub fn context_of(&self, id: NodeId) -> Option<Context> {
        if !self.is_live(id) {
            return None;
        }
        let mut chain = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            chain.push(p);
            current = self.parent(p);
        }
        let mut context = self.context;
        for ancestor in chain.iter().rev() {
            context = context.child(self.nodes[ancestor.0].directive.name());
        }
        Some(context)
    }

    /// Depth-first, pre-order walk over every directive, descending into
    /// blocks and into expanded include trees
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![Frame {
                config: self,
                iter: self.root.children.iter(),
                context: self.context,
                depth: 0,
            }],
        }
    }

    /// Every directive in the tree in document order
    pub fn descendants(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.walk().map(|v| v.node)
    }

    /// All directives named `name`, at any depth
    pub fn find_directives(&self, name: &str) -> Vec<NodeRef<'_>> {
        self.descendants().filter(|n| n.name() == name).collect()
    }

    /// Compare names, parameters, comments, raw bodies and nesting,
    /// ignoring lines and node ids
    pub fn same_structure(&self, other: &Config) -> bool {
        blocks_match(self, &self.root, other, &other.root)
    }
}

fn blocks_match(a: &Config, block_a: &Block, b: &Config, block_b: &Block) -> bool {
    if block_a.children.len() != block_b.children.len()
        || block_a.raw != block_b.raw
        || block_a.trailing_comments != block_b.trailing_comments
    {
        return false;
    }
    block_a.children.iter().zip(&block_b.children).all(|(&ia, &ib)| {
        let da = &a.nodes[ia.0].directive;
        let db = &b.nodes[ib.0].directive;
        da.name == db.name
            && da.param_values() == db.param_values()
            && da.comments == db.comments
            && da.inline_comment == db.inline_comment
            && match (da.block(), db.block()) {
                (Some(x), Some(y)) => blocks_match(a, x, b, y),
                (None, None) => true,
                _ => false,
            }
    })
}

// ============================================================
// Traversal
// ============================================================

/// A borrowed handle to one directive of a [`Config`]
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    config: &'a Config,
    id: NodeId,
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("line", &self.directive().line)
            .finish()
    }
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The file this node belongs to
    pub fn config(&self) -> &'a Config {
        self.config
    }

    pub fn directive(&self) -> &'a Directive {
        &self.config.nodes[self.id.0].directive
    }

    pub fn name(&self) -> &'a str {
        self.directive().name()
    }

    pub fn parameters(&self) -> &'a [Parameter] {
        &self.directive().parameters
    }

    pub fn param(&self, index: usize) -> Option<&'a str> {
        self.directive().param(index)
    }

    pub fn kind(&self) -> &'a DirectiveKind {
        self.directive().kind()
    }

    pub fn line(&self) -> usize {
        self.directive().line
    }

    pub fn block(&self) -> Option<&'a Block> {
        self.directive().block()
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.config
            .parent(self.id)
            .map(|id| NodeRef { config: self.config, id })
    }

    pub fn context(&self) -> Context {
        self.config.context_of(self.id).unwrap_or(self.config.context)
    }

    /// Direct children in order
    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + use<'a> {
        let config = self.config;
        self.block()
            .map(|b| b.children())
            .unwrap_or(&[])
            .iter()
            .map(move |&id| NodeRef { config, id })
    }

    /// Direct children named `name`
    pub fn children_named(&self, name: &'a str) -> impl Iterator<Item = NodeRef<'a>> + use<'a> {
        self.children().filter(move |c| c.name() == name)
    }

    /// Every directive below this one, descending into includes
    pub fn descendants(&self) -> impl Iterator<Item = NodeRef<'a>> + use<'a> {
        let frame = self.block().map(|b| Frame {
            config: self.config,
            iter: b.children().iter(),
            context: self.context().child(self.name()),
            depth: 1,
        });
        Walk {
            stack: frame.into_iter().collect(),
        }
        .map(|v| v.node)
    }

    pub fn find_directives(&self, name: &'a str) -> Vec<NodeRef<'a>> {
        self.descendants().filter(|n| n.name() == name).collect()
    }
}

/// One step of a [`Walk`]
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    pub node: NodeRef<'a>,
    /// Context the directive sits in
    pub context: Context,
    pub depth: usize,
}

struct Frame<'a> {
    config: &'a Config,
    iter: std::slice::Iter<'a, NodeId>,
    context: Context,
    depth: usize,
}

/// Iterator over a tree in document order
pub struct Walk<'a> {
    stack: Vec<Frame<'a>>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = Visit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (config, context, depth, next) = {
                let frame = self.stack.last_mut()?;
                (frame.config, frame.context, frame.depth, frame.iter.next().copied())
            };
            let Some(id) = next else {
                self.stack.pop();
                continue;
            };
            let node = NodeRef { config, id };
            let directive = node.directive();

            if let DirectiveKind::Include(include) = directive.kind() {
                for included in include.configs.iter().rev() {
                    self.stack.push(Frame {
                        config: included,
                        iter: included.root.children.iter(),
                        context,
                        depth: depth + 1,
                    });
                }
            }
            if let Some(block) = directive.block() {
                self.stack.push(Frame {
                    config,
                    iter: block.children.iter(),
                    context: context.child(directive.name()),
                    depth: depth + 1,
                });
            }

            return Some(Visit {
                node,
                context,
                depth,
            });
        }
    }
}
