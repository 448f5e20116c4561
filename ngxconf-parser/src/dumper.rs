//! Configuration dumper
//!
//! Turns a tree back into nginx syntax. Output parses back to a tree with
//! the same names, parameters, comments and nesting; only whitespace and
//! the placement of braces follow the [`Style`].

use crate::parser::ast::{Config, Directive, NodeRef, Parameter};
use crate::parser::classifier::{is_quoted, quote};
use crate::parser::kinds::DirectiveKind;
use ngxconf_core::{Error, Result, Style};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

/// Serializes trees with one [`Style`]
pub struct Dumper<'s> {
    style: &'s Style,
}

impl<'s> Dumper<'s> {
    pub fn new(style: &'s Style) -> Self {
        Self { style }
    }

    pub fn dump(&self, config: &Config) -> String {
        let mut out = String::new();
        let top: Vec<NodeRef<'_>> = config.top_level().collect();
        self.write_nodes(&mut out, top, 0);
        for comment in &config.root().trailing_comments {
            self.write_comment(&mut out, comment, 0);
        }
        out
    }

    fn indent(&self, level: usize) -> String {
        " ".repeat(self.style.starting_indent + level * self.style.indent_width)
    }

    fn write_nodes(&self, out: &mut String, mut nodes: Vec<NodeRef<'_>>, level: usize) {
        if self.style.sort_siblings {
            nodes.sort_by(|a, b| a.name().cmp(b.name()));
        }
        for node in nodes {
            self.write_node(out, node, level);
        }
    }

    fn write_comment(&self, out: &mut String, comment: &str, level: usize) {
        for line in comment.lines() {
            out.push_str(&self.indent(level));
            out.push_str(&comment_text(line));
            out.push('\n');
        }
    }

    fn write_node(&self, out: &mut String, node: NodeRef<'_>, level: usize) {
        let directive = node.directive();
        for comment in &directive.comments {
            self.write_comment(out, comment, level);
        }

        if self.style.inline_includes {
            if let DirectiveKind::Include(include) = directive.kind() {
                if include.is_expanded() {
                    for config in &include.configs {
                        self.write_nodes(out, config.top_level().collect(), level);
                        for comment in &config.root().trailing_comments {
                            self.write_comment(out, comment, level);
                        }
                    }
                    return;
                }
            }
        }

        out.push_str(&self.indent(level));
        self.write_statement(out, directive, level);

        let inline = directive.inline_comment.as_deref().map(comment_text);
        let Some(block) = directive.block() else {
            out.push(';');
            push_inline(out, inline.as_deref());
            out.push('\n');
            return;
        };

        if self.style.space_before_block_brace || fuses_with_brace(out) {
            out.push(' ');
        }
        out.push('{');

        if let Some(body) = block.raw_body() {
            out.push_str(body);
            out.push('}');
            push_inline(out, inline.as_deref());
            out.push('\n');
            return;
        }

        push_inline(out, inline.as_deref());
        out.push('\n');
        self.write_nodes(out, node.children().collect(), level + 1);
        for comment in &block.trailing_comments {
            self.write_comment(out, comment, level + 1);
        }
        out.push_str(&self.indent(level));
        out.push_str("}\n");
    }

    /// Name and parameters; parameters that started on a later line than
    /// the one before them keep their line break
    fn write_statement(&self, out: &mut String, directive: &Directive, level: usize) {
        out.push_str(&render_word(directive.name()));
        let mut offset = 0;
        for param in &directive.parameters {
            if param.line_offset() > offset {
                out.push('\n');
                out.push_str(&self.indent(level + 1));
            } else {
                out.push(' ');
            }
            offset = param.line_offset();
            out.push_str(&render_param(param));
        }
    }
}

fn push_inline(out: &mut String, comment: Option<&str>) {
    if let Some(comment) = comment {
        out.push(' ');
        out.push_str(comment);
    }
}

fn comment_text(text: &str) -> String {
    if text.starts_with('#') {
        text.to_string()
    } else {
        format!("# {}", text)
    }
}

/// Whether `value` lexes back as one bare word. Backslash escapes and
/// `${name}` references are part of a word and pass through untouched.
fn is_bare_word(value: &str) -> bool {
    if value.is_empty() || value.starts_with('#') {
        return false;
    }
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) if !next.is_whitespace() => {}
                _ => return false,
            },
            '$' if chars.peek() == Some(&'{') => loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) if !c.is_whitespace() => {}
                    _ => return false,
                }
            },
            c if c.is_whitespace() => return false,
            ';' | '{' | '}' | '"' | '\'' => return false,
            _ => {}
        }
    }
    true
}

fn render_word(value: &str) -> Cow<'_, str> {
    if is_quoted(value) || is_bare_word(value) {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(quote(value))
    }
}

/// A brace written straight after these would be read as part of the word
fn fuses_with_brace(out: &str) -> bool {
    out.ends_with('$') || out.ends_with('\\')
}

fn render_param(param: &Parameter) -> Cow<'_, str> {
    render_word(param.value())
}

/// Serialize a tree to text
pub fn serialize(config: &Config, style: &Style) -> String {
    Dumper::new(style).dump(config)
}

/// Serialize a tree and write it to `path`
pub fn write_file(path: impl AsRef<Path>, config: &Config, style: &Style) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, serialize(config, style)).map_err(|e| {
        Error::file(format!("cannot write '{}': {}", path.display(), e)).with_file(path)
    })
}

/// Write a tree and every expanded include back to the paths they were
/// loaded from. Returns the written paths, root first.
pub fn write_tree(config: &Config, style: &Style) -> Result<Vec<PathBuf>> {
    let style = Style {
        inline_includes: false,
        ..style.clone()
    };
    let mut written = Vec::new();
    let mut pending = vec![config];
    while let Some(current) = pending.pop() {
        let path = current
            .path()
            .ok_or_else(|| Error::file("tree has no file path to write to"))?;
        write_file(path, current, &style)?;
        tracing::debug!("wrote {}", path.display());
        written.push(path.to_path_buf());

        let mut included: Vec<&Config> = Vec::new();
        for node in current.descendants() {
            // Nested includes are reached through their own file
            if !std::ptr::eq(node.config(), current) {
                continue;
            }
            if let DirectiveKind::Include(include) = node.kind() {
                included.extend(include.configs.iter());
            }
        }
        pending.extend(included.into_iter().rev());
    }
    Ok(written)
}
