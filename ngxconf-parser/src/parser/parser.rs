//! nginx configuration parser
//!
//! Recursive descent over the token stream. Each block is parsed with the
//! context its directive opens, and every directive is handed to the
//! [`Registry`] before it is attached to the tree.

use crate::parser::ast::{Block, Config, Directive, NodeId, Parameter};
use crate::parser::context::Context;
use crate::parser::lexer::{tokenize, LexError, Token, TokenKind};
use crate::parser::registry::Registry;
use ngxconf_core::{Error, Result};

impl From<LexError> for Error {
    fn from(err: LexError) -> Self {
        Error::syntax(err.to_string()).at(err.line(), err.column())
    }
}

/// Parser for one source text
pub struct Parser<'r> {
    registry: &'r Registry,
    context: Context,
}

impl<'r> Parser<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            context: Context::Main,
        }
    }

    /// Parse as if the text sat inside a block of `context`
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn parse(&self, source: &str) -> Result<Config> {
        let tokens = tokenize(source)?;
        let mut state = State {
            tokens,
            pos: 0,
            registry: self.registry,
            config: Config::new().with_context(self.context),
            last_end: None,
        };
        state.parse_block(None, self.context, None)?;
        tracing::trace!(
            "parsed {} directive(s) in {} context",
            state.config.len(),
            self.context.as_str()
        );
        Ok(state.config)
    }
}

struct State<'r> {
    tokens: Vec<Token>,
    pos: usize,
    registry: &'r Registry,
    config: Config,
    /// Directive whose statement ended last, with the line it ended on
    last_end: Option<(NodeId, usize)>,
}

fn unexpected(token: &Token, expecting: &str) -> Error {
    Error::syntax(format!("unexpected {}, expecting {}", token, expecting)).at(token.line, token.column)
}

impl State<'_> {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Parse directives until the `}` closing a block opened on `open_line`,
    /// or until end of input at the top level
    fn parse_block(
        &mut self,
        parent: Option<NodeId>,
        context: Context,
        open_line: Option<usize>,
    ) -> Result<()> {
        let mut pending: Vec<String> = Vec::new();
        loop {
            let Some(token) = self.next() else {
                if let Some(line) = open_line {
                    return Err(Error::syntax(format!(
                        "unexpected end of file, block opened on line {} is not closed",
                        line
                    ))
                    .at_line(line));
                }
                self.config.trailing_comments_mut(parent)?.extend(pending);
                return Ok(());
            };

            match token.kind {
                TokenKind::Comment => {
                    match self.last_end {
                        Some((id, line)) if line == token.line => {
                            if let Some(directive) = self.config.directive_mut(id) {
                                directive.inline_comment = Some(token.text);
                            }
                            self.last_end = None;
                        }
                        _ => pending.push(token.text),
                    }
                }
                TokenKind::CloseBrace => {
                    if open_line.is_none() {
                        return Err(Error::syntax("unexpected '}'").at(token.line, token.column));
                    }
                    self.config.trailing_comments_mut(parent)?.extend(pending);
                    self.last_end = None;
                    return Ok(());
                }
                TokenKind::Word | TokenKind::QuotedString => {
                    self.last_end = None;
                    let comments = std::mem::take(&mut pending);
                    self.parse_statement(token, parent, context, comments)?;
                }
                TokenKind::Semicolon | TokenKind::OpenBrace | TokenKind::RawBlock => {
                    return Err(unexpected(&token, "a directive name"));
                }
            }
        }
    }

    fn parse_statement(
        &mut self,
        name: Token,
        parent: Option<NodeId>,
        context: Context,
        mut comments: Vec<String>,
    ) -> Result<()> {
        let mut params = Vec::new();
        let terminator = loop {
            let Some(token) = self.next() else {
                return Err(Error::syntax(format!(
                    "unexpected end of file, expecting ';' or '{{' after '{}'",
                    name.text
                ))
                .at(name.line, name.column));
            };
            match token.kind {
                TokenKind::Word | TokenKind::QuotedString => {
                    let offset = token.line - name.line;
                    params.push(Parameter::new(token.text).with_line_offset(offset));
                }
                TokenKind::Comment => comments.push(token.text),
                TokenKind::Semicolon | TokenKind::OpenBrace => break token,
                TokenKind::CloseBrace => {
                    return Err(Error::syntax(format!(
                        "unexpected '}}', missing ';' after '{}'",
                        name.text
                    ))
                    .at(token.line, token.column));
                }
                TokenKind::RawBlock => return Err(unexpected(&token, "';' or '{'")),
            }
        };

        let mut directive = Directive::new(&name.text).with_params(params).at_line(name.line);
        directive.comments = comments;

        if terminator.is(TokenKind::Semicolon) {
            directive.set_kind(self.registry.specialize(&directive, context)?);
            let id = self.config.append(parent, directive)?;
            self.last_end = Some((id, terminator.line));
            return Ok(());
        }

        // Raw bodies arrive as a single token followed by the closing brace
        if self.tokens.get(self.pos).is_some_and(|t| t.is(TokenKind::RawBlock)) {
            let body = self.next().map(|t| t.text).unwrap_or_default();
            let close = match self.next() {
                Some(t) if t.is(TokenKind::CloseBrace) => t,
                _ => {
                    return Err(Error::syntax(format!(
                        "unexpected end of file, block opened on line {} is not closed",
                        terminator.line
                    ))
                    .at_line(terminator.line));
                }
            };
            let directive = directive.with_block(Block::raw(body));
            let kind = self.registry.specialize(&directive, context)?;
            let id = self.config.append(parent, directive.with_kind(kind))?;
            self.last_end = Some((id, close.line));
            return Ok(());
        }

        let child = context.child(directive.name());
        if child == Context::Other {
            if let Some(suggestion) = self.registry.suggest(directive.name()) {
                return Err(Error::unknown_directive(format!(
                    "unknown block directive '{}'",
                    directive.name()
                ))
                .at(name.line, name.column)
                .with_suggestion(suggestion));
            }
        }

        let directive = directive.with_block(Block::new());
        let kind = self.registry.specialize(&directive, context)?;
        let id = self.config.append(parent, directive.with_kind(kind))?;
        self.last_end = Some((id, terminator.line));
        self.parse_block(Some(id), child, Some(terminator.line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::kinds::DirectiveKind;
    use ngxconf_core::ErrorKind;

    fn parse(source: &str) -> Result<Config> {
        Parser::new(&Registry::standard()).parse(source)
    }

    #[test]
    fn test_minimal_config() {
        let config = parse(
            "events { worker_connections 1024; } http { server { listen 80; server_name example.com; } }",
        )
        .unwrap();
        assert_eq!(config.find_directives("events").len(), 1);
        assert_eq!(config.find_directives("server").len(), 1);
        let listen = config.find_directives("listen");
        assert_eq!(listen.len(), 1);
        assert_eq!(listen[0].param(0), Some("80"));
        assert_eq!(config.find_directives("server_name")[0].param(0), Some("example.com"));
    }

    #[test]
    fn test_comments_attach() {
        let source = "# top\nuser nginx; # who\n\nhttp {\n    # inside\n    gzip on;\n    # trailing\n}\n# eof\n";
        let config = parse(source).unwrap();
        let user = config.find_directives("user")[0].directive();
        assert_eq!(user.comments, vec!["# top"]);
        assert_eq!(user.inline_comment.as_deref(), Some("# who"));
        let gzip = config.find_directives("gzip")[0];
        assert_eq!(gzip.directive().comments, vec!["# inside"]);
        let http = gzip.parent().unwrap();
        assert_eq!(http.block().unwrap().trailing_comments, vec!["# trailing"]);
        assert_eq!(config.root().trailing_comments, vec!["# eof"]);
    }

    #[test]
    fn test_comment_after_open_brace_is_inline() {
        let config = parse("server { # main site\n listen 80;\n}").unwrap();
        let server = config.find_directives("server")[0].directive();
        assert_eq!(server.inline_comment.as_deref(), Some("# main site"));
    }

    #[test]
    fn test_parameter_line_offsets() {
        let config = parse("log_format main\n    '$remote_addr'\n    '$status';").unwrap();
        let offsets: Vec<usize> = config.find_directives("log_format")[0]
            .parameters()
            .iter()
            .map(|p| p.line_offset())
            .collect();
        assert_eq!(offsets, vec![0, 1, 2]);
    }

    #[test]
    fn test_specialization_by_context() {
        let config = parse(
            "http { upstream app { server 10.0.0.1:80; } server { location / { } } }\n\
             stream { upstream db { server 10.0.0.2:5432; } server { listen 5432; } }",
        )
        .unwrap();
        let kinds: Vec<&str> = config.descendants().map(|n| n.kind().label()).collect();
        assert_eq!(
            kinds,
            vec![
                "http",
                "upstream",
                "upstream server",
                "server",
                "location",
                "stream",
                "stream upstream",
                "stream upstream server",
                "stream server",
                "generic",
            ]
        );
    }

    #[test]
    fn test_snippet_blocks_are_typed() {
        let config = parse("upstream empty {}\nupstream app { server 10.0.0.1:80; }\nserver { listen 80; }").unwrap();
        let kinds: Vec<&str> = config.descendants().map(|n| n.kind().label()).collect();
        assert_eq!(
            kinds,
            vec!["upstream", "upstream", "upstream server", "server", "generic"]
        );
        assert!(config.find_upstream_by_name("empty").is_some());
        assert_eq!(config.upstreams().len(), 2);
        assert_eq!(config.servers()[0].ports(), vec![80]);
    }

    #[test]
    fn test_unmatched_close_brace() {
        let err = parse("events { }\n}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_unclosed_block_reports_opening_line() {
        let err = parse("http {\n    server {\n        listen 80;\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_missing_semicolon() {
        let err = parse("http { gzip on }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert!(err.message.contains("missing ';'"));
        assert!(parse("worker_processes auto").is_err());
    }

    #[test]
    fn test_stray_semicolon() {
        let err = parse("events { ; }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.column, Some(10));
    }

    #[test]
    fn test_unterminated_string_is_syntax_error() {
        let err = parse("server_name \"example.com;\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn test_strict_upstream() {
        let err = parse("http {\n    upstream {\n        server 127.0.0.1;\n    }\n}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_unknown_block_suggestion() {
        let err = parse("http { upstrem backend { server 127.0.0.1; } }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownDirective);
        assert_eq!(err.suggestion.as_deref(), Some("upstream"));
        // Unknown leaf directives and unmodelled blocks are fine
        assert!(parse("http { types { text/html html; } my_module_flag on; }").is_ok());
    }

    #[test]
    fn test_lua_block_kept_verbatim() {
        let config = parse("location / {\n    content_by_lua_block {\n        ngx.say(\"{\")\n    } # lua\n}").unwrap();
        let lua = config.find_directives("content_by_lua_block")[0];
        assert_eq!(lua.kind(), &DirectiveKind::LuaBlock);
        assert_eq!(
            lua.block().unwrap().raw_body(),
            Some("\n        ngx.say(\"{\")\n    ")
        );
        assert_eq!(lua.directive().inline_comment.as_deref(), Some("# lua"));
    }

    #[test]
    fn test_quoted_directive_name() {
        let config = parse("map $uri $target { \"/old path\" /new; default /; }").unwrap();
        let map = config.top_level().next().unwrap().as_map().unwrap();
        assert_eq!(map.get("\"/old path\""), Some("/new"));
        assert_eq!(map.default_value(), Some("/"));
    }
}
