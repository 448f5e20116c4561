//! Lexer for nginx configuration syntax
//!
//! Tokenizes the directive/block language.
//!
//! Key features:
//! - Whitespace (including newlines) only separates tokens
//! - Directive names, variables, regexes and paths are all plain words
//! - `{` `}` `;` are structural
//! - `"..."` and `'...'` strings keep their quotes and escapes
//! - `#` comments are kept as tokens so the parser can attach them
//! - `*_lua_block { ... }` bodies are captured verbatim

use logos::Logos;
use std::fmt;

/// Byte range of a token in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub start: usize,
    pub end: usize,
}

impl From<logos::Span> for Location {
    fn from(span: logos::Span) -> Self {
        Self {
            start: span.start,
            end: span.end,
        }
    }
}

/// Raw token recognized by logos
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum RawToken {
    #[token("{")]
    BlockOpen,

    #[token("}")]
    BlockClose,

    #[token(";")]
    Semicolon,

    #[regex(r"#[^\n]*")]
    Comment,

    #[regex(r#""([^"\\]|\\(.|\n))*""#)]
    #[regex(r#"'([^'\\]|\\(.|\n))*'"#)]
    QuotedString,

    // Longest match keeps these from ever shadowing a closed string.
    #[regex(r#""([^"\\]|\\(.|\n))*"#)]
    #[regex(r#"'([^'\\]|\\(.|\n))*"#)]
    UnterminatedString,

    /// `${name}` may appear inside a word; `#` is only a comment at the start.
    #[regex(r#"([^ \t\r\n\f{};"'#\\$]|\\[^ \t\r\n\f]|\$\{[^}\s]*\}|\$)([^ \t\r\n\f{};"'\\$]|\\[^ \t\r\n\f]|\$\{[^}\s]*\}|\$)*"#)]
    Word,
}

/// Token kinds exposed to the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Word,
    QuotedString,
    OpenBrace,
    CloseBrace,
    Semicolon,
    Comment,
    /// Verbatim body of a raw block, braces excluded
    RawBlock,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Word => "word",
            TokenKind::QuotedString => "quoted string",
            TokenKind::OpenBrace => "'{'",
            TokenKind::CloseBrace => "'}'",
            TokenKind::Semicolon => "';'",
            TokenKind::Comment => "comment",
            TokenKind::RawBlock => "raw block",
        };
        f.write_str(name)
    }
}

/// A token with its text and 1-based position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text. Quoted strings keep their quotes, comments their `#`.
    pub text: String,
    pub line: usize,
    pub column: usize,
    pub span: Location,
}

impl Token {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Word | TokenKind::QuotedString => write!(f, "'{}'", self.text),
            kind => write!(f, "{}", kind),
        }
    }
}

/// Lexer error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    #[error("unterminated string starting at {line}:{column}")]
    UnterminatedString { line: usize, column: usize },

    #[error("unterminated block starting at {line}:{column}")]
    UnterminatedBlock { line: usize, column: usize },

    #[error("unexpected character at {line}:{column}")]
    UnexpectedChar { line: usize, column: usize },
}

impl LexError {
    pub fn line(&self) -> usize {
        match self {
            LexError::UnterminatedString { line, .. }
            | LexError::UnterminatedBlock { line, .. }
            | LexError::UnexpectedChar { line, .. } => *line,
        }
    }

    pub fn column(&self) -> usize {
        match self {
            LexError::UnterminatedString { column, .. }
            | LexError::UnterminatedBlock { column, .. }
            | LexError::UnexpectedChar { column, .. } => *column,
        }
    }
}

/// Lexer result type
pub type LexResult = Result<Vec<Token>, LexError>;

/// Whether a directive's block body is foreign code taken verbatim
pub fn is_raw_block_directive(name: &str) -> bool {
    name.ends_with("_by_lua_block") || name.ends_with("_lua_block")
}

/// Maps byte offsets to 1-based line/column pairs
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    pub fn position(&self, offset: usize) -> (usize, usize) {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (line + 1, offset - self.starts[line] + 1)
    }

    /// Byte offset of the start of a 1-based line
    pub fn line_start(&self, line: usize) -> Option<usize> {
        line.checked_sub(1).and_then(|i| self.starts.get(i).copied())
    }
}

/// Find the byte length of a raw block body, up to but excluding the
/// matching `}`. Strings and `--` comments inside the body are skipped.
fn raw_block_len(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Tokenize nginx configuration source
pub fn tokenize(source: &str) -> LexResult {
    let index = LineIndex::new(source);
    let mut lexer = RawToken::lexer(source);
    let mut tokens: Vec<Token> = Vec::new();
    // First word of the statement being read, used to spot raw blocks
    let mut statement_head: Option<String> = None;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let (line, column) = index.position(span.start);
        let text = lexer.slice().to_string();

        let kind = match result {
            Ok(RawToken::BlockOpen) => TokenKind::OpenBrace,
            Ok(RawToken::BlockClose) => TokenKind::CloseBrace,
            Ok(RawToken::Semicolon) => TokenKind::Semicolon,
            Ok(RawToken::Comment) => TokenKind::Comment,
            Ok(RawToken::QuotedString) => TokenKind::QuotedString,
            Ok(RawToken::Word) => TokenKind::Word,
            Ok(RawToken::UnterminatedString) => {
                return Err(LexError::UnterminatedString { line, column });
            }
            Err(()) => return Err(LexError::UnexpectedChar { line, column }),
        };

        match kind {
            TokenKind::Word | TokenKind::QuotedString if statement_head.is_none() => {
                statement_head = Some(text.clone());
            }
            TokenKind::Semicolon | TokenKind::CloseBrace => statement_head = None,
            _ => {}
        }

        let raw = kind == TokenKind::OpenBrace
            && statement_head.as_deref().is_some_and(is_raw_block_directive);

        tokens.push(Token {
            kind,
            text,
            line,
            column,
            span: span.clone().into(),
        });

        if kind == TokenKind::OpenBrace {
            statement_head = None;
        }

        if raw {
            let body_start = span.end;
            let len = raw_block_len(lexer.remainder())
                .ok_or(LexError::UnterminatedBlock { line, column })?;
            let (body_line, body_column) = index.position(body_start);
            tokens.push(Token {
                kind: TokenKind::RawBlock,
                text: source[body_start..body_start + len].to_string(),
                line: body_line,
                column: body_column,
                span: Location {
                    start: body_start,
                    end: body_start + len,
                },
            });
            lexer.bump(len);
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_directive() {
        let tokens = tokenize("worker_processes auto;").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "worker_processes");
        assert_eq!(tokens[1].text, "auto");
        assert!(tokens[2].is(TokenKind::Semicolon));
    }

    #[test]
    fn test_block_positions() {
        let tokens = tokenize("events {\n    worker_connections 1024;\n}").unwrap();
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Word,
                TokenKind::OpenBrace,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Semicolon,
                TokenKind::CloseBrace,
            ]
        );
        assert_eq!((tokens[2].line, tokens[2].column), (2, 5));
        assert_eq!((tokens[5].line, tokens[5].column), (3, 1));
    }

    #[test]
    fn test_quotes_keep_delimiters() {
        let tokens = tokenize(r#"add_header X-Test "a \"b\" c" 'd e';"#).unwrap();
        assert_eq!(tokens[2].kind, TokenKind::QuotedString);
        assert_eq!(tokens[2].text, r#""a \"b\" c""#);
        assert_eq!(tokens[3].text, "'d e'");
    }

    #[test]
    fn test_comments_are_tokens() {
        let tokens = tokenize("# leading\nlisten 80; # trailing\n").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[0].text, "# leading");
        assert_eq!(tokens[4].kind, TokenKind::Comment);
        assert_eq!(tokens[4].line, 2);
    }

    #[test]
    fn test_variables_regexes_paths_are_words() {
        let tokens = tokenize(r"location ~* \.(gif|jpg)$ { root /var/www/$host; }").unwrap();
        assert_eq!(tokens[1].text, "~*");
        assert_eq!(tokens[2].text, r"\.(gif|jpg)$");
        assert_eq!(tokens[5].text, "/var/www/$host");
    }

    #[test]
    fn test_braced_variable_inside_word() {
        let tokens = tokenize("return 301 https://${host}$request_uri;").unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[2].text, "https://${host}$request_uri");
    }

    #[test]
    fn test_hash_inside_word() {
        let tokens = tokenize("set $anchor a#b;").unwrap();
        assert_eq!(tokens[2].text, "a#b");
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("server_name \"example.com;\n").unwrap_err();
        assert_eq!(err, LexError::UnterminatedString { line: 1, column: 13 });
    }

    #[test]
    fn test_raw_lua_block() {
        let source = "content_by_lua_block {\n    ngx.say(\"}\") -- }\n    if x then end\n}\nlisten 80;";
        let tokens = tokenize(source).unwrap();
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Word,
                TokenKind::OpenBrace,
                TokenKind::RawBlock,
                TokenKind::CloseBrace,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Semicolon,
            ]
        );
        assert_eq!(tokens[2].text, "\n    ngx.say(\"}\") -- }\n    if x then end\n");
    }

    #[test]
    fn test_raw_block_with_params_and_nested_braces() {
        let source = "set_by_lua_block $res { local t = {1, 2} return t[1] }";
        let tokens = tokenize(source).unwrap();
        assert_eq!(tokens[3].kind, TokenKind::RawBlock);
        assert_eq!(tokens[3].text, " local t = {1, 2} return t[1] ");
        assert_eq!(tokens[4].kind, TokenKind::CloseBrace);
    }

    #[test]
    fn test_unterminated_raw_block() {
        let err = tokenize("access_by_lua_block {\n  local x = 1\n").unwrap_err();
        assert_eq!(err, LexError::UnterminatedBlock { line: 1, column: 21 });
    }

    #[test]
    fn test_semicolon_splits_words() {
        assert_eq!(
            kinds("a b;c"),
            vec![
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Semicolon,
                TokenKind::Word
            ]
        );
    }

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(index.position(0), (1, 1));
        assert_eq!(index.position(4), (2, 2));
        assert_eq!(index.position(7), (4, 1));
        assert_eq!(index.line_start(2), Some(3));
        assert_eq!(index.line_start(0), None);
    }
}
