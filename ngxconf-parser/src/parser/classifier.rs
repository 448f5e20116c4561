//! Parameter classification
//!
//! Assigns a semantic type to the literal text of a directive parameter.
//! Classification is a pure function of the literal: the same text always
//! gets the same type, wherever it appears.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Semantic type of a parameter literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterType {
    /// `$remote_addr`
    Variable,
    /// `1024`, `0.5`
    Number,
    /// `10m`, `512k`, `1G`
    Size,
    /// `30s`, `1h30m`, `500ms`
    Duration,
    /// `on`, `off`, `yes`, `no`, `true`, `false`
    Boolean,
    /// `/var/www/html`, `./conf`, `../logs`
    Path,
    /// `http://example.com`, `https://backend`
    Url,
    /// `~`, `~*`, `^/api/(.*)$`
    Regex,
    /// `"quoted string"`, `'single'`
    Quoted,
    String,
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterType::Variable => "variable",
            ParameterType::Number => "number",
            ParameterType::Size => "size",
            ParameterType::Duration => "duration",
            ParameterType::Boolean => "boolean",
            ParameterType::Path => "path",
            ParameterType::Url => "url",
            ParameterType::Regex => "regex",
            ParameterType::Quoted => "quoted",
            ParameterType::String => "string",
        };
        f.write_str(name)
    }
}

static SIZE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?[kKmMgG]$").unwrap());

static DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+(ms|s|m|h|d|w|M|y))+$").unwrap());

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").unwrap());

/// Classify a parameter literal.
///
/// The first matching rule wins, in this order: variable, size, duration,
/// number, boolean, path, URL, regex, quoted, string.
pub fn classify(literal: &str) -> ParameterType {
    if literal.starts_with('$') && literal.len() > 1 {
        ParameterType::Variable
    } else if SIZE.is_match(literal) {
        ParameterType::Size
    } else if DURATION.is_match(literal) {
        ParameterType::Duration
    } else if NUMBER.is_match(literal) {
        ParameterType::Number
    } else if is_boolean(literal) {
        ParameterType::Boolean
    } else if is_path(literal) {
        ParameterType::Path
    } else if literal.starts_with("http://") || literal.starts_with("https://") {
        ParameterType::Url
    } else if is_regex(literal) {
        ParameterType::Regex
    } else if is_quoted(literal) {
        ParameterType::Quoted
    } else {
        ParameterType::String
    }
}

fn is_boolean(literal: &str) -> bool {
    ["on", "off", "yes", "no", "true", "false"]
        .iter()
        .any(|b| literal.eq_ignore_ascii_case(b))
}

fn is_path(literal: &str) -> bool {
    literal.starts_with('/') || literal.starts_with("./") || literal.starts_with("../")
}

fn is_regex(literal: &str) -> bool {
    if literal.starts_with('~') || literal.starts_with('^') {
        return true;
    }
    // A trailing unescaped `$` anchors a pattern
    literal.len() > 1 && literal.ends_with('$') && !literal.ends_with("\\$")
}

/// Wrapped in a matching pair of `"` or `'`
pub fn is_quoted(literal: &str) -> bool {
    let bytes = literal.as_bytes();
    bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
}

/// Strip the surrounding quotes of a quoted literal and resolve `\"`, `\'`
/// and `\\` escapes. Other literals are returned unchanged.
pub fn unquote(literal: &str) -> String {
    if !is_quoted(literal) {
        return literal.to_string();
    }
    let inner = &literal[1..literal.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(q @ ('"' | '\'' | '\\')) => result.push(q),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Wrap a value in double quotes, escaping embedded quotes and backslashes
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_cases() {
        assert_eq!(classify("1024"), ParameterType::Number);
        assert_eq!(classify("10m"), ParameterType::Size);
        assert_eq!(classify("30s"), ParameterType::Duration);
        assert_eq!(classify("/var/www/html"), ParameterType::Path);
        assert_eq!(classify("http://example.com"), ParameterType::Url);
        assert_eq!(classify("$remote_addr"), ParameterType::Variable);
        assert_eq!(classify("~^/api/(.*)$"), ParameterType::Regex);
        assert_eq!(classify("\"quoted string\""), ParameterType::Quoted);
    }

    #[test]
    fn test_precedence() {
        // `m` is both megabytes and minutes: size is checked first
        assert_eq!(classify("5m"), ParameterType::Size);
        assert_eq!(classify("1h30m"), ParameterType::Duration);
        assert_eq!(classify("500ms"), ParameterType::Duration);
        assert_eq!(classify("1G"), ParameterType::Size);
        assert_eq!(classify("0.5"), ParameterType::Number);
        // Variables win even when they look like paths or regexes
        assert_eq!(classify("$uri$"), ParameterType::Variable);
        // Quoted strings that happen to look like something else stay quoted
        assert_eq!(classify("'on'"), ParameterType::Quoted);
    }

    #[test]
    fn test_booleans_case_insensitive() {
        for b in ["on", "OFF", "Yes", "no", "TRUE", "false"] {
            assert_eq!(classify(b), ParameterType::Boolean, "{}", b);
        }
    }

    #[test]
    fn test_plain_strings() {
        assert_eq!(classify("example.com"), ParameterType::String);
        assert_eq!(classify("auto"), ParameterType::String);
        assert_eq!(classify("10mb"), ParameterType::String);
        assert_eq!(classify("$"), ParameterType::String);
        assert_eq!(classify("\"unbalanced"), ParameterType::String);
    }

    #[test]
    fn test_regex_markers() {
        assert_eq!(classify("~*"), ParameterType::Regex);
        assert_eq!(classify("^/images/"), ParameterType::Regex);
        assert_eq!(classify(r"\.php$"), ParameterType::Regex);
        assert_eq!(classify(r"price\$"), ParameterType::String);
    }

    #[test]
    fn test_unquote_and_quote() {
        assert_eq!(unquote(r#""a \"b\" c""#), r#"a "b" c"#);
        assert_eq!(unquote("'x'"), "x");
        assert_eq!(unquote("plain"), "plain");
        assert_eq!(quote(r#"say "hi""#), r#""say \"hi\"""#);
    }
}
