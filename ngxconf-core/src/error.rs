//! Error types for ngxconf
//!
//! Every failure the parser, validators and dumper can report is an [`Error`]
//! carrying its [`ErrorKind`] and as much location information as is known.
//! Validation passes return all their findings at once as [`Errors`].

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for ngxconf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed token stream: unterminated quote, unbalanced braces,
    /// missing semicolon, unexpected end of input
    Syntax,
    /// Directive used outside the contexts it is permitted in
    Context,
    /// Cross-directive invariant violated
    Dependency,
    /// Include target missing, unreadable or cyclic; write failures
    File,
    /// Malformed parameters for a directive that requires a specific shape
    Validation,
    /// Unrecognized block name where a known one was expected
    UnknownDirective,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Syntax => "syntax",
            ErrorKind::Context => "context",
            ErrorKind::Dependency => "dependency",
            ErrorKind::File => "file",
            ErrorKind::Validation => "validation",
            ErrorKind::UnknownDirective => "unknown directive",
        };
        f.write_str(name)
    }
}

/// How serious a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Severity {
    #[default]
    Error,
    /// Structural concern that does not make the configuration unusable
    Warning,
}

/// A structured error with optional source location
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error{}: {message}{}", location_suffix(.file, .line, .column), suggestion_suffix(.suggestion))]
pub struct Error {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub file: Option<PathBuf>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub suggestion: Option<String>,
}

fn location_suffix(file: &Option<PathBuf>, line: &Option<usize>, column: &Option<usize>) -> String {
    let mut out = String::new();
    if file.is_none() && line.is_none() {
        return out;
    }
    out.push_str(" at ");
    if let Some(file) = file {
        out.push_str(&file.display().to_string());
        if line.is_some() {
            out.push(':');
        }
    }
    if let Some(line) = line {
        out.push_str(&line.to_string());
        if let Some(column) = column {
            out.push(':');
            out.push_str(&column.to_string());
        }
    }
    out
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean `{}`?)", s),
        None => String::new(),
    }
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            file: None,
            line: None,
            column: None,
            suggestion: None,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn context(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Context, message)
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dependency, message)
    }

    pub fn file(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::File, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unknown_directive(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownDirective, message)
    }

    /// Set the source line
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Set line and column
    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Attach the file the error was found in, unless one is already set
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        if self.file.is_none() {
            self.file = Some(file.into());
        }
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Downgrade to a warning
    pub fn warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::file(err.to_string())
    }
}

/// A collection of findings from one validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Errors {
    errors: Vec<Error>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: Error) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = Error>) {
        self.errors.extend(errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.errors.iter()
    }

    pub fn as_slice(&self) -> &[Error] {
        &self.errors
    }

    /// True when at least one finding is not a warning
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| !e.is_warning())
    }

    /// Findings of one kind
    pub fn of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &Error> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    pub fn into_vec(self) -> Vec<Error> {
        self.errors
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.first() {
            Some(first) => {
                write!(f, "{}", first)?;
                if self.errors.len() > 1 {
                    write!(f, " (+{} more)", self.errors.len() - 1)?;
                }
                Ok(())
            }
            None => f.write_str("no errors"),
        }
    }
}

impl std::error::Error for Errors {}

impl From<Error> for Errors {
    fn from(error: Error) -> Self {
        Self { errors: vec![error] }
    }
}

impl From<Vec<Error>> for Errors {
    fn from(errors: Vec<Error>) -> Self {
        Self { errors }
    }
}

impl FromIterator<Error> for Errors {
    fn from_iter<I: IntoIterator<Item = Error>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Errors {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a> IntoIterator for &'a Errors {
    type Item = &'a Error;
    type IntoIter = std::slice::Iter<'a, Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_location() {
        let err = Error::syntax("unexpected '}'")
            .with_file("/etc/nginx/nginx.conf")
            .at(12, 5);
        assert_eq!(
            err.to_string(),
            "syntax error at /etc/nginx/nginx.conf:12:5: unexpected '}'"
        );
    }

    #[test]
    fn test_display_with_suggestion() {
        let err = Error::unknown_directive("unknown block directive 'upstrem'")
            .at_line(3)
            .with_suggestion("upstream");
        assert_eq!(
            err.to_string(),
            "unknown directive error at 3: unknown block directive 'upstrem' (did you mean `upstream`?)"
        );
    }

    #[test]
    fn test_with_file_keeps_innermost() {
        let err = Error::file("cycle").with_file("b.conf").with_file("a.conf");
        assert_eq!(err.file, Some(PathBuf::from("b.conf")));
    }

    #[test]
    fn test_errors_aggregate() {
        let mut errors = Errors::new();
        assert!(!errors.has_errors());
        errors.push(Error::dependency("multiple http blocks").warning());
        assert!(!errors.has_errors());
        errors.push(Error::context("'listen' not allowed here"));
        assert!(errors.has_errors());
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.of_kind(ErrorKind::Context).count(), 1);
        assert!(errors.to_string().ends_with("(+1 more)"));
    }
}
