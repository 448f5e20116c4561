//! ngxconf - check and reformat nginx configuration files
//!
//! This is the main entry point for the ngxconf CLI.

use anyhow::Context as _;
use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::{Parser, Subcommand};
use ngxconf_core::{Error, ParseOptions, Settings, SettingsLoader, Severity, Style};
use ngxconf_parser::{parse_file, serialize, validate, write_file, write_tree};
use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// ngxconf - nginx configuration checker and formatter
#[derive(Parser)]
#[command(name = "ngxconf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a configuration file
    Check {
        /// Path to nginx.conf
        #[arg(default_value = "nginx.conf")]
        file: PathBuf,

        /// Follow include directives
        #[arg(long)]
        includes: bool,
    },

    /// Reformat a configuration file
    Fmt {
        /// Path to nginx.conf
        #[arg(default_value = "nginx.conf")]
        file: PathBuf,

        /// Rewrite the file in place instead of printing it
        #[arg(short, long)]
        write: bool,

        /// Spaces per nesting level
        #[arg(long)]
        indent: Option<usize>,

        /// Emit the directives of each block alphabetically
        #[arg(long)]
        sort: bool,

        /// Follow include directives. Printed output inlines them;
        /// with --write every included file is rewritten too.
        #[arg(long)]
        includes: bool,
    },

    /// Print the directive tree with the context of every node
    Tree {
        /// Path to nginx.conf
        #[arg(default_value = "nginx.conf")]
        file: PathBuf,

        /// Follow include directives
        #[arg(long)]
        includes: bool,
    },

    /// Show version information
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let settings = match &cli.config {
        Some(path) => SettingsLoader::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::Check { file, includes } => {
            let options = parse_options(&settings, includes);
            tracing::info!("Checking {}", file.display());

            let config = match parse_file(&file, &options) {
                Ok(config) => config,
                Err(e) => {
                    Reporter::new(&file).emit(&e);
                    std::process::exit(1);
                }
            };

            let findings = validate(&config);
            let mut reporter = Reporter::new(&file);
            for finding in &findings {
                reporter.emit(finding);
            }

            let warnings = findings.iter().filter(|e| e.is_warning()).count();
            let errors = findings.len() - warnings;
            if findings.has_errors() {
                eprintln!(
                    "{}: {} error(s), {} warning(s)",
                    file.display(),
                    errors,
                    warnings
                );
                std::process::exit(1);
            }
            println!(
                "{}: ok ({} directive(s), {} warning(s))",
                file.display(),
                config.descendants().count(),
                warnings
            );
        }

        Commands::Fmt {
            file,
            write,
            indent,
            sort,
            includes,
        } => {
            let options = parse_options(&settings, includes);
            let mut style = settings.style.clone();
            if let Some(indent) = indent {
                style = style.with_indent(indent);
            }
            if sort {
                style = style.sorted();
            }

            let config = match parse_file(&file, &options) {
                Ok(config) => config,
                Err(e) => {
                    Reporter::new(&file).emit(&e);
                    std::process::exit(1);
                }
            };

            if write {
                if options.expand_includes {
                    let written = write_tree(&config, &style)?;
                    for path in written {
                        println!("formatted {}", path.display());
                    }
                } else {
                    write_file(&file, &config, &style)?;
                    println!("formatted {}", file.display());
                }
            } else {
                let style = Style {
                    inline_includes: options.expand_includes,
                    ..style
                };
                print!("{}", serialize(&config, &style));
            }
        }

        Commands::Tree { file, includes } => {
            let options = parse_options(&settings, includes);
            let config = parse_file(&file, &options)
                .with_context(|| format!("parsing {}", file.display()))?;
            for visit in config.walk() {
                let node = visit.node;
                println!(
                    "{}{} [{}] in {} (line {})",
                    "  ".repeat(visit.depth),
                    node.name(),
                    node.kind().label(),
                    visit.context.as_str(),
                    node.line()
                );
            }
        }

        Commands::Version => {
            println!("ngxconf v{}", ngxconf_core::VERSION);
        }
    }

    Ok(())
}

fn parse_options(settings: &Settings, includes: bool) -> ParseOptions {
    let mut options = settings.parse.clone();
    options.expand_includes |= includes;
    options
}

/// Renders findings against the source text of the file they point at
struct Reporter {
    fallback: PathBuf,
    sources: HashMap<PathBuf, Option<String>>,
}

impl Reporter {
    fn new(fallback: &Path) -> Self {
        Self {
            fallback: fallback.to_path_buf(),
            sources: HashMap::new(),
        }
    }

    fn source(&mut self, path: &Path) -> Option<&str> {
        self.sources
            .entry(path.to_path_buf())
            .or_insert_with(|| fs::read_to_string(path).ok())
            .as_deref()
    }

    fn emit(&mut self, error: &Error) {
        let path = error.file.clone().unwrap_or_else(|| self.fallback.clone());
        let Some(line) = error.line else {
            eprintln!("{}", error);
            return;
        };
        let Some(text) = self.source(&path).map(str::to_owned) else {
            eprintln!("{}", error);
            return;
        };

        let (kind, color) = match error.severity {
            Severity::Error => (ReportKind::Error, Color::Red),
            Severity::Warning => (ReportKind::Warning, Color::Yellow),
        };
        let id = path.display().to_string();
        let span = span_of(&text, line, error.column);

        let mut report = Report::build(kind, (id.clone(), span.clone()))
            .with_message(&error.message)
            .with_label(
                Label::new((id.clone(), span))
                    .with_message(format!("{} error", error.kind))
                    .with_color(color),
            );
        if let Some(suggestion) = &error.suggestion {
            report = report.with_help(format!("did you mean `{}`?", suggestion));
        }
        if let Err(e) = report.finish().eprint((id, Source::from(text))) {
            tracing::error!("Failed to render diagnostic: {}", e);
            eprintln!("{}", error);
        }
    }
}

/// Character range of a 1-based line, or of one character when the
/// column is known
fn span_of(text: &str, line: usize, column: Option<usize>) -> Range<usize> {
    let mut start = 0;
    for (index, current) in text.split_inclusive('\n').enumerate() {
        let body = current.trim_end_matches(['\n', '\r']);
        let len = body.chars().count();
        if index + 1 == line {
            return match column {
                Some(column) if column >= 1 && column <= len => {
                    start + column - 1..start + column
                }
                _ => start..start + len,
            };
        }
        start += current.chars().count();
    }
    start..start
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_of_line() {
        let text = "events {}\nhttp {\n  listen 80;\n}\n";
        assert_eq!(span_of(text, 1, None), 0..9);
        assert_eq!(span_of(text, 3, None), 17..29);
        assert_eq!(span_of(text, 3, Some(3)), 19..20);
    }

    #[test]
    fn test_span_past_end() {
        let text = "user nginx;\n";
        assert_eq!(span_of(text, 5, None), 12..12);
    }

    #[test]
    fn test_parse_options_merge() {
        let settings = Settings::default();
        assert!(!parse_options(&settings, false).expand_includes);
        assert!(parse_options(&settings, true).expand_includes);
    }
}
