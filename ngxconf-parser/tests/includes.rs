//! Include expansion through real files

use ngxconf_parser::{
    parse_file, serialize, validate, write_tree, DirectiveKind, ErrorKind, ParseOptions, Style,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn site() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "nginx.conf",
        "events { worker_connections 1024; }\nhttp {\n    include upstreams.conf;\n    include sites/*.conf;\n}\n",
    );
    write(
        dir.path(),
        "upstreams.conf",
        "upstream api {\n    server 10.0.0.1:8080;\n}\n",
    );
    write(
        dir.path(),
        "sites/b.conf",
        "server {\n    listen 80;\n    server_name b.example.com;\n    location / {\n        proxy_pass http://api;\n    }\n}\n",
    );
    write(
        dir.path(),
        "sites/a.conf",
        "server {\n    listen 80;\n    server_name a.example.com;\n}\n",
    );
    dir
}

#[test]
fn test_includes_left_alone_by_default() {
    let dir = site();
    let config = parse_file(dir.path().join("nginx.conf"), &ParseOptions::default()).unwrap();
    let includes = config.find_includes();
    assert_eq!(includes.len(), 2);
    assert!(includes.iter().all(|node| match node.kind() {
        DirectiveKind::Include(include) => !include.is_expanded(),
        _ => false,
    }));
    assert!(config.servers().is_empty());
}

#[test]
fn test_glob_expansion_in_sorted_order() {
    let dir = site();
    let config = parse_file(dir.path().join("nginx.conf"), &ParseOptions::expanding()).unwrap();

    let names: Vec<&str> = config
        .servers()
        .iter()
        .flat_map(|s| s.server_names())
        .collect();
    assert_eq!(names, vec!["a.example.com", "b.example.com"]);
    assert!(config.find_upstream_by_name("api").is_some());

    // Included nodes know which file they came from
    let server = config.find_servers_by_name("b.example.com")[0].node();
    assert!(server.config().path().unwrap().ends_with("sites/b.conf"));
}

#[test]
fn test_validation_sees_across_includes() {
    let dir = site();
    let config = parse_file(dir.path().join("nginx.conf"), &ParseOptions::expanding()).unwrap();
    let findings = validate(&config);
    assert!(findings.is_empty(), "{}", findings);

    write(dir.path(), "upstreams.conf", "upstream other { server 10.0.0.9; }\n");
    let config = parse_file(dir.path().join("nginx.conf"), &ParseOptions::expanding()).unwrap();
    let findings = validate(&config);
    assert_eq!(findings.len(), 1);
    let finding = findings.iter().next().unwrap();
    assert_eq!(finding.kind, ErrorKind::Dependency);
    assert!(finding.file.as_ref().unwrap().ends_with("sites/b.conf"));
    assert_eq!(finding.line, Some(5));
}

#[test]
fn test_include_cycle() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.conf", "include b.conf;\n");
    write(dir.path(), "b.conf", "include a.conf;\n");
    let err = parse_file(dir.path().join("a.conf"), &ParseOptions::expanding()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::File);
    assert!(err.message.contains("cycle"), "{}", err);
}

#[test]
fn test_missing_include_is_file_error() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "nginx.conf", "http {\n    include missing.conf;\n}\n");
    let err = parse_file(dir.path().join("nginx.conf"), &ParseOptions::expanding()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::File);
    assert_eq!(err.line, Some(2));
    assert!(err.file.unwrap().ends_with("nginx.conf"));
}

#[test]
fn test_syntax_error_names_included_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "nginx.conf", "http {\n    include broken.conf;\n}\n");
    write(dir.path(), "broken.conf", "server {\n    listen 80\n}\n");
    let err = parse_file(dir.path().join("nginx.conf"), &ParseOptions::expanding()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Syntax);
    assert!(err.file.unwrap().ends_with("broken.conf"));
}

#[test]
fn test_missing_root_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = parse_file(dir.path().join("nope.conf"), &ParseOptions::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::File);
}

#[test]
fn test_inline_includes_output() {
    let dir = site();
    let config = parse_file(dir.path().join("nginx.conf"), &ParseOptions::expanding()).unwrap();

    let plain = serialize(&config, &Style::default());
    assert!(plain.contains("include upstreams.conf;"));
    assert!(!plain.contains("upstream api"));

    let style = Style {
        inline_includes: true,
        ..Style::default()
    };
    let inlined = serialize(&config, &style);
    assert!(!inlined.contains("include"));
    assert!(inlined.contains("    upstream api {\n        server 10.0.0.1:8080;\n    }\n"));
    let a = inlined.find("a.example.com").unwrap();
    let b = inlined.find("b.example.com").unwrap();
    assert!(a < b);
}

#[test]
fn test_write_tree_rewrites_every_file() {
    let dir = site();
    let mut config =
        parse_file(dir.path().join("nginx.conf"), &ParseOptions::expanding()).unwrap();
    let events = config.find_directives("events")[0].id();
    config.remove(events);

    let written = write_tree(&config, &Style::compact()).unwrap();
    assert_eq!(written.len(), 4);
    assert!(written[0].ends_with("nginx.conf"));

    let root = fs::read_to_string(dir.path().join("nginx.conf")).unwrap();
    assert_eq!(
        root,
        "http{\n  include upstreams.conf;\n  include sites/*.conf;\n}\n"
    );
    let upstreams = fs::read_to_string(dir.path().join("upstreams.conf")).unwrap();
    assert_eq!(upstreams, "upstream api{\n  server 10.0.0.1:8080;\n}\n");

    let again = parse_file(dir.path().join("nginx.conf"), &ParseOptions::expanding()).unwrap();
    assert_eq!(again.servers().len(), 2);
}

#[test]
fn test_included_map_entries() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "nginx.conf",
        "http {\n    map $host $backend {\n        default a;\n        include hosts.map;\n    }\n}\n",
    );
    write(dir.path(), "hosts.map", "example.com b;\n");
    let config = parse_file(dir.path().join("nginx.conf"), &ParseOptions::expanding()).unwrap();
    let include = config.find_directives("include")[0];
    let DirectiveKind::Include(include) = include.kind() else {
        panic!("include not specialized");
    };
    let entry = include.configs[0].top_level().next().unwrap();
    assert!(matches!(entry.kind(), DirectiveKind::MapEntry(_)));
}
