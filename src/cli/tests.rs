//! Unit tests for CLI commands

use crate::cli::{run_cli_with_writer, Cli, Commands};
use clap::Parser;

const ROUTES: &str = r#"
routes:
  - name: greet
    path: /greet/{name}
    method: GET
    produces: text/plain
    parameters:
      - { name: name, in: path }
      - { name: times, in: query, type: integer, default: 1 }
    response:
      body: "Hello ${name} x${times}"
  - name: items
    path: /items
    method: POST
"#;

fn run(args: &[&str]) -> String {
    let cli = Cli::try_parse_from(args).unwrap();
    let mut out = Vec::new();
    run_cli_with_writer(&cli, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn route_file() -> tempfile::NamedTempFile {
    let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    std::fs::write(file.path(), ROUTES).unwrap();
    file
}

#[test]
fn test_match_command_parses() {
    let cli = Cli::try_parse_from([
        "routebind", "match", "--file", "r.yaml", "-X", "post", "--path", "/x", "-H", "X-A: 1", "-H",
        "X-B: 2",
    ])
    .unwrap();
    match cli.command {
        Commands::Match { file, request } => {
            assert_eq!(file.to_string_lossy(), "r.yaml");
            assert_eq!(request.method, "post");
            assert_eq!(request.headers.len(), 2);
        }
        _ => panic!("Expected Match command"),
    }
}

#[test]
fn test_routes_lists_file() {
    let file = route_file();
    let out = run(&["routebind", "routes", "--file", file.path().to_str().unwrap()]);
    assert!(out.contains("/greet/{name}"));
    assert!(out.contains("items"));
}

#[test]
fn test_match_reports_variables_and_errors() {
    let file = route_file();
    let path = file.path().to_str().unwrap();
    let out = run(&["routebind", "match", "--file", path, "--path", "/greet/ada"]);
    assert!(out.contains("handler: greet"));
    assert!(out.contains(r#"{"name":"ada"}"#));

    let out = run(&["routebind", "match", "--file", path, "--path", "/items"]);
    assert!(out.contains("no match (405)"));
}

#[test]
fn test_dispatch_renders_template() {
    let file = route_file();
    let out = run(&[
        "routebind",
        "dispatch",
        "--file",
        file.path().to_str().unwrap(),
        "--path",
        "/greet/ada?times=3",
    ]);
    assert!(out.starts_with("status: 200"));
    assert!(out.contains("Hello ada x3"));
}

#[test]
fn test_bad_header_is_an_error() {
    let file = route_file();
    let cli = Cli::try_parse_from([
        "routebind",
        "match",
        "--file",
        file.path().to_str().unwrap(),
        "--path",
        "/x",
        "-H",
        "no-colon",
    ])
    .unwrap();
    let mut out = Vec::new();
    assert!(run_cli_with_writer(&cli, &mut out).is_err());
}
