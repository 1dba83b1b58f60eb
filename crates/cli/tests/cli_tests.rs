//! CLI integration tests

use std::process::{Command, Output};

fn incictl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_incictl"))
        .args(args)
        .env_remove("INCICTL_API_URL")
        .output()
        .expect("Failed to execute incictl")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = incictl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("pod incident controller"),
        "Should show app description"
    );
    assert!(stdout.contains("incidents"), "Should show incidents command");
    assert!(stdout.contains("alerts"), "Should show alerts command");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = incictl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("incictl"), "Should show binary name");
}

/// Test incidents list subcommand help
#[test]
fn test_incidents_list_help() {
    let output = incictl(&["incidents", "list", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Incidents list help should succeed");
    assert!(stdout.contains("--limit"), "Should show limit option");
    assert!(stdout.contains("--namespace"), "Should show namespace option");
    assert!(stdout.contains("--severity"), "Should show severity option");
}

/// Test alerts subcommands are listed
#[test]
fn test_alerts_help() {
    let output = incictl(&["alerts", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Alerts help should succeed");
    for command in ["list", "get", "ack", "stats", "evict"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test evict rejects malformed durations before any request is made
#[test]
fn test_evict_rejects_bad_duration() {
    let output = incictl(&[
        "--api-url",
        "http://127.0.0.1:9",
        "incidents",
        "evict",
        "--older-than",
        "3w",
    ]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Bad duration should fail");
    assert!(stderr.contains("invalid duration"), "Should explain the format");
}

/// Test evict requires a duration
#[test]
fn test_evict_requires_older_than() {
    let output = incictl(&["alerts", "evict"]);

    assert!(!output.status.success(), "Missing --older-than should fail");
}

/// Test incidents list against a mock controller
#[test]
fn test_incidents_list_json() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/api/v1/incidents")
        .match_query(mockito::Matcher::UrlEncoded("limit".into(), "5".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create();

    let url = server.url();
    let output = incictl(&[
        "--api-url", &url, "--format", "json", "incidents", "list", "--limit", "5",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    mock.assert();
    assert!(output.status.success(), "List should succeed");
    assert_eq!(stdout.trim(), "[]");
}

/// Test resolve surfaces the API error for an unknown incident
#[test]
fn test_resolve_unknown_incident() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("POST", "/api/v1/incidents/inc-missing/resolve")
        .with_status(404)
        .with_body(r#"{"error":"incident 'inc-missing' not found or already resolved"}"#)
        .create();

    let url = server.url();
    let output = incictl(&["--api-url", &url, "incidents", "resolve", "inc-missing"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Resolve of unknown id should fail");
    assert!(
        stderr.contains("already healed"),
        "Should explain the missing incident"
    );
}
