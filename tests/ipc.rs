//! End-to-end IPC tests: real Unix sockets, a server thread dispatching
//! into a frozen registry, and the client helpers talking to it.

use std::path::{Path, PathBuf};
use std::thread;

use picod::error::PicodError;
use picod::ipc::client;
use picod::ipc::IpcServer;
use picod::registry::RegistryBuilder;
use picod::wire::Request;

fn test_socket(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    (dir, path)
}

fn spawn_server(path: &Path) {
    let mut builder = RegistryBuilder::new();
    builder
        .register(
            "buzzer",
            "Buzz",
            "Buzz, options are:\n\tshort\n\tlong\n",
            |args| match args.first().map(String::as_str) {
                Some("short") | Some("long") => 0,
                _ => -1,
            },
        )
        .unwrap();
    builder
        .register(
            "fanspeed",
            "Set the fanspeed",
            "Set the fanspeed, options are:\n\tstop\n\tfull\n",
            |_args| 0,
        )
        .unwrap();

    let server = IpcServer::bind(path, builder.freeze()).unwrap();
    thread::spawn(move || {
        let _ = server.run();
    });
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_command_roundtrip() {
    let (_dir, path) = test_socket("roundtrip.sock");
    spawn_server(&path);

    let response = client::send_request(&path, &args(&["buzzer", "short"])).unwrap();
    assert_eq!(response.status, 0);
    assert!(response.error.is_none());
    assert!(response.help.is_none());

    assert_eq!(client::run_command(&path, &args(&["buzzer", "long"])).unwrap(), 0);
}

#[test]
fn test_unknown_command_reports_not_found() {
    let (_dir, path) = test_socket("unknown.sock");
    spawn_server(&path);

    let response = client::send_request(&path, &args(&["frobnicate"])).unwrap();
    assert_eq!(response.status, -1);
    assert_eq!(response.error.as_deref(), Some("Command not found\n"));
    assert!(response.help.is_none());

    assert_eq!(client::run_command(&path, &args(&["frobnicate"])).unwrap(), 1);
}

#[test]
fn test_bad_argument_returns_long_help() {
    let (_dir, path) = test_socket("badarg.sock");
    spawn_server(&path);

    let response = client::send_request(&path, &args(&["buzzer", "forever"])).unwrap();
    assert_eq!(response.status, -1);
    let text = response.error.unwrap();
    assert!(text.contains("\tshort"));
    assert!(text.contains("\tlong"));
}

#[test]
fn test_help_listing_is_padded_and_ordered() {
    let (_dir, path) = test_socket("help.sock");
    spawn_server(&path);

    let response = client::send_request(&path, &args(&["--help"])).unwrap();
    assert_eq!(response.status, 0);
    let listing = String::from_utf8(response.help.unwrap()).unwrap();
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], format!("{:<16} {}", "buzzer", "Buzz"));
    assert!(lines[1].starts_with("fanspeed"));

    // The help path reports exit code 1, like printing usage does.
    assert_eq!(client::run_command(&path, &args(&["--help"])).unwrap(), 1);
}

#[test]
fn test_empty_request_is_an_error() {
    let (_dir, path) = test_socket("empty.sock");
    spawn_server(&path);

    let response = client::send_request(&path, &[]).unwrap();
    assert_eq!(response.status, -1);
    assert_eq!(response.error.as_deref(), Some("No command given\n"));
}

#[test]
fn test_liveness_probe_does_not_disturb_server() {
    let (_dir, path) = test_socket("probe.sock");
    spawn_server(&path);

    assert!(client::probe(&path));
    // A probe is connect-and-close; the server must still answer.
    let response = client::send_request(&path, &args(&["buzzer", "short"])).unwrap();
    assert_eq!(response.status, 0);
}

#[test]
fn test_second_instance_is_refused() {
    let (_dir, path) = test_socket("second.sock");
    spawn_server(&path);

    let second = IpcServer::bind(&path, RegistryBuilder::new().freeze());
    assert!(matches!(second, Err(PicodError::AlreadyRunning(_))));
}

#[test]
fn test_sequential_clients() {
    let (_dir, path) = test_socket("sequential.sock");
    spawn_server(&path);

    for arg in ["short", "long", "short"] {
        let response = client::send_request(&path, &args(&["buzzer", arg])).unwrap();
        assert_eq!(response.status, 0);
    }
}

#[test]
fn test_request_encoding_survives_the_wire() {
    // Multi-arg command with spaces lands intact on the server side.
    let (_dir, path) = test_socket("encoding.sock");
    spawn_server(&path);

    let request = Request::new(args(&["fanspeed", "a value with spaces"]));
    assert_eq!(request.args.len(), 2);
    let response = client::send_request(&path, &request.args).unwrap();
    assert_eq!(response.status, 0);
}
