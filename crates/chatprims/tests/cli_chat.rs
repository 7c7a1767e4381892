#![cfg(all(unix, feature = "cli"))]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use chatprims::frame::{LineReader, LineWriter};

fn chatprims() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_chatprims"));
    command.arg("--log-level").arg("error");
    command
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind should work");
    listener.local_addr().expect("local addr").port()
}

fn wait_for_server(port: u16, timeout: Duration) -> TcpStream {
    let start = Instant::now();
    loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => return stream,
            Err(err) => {
                if start.elapsed() >= timeout {
                    panic!("server did not come up: {err}");
                }
                thread::sleep(Duration::from_millis(25));
            }
        }
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Option<std::process::ExitStatus> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("try_wait should work") {
            return Some(status);
        }
        if start.elapsed() >= timeout {
            return None;
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn version_prints_package_version() {
    let output = chatprims()
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("chatprims "));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn server_relays_client_line_to_other_peers() {
    let port = free_port();
    let mut server = chatprims()
        .arg("--format")
        .arg("json")
        .arg("server")
        .arg("--port")
        .arg(port.to_string())
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("server should start");

    // The readiness check connection doubles as the listening peer.
    let listener = wait_for_server(port, Duration::from_secs(5));
    listener
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");

    let sent = chatprims()
        .arg("client")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--send")
        .arg("  hello  ")
        .stdin(Stdio::null())
        .output()
        .expect("client should run");
    assert!(
        sent.status.success(),
        "client failed: {}",
        String::from_utf8_lossy(&sent.stderr)
    );

    let relayed = LineReader::new(&listener)
        .read_message()
        .expect("relayed line should arrive");
    assert_eq!(relayed.as_str(), Some("hello"));

    let status = wait_with_timeout(&mut server, Duration::from_secs(5));
    if status.is_none() {
        let _ = server.kill();
    }
    let mut stdout = String::new();
    server
        .stdout
        .take()
        .expect("stdout piped")
        .read_to_string(&mut stdout)
        .expect("stdout readable");

    assert!(status.is_some_and(|s| s.success()), "server did not exit after --count");
    assert!(stdout.contains("\"message\":\"hello\""), "stdout: {stdout}");
}

#[test]
fn client_prints_lines_from_server() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let mut client = chatprims()
        .arg("--format")
        .arg("raw")
        .arg("client")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--exit-after")
        .arg("2")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("client should start");

    let (remote, _) = listener.accept().expect("client should connect");
    remote
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");

    let mut stdin = client.stdin.take().expect("stdin piped");
    stdin.write_all(b"\n   \n typed line \n").expect("stdin write");
    stdin.flush().expect("stdin flush");

    let typed = LineReader::new(&remote)
        .read_message()
        .expect("typed line should arrive");
    assert_eq!(typed.as_str(), Some("typed line"));

    let mut writer = LineWriter::new(&remote);
    writer.send(b"first").expect("remote write");
    writer.send(b"  second  ").expect("remote write");

    let status = wait_with_timeout(&mut client, Duration::from_secs(5));
    if status.is_none() {
        let _ = client.kill();
    }
    drop(stdin);

    let mut stdout = String::new();
    client
        .stdout
        .take()
        .expect("stdout piped")
        .read_to_string(&mut stdout)
        .expect("stdout readable");

    assert!(status.is_some_and(|s| s.success()), "client did not exit after --exit-after");
    assert_eq!(stdout, "first\nsecond\n");
}

#[test]
fn client_bad_address_returns_usage() {
    let output = chatprims()
        .arg("client")
        .arg("no-port-here")
        .arg("--send")
        .arg("x")
        .output()
        .expect("client should run");
    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bad address"), "stderr: {stderr}");
}

#[test]
fn client_connection_refused_returns_failure() {
    let port = free_port();
    let output = chatprims()
        .arg("client")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--send")
        .arg("x")
        .stdin(Stdio::null())
        .output()
        .expect("client should run");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn client_rejects_blank_send_value() {
    let port = free_port();
    let output = chatprims()
        .arg("client")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--send")
        .arg("   ")
        .output()
        .expect("client should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn server_port_busy_returns_failure() {
    let occupied = TcpListener::bind("0.0.0.0:0").expect("bind");
    let port = occupied.local_addr().expect("addr").port();

    let output = chatprims()
        .arg("server")
        .arg("--port")
        .arg(port.to_string())
        .output()
        .expect("server should run");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("busy"), "stderr: {stderr}");
}
