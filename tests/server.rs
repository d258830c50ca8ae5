use emberkv::{Config, Keyspace, Server};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn free_port() -> u16 {
    let probe = TcpListener::bind("127.0.0.1:0").expect("probe bind");
    let port = probe.local_addr().expect("probe addr").port();
    drop(probe);
    port
}

/// Start a server on a free port in a background thread
fn spawn_server(extra_args: Vec<String>) -> u16 {
    let port = free_port();
    let mut args = vec!["--port".to_string(), port.to_string()];
    args.extend(extra_args);
    thread::spawn(move || {
        let config = Arc::new(Config::from_args(args).expect("config"));
        let store = Arc::new(Keyspace::new());
        let mut server = Server::bind(config, store).expect("bind server");
        let _ = server.run();
    });
    port
}

fn connect(port: u16) -> TcpStream {
    for _ in 0..100 {
        if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)) {
            stream
                .set_read_timeout(Some(Duration::from_secs(10)))
                .expect("read timeout");
            return stream;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("server never started accepting on port {port}");
}

fn roundtrip(stream: &mut TcpStream, frame: &[u8]) -> Vec<u8> {
    stream.write_all(frame).expect("write frame");
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).expect("read response");
    buf[..n].to_vec()
}

#[test]
fn ping_over_the_wire() {
    let port = spawn_server(Vec::new());
    let mut c = connect(port);
    assert_eq!(roundtrip(&mut c, b"*1\r\n$4\r\nPING\r\n"), b"+PONG\r\n");
}

#[test]
fn set_then_get_over_the_wire() {
    let port = spawn_server(Vec::new());
    let mut c = connect(port);
    assert_eq!(
        roundtrip(&mut c, b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n"),
        b"+OK\r\n"
    );
    assert_eq!(roundtrip(&mut c, b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n"), b"$3\r\nbar\r\n");
}

#[test]
fn px_expiry_over_the_wire() {
    let port = spawn_server(Vec::new());
    let mut c = connect(port);
    assert_eq!(
        roundtrip(
            &mut c,
            b"*5\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n$2\r\nPX\r\n$2\r\n50\r\n"
        ),
        b"+OK\r\n"
    );
    thread::sleep(Duration::from_millis(100));
    assert_eq!(roundtrip(&mut c, b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n"), b"$-1\r\n");
}

#[test]
fn unknown_command_is_reported_to_the_client() {
    let port = spawn_server(Vec::new());
    let mut c = connect(port);
    assert_eq!(
        roundtrip(&mut c, b"*1\r\n$3\r\nFOO\r\n"),
        b"-ERR unknown command 'FOO'\r\n"
    );
}

#[test]
fn clients_are_served_independently() {
    let port = spawn_server(Vec::new());
    let mut first = connect(port);
    let mut second = connect(port);
    assert_eq!(
        roundtrip(&mut first, b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n"),
        b"+OK\r\n"
    );
    // a second connection sees the first one's write
    assert_eq!(roundtrip(&mut second, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n"), b"$1\r\nv\r\n");
    // dropping one client does not disturb the other
    drop(first);
    assert_eq!(roundtrip(&mut second, b"*1\r\n$4\r\nPING\r\n"), b"+PONG\r\n");
}

#[test]
fn replica_handshake_completes_then_serves_clients() {
    let master = TcpListener::bind("127.0.0.1:0").expect("mock master bind");
    let master_port = master.local_addr().expect("master addr").port();

    // Mock master: answer the three handshake steps in sequence.
    let master_thread = thread::spawn(move || {
        let (mut link, _) = master.accept().expect("accept replica");
        let mut buf = [0u8; 512];
        for reply in [&b"+PONG\r\n"[..], b"+OK\r\n", b"+OK\r\n"] {
            let n = link.read(&mut buf).expect("read handshake frame");
            assert!(n > 0, "replica closed the link mid-handshake");
            link.write_all(reply).expect("write handshake reply");
        }
        // hold the link open long enough for the replica to move on
        thread::sleep(Duration::from_millis(500));
    });

    let port = spawn_server(vec![
        "--replicaof".to_string(),
        format!("127.0.0.1 {master_port}"),
    ]);

    let mut c = connect(port);
    assert_eq!(roundtrip(&mut c, b"*1\r\n$4\r\nPING\r\n"), b"+PONG\r\n");

    // and the replica reports its role
    let info = roundtrip(&mut c, b"*2\r\n$4\r\nINFO\r\n$11\r\nreplication\r\n");
    let text = String::from_utf8(info).expect("utf8");
    assert!(text.contains("role:slave"));

    master_thread.join().expect("mock master");
}
