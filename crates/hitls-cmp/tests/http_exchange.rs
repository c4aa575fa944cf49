//! CMP over HTTP on a loopback socket.

#![cfg(feature = "http")]

use std::io::{BufRead, BufReader, Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use hitls_cmp::http::{serve_one, HttpTransfer, DEFAULT_MAX_RESP_LEN};
use hitls_cmp::msg::{GeneralName, PkiBody, PkiHeader, PkiMessage};
use hitls_cmp::{
    protect, verify_protection, MockServer, ProtectionContext, ServerConfig, TransactionPhase,
};
use hitls_pki::x509::DistinguishedName;
use hitls_types::TransportError;

fn ctx() -> ProtectionContext {
    let mut ctx = ProtectionContext::new();
    ctx.set_secret_value(b"insta")
        .set_pbm_iteration_count(100)
        .unwrap();
    ctx
}

fn genm() -> PkiMessage {
    let mut header = PkiHeader::new(
        DistinguishedName::new(&[("CN", "client")]).into(),
        GeneralName::null_dn(),
    );
    header.transaction_id = Some(vec![1; 16]);
    header.sender_nonce = Some(vec![2; 16]);
    let mut msg = PkiMessage::new(header, PkiBody::Genm(vec![]));
    protect(&mut ctx(), &mut msg).unwrap();
    msg
}

/// Serve `rounds` requests on a fresh loopback listener.
fn spawn_server(rounds: usize) -> (String, thread::JoinHandle<Vec<Result<(), TransportError>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = thread::spawn(move || {
        let mut srv = MockServer::new(ServerConfig::new(), ctx());
        (0..rounds)
            .map(|_| {
                let (mut stream, _) = listener.accept().unwrap();
                serve_one(&mut stream, &mut srv, DEFAULT_MAX_RESP_LEN)
            })
            .collect()
    });
    (addr, handle)
}

#[test]
fn test_genm_over_http() {
    let (addr, handle) = spawn_server(1);
    let transfer = HttpTransfer::new(addr.clone(), "/pkix/");
    let mut stream = TcpStream::connect(&addr).unwrap();
    let rsp = transfer.send_receive(&mut stream, &genm()).unwrap();

    assert_eq!(rsp.body, PkiBody::Genp(vec![]));
    assert_eq!(rsp.header.recip_nonce, Some(vec![2; 16]));
    verify_protection(&mut ctx(), &rsp).unwrap();
    assert!(handle.join().unwrap()[0].is_ok());
}

#[test]
fn test_response_limit() {
    let (addr, handle) = spawn_server(1);
    let transfer = HttpTransfer::new(addr.clone(), "/").with_max_resp_len(16);
    let mut stream = TcpStream::connect(&addr).unwrap();
    assert!(matches!(
        transfer.send_receive(&mut stream, &genm()),
        Err(TransportError::BodyTooLarge { limit: 16 })
    ));
    handle.join().unwrap();
}

#[test]
fn test_garbage_body_gets_400() {
    let (addr, handle) = spawn_server(1);
    let mut stream = TcpStream::connect(&addr).unwrap();
    stream
        .write_all(
            b"POST / HTTP/1.0\r\nContent-Type: application/pkixcmp\r\nContent-Length: 3\r\n\r\nabc",
        )
        .unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).unwrap();
    assert!(reply.starts_with("HTTP/1.0 400"));
    assert!(matches!(
        handle.join().unwrap()[0],
        Err(TransportError::MalformedMessage(_))
    ));
}

/// Consume one HTTP request so closing the socket does not reset it.
fn drain_request(stream: &mut TcpStream) {
    let mut reader = BufReader::new(stream);
    let mut len = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some(v) = line.strip_prefix("Content-Length:") {
            len = v.trim().parse().unwrap();
        }
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).unwrap();
}

#[test]
fn test_http_error_status() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        drain_request(&mut stream);
        stream
            .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n")
            .unwrap();
    });
    let transfer = HttpTransfer::new(addr.clone(), "/");
    let mut stream = TcpStream::connect(&addr).unwrap();
    match transfer.send_receive(&mut stream, &genm()) {
        Err(TransportError::HttpStatus { code, reason }) => {
            assert_eq!(code, 503);
            assert_eq!(reason, "Service Unavailable");
        }
        other => panic!("unexpected {other:?}"),
    }
    handle.join().unwrap();
}

/// In-memory connection: reads from `input`, collects what is written.
struct Pipe {
    input: Cursor<Vec<u8>>,
    output: Vec<u8>,
}

impl Pipe {
    fn new(input: &[u8]) -> Self {
        Self {
            input: Cursor::new(input.to_vec()),
            output: Vec::new(),
        }
    }
}

impl Read for Pipe {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for Pipe {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn polling_server() -> MockServer {
    let mut cfg = ServerConfig::new();
    cfg.set_poll_count(1).unwrap();
    let mut srv = MockServer::new(cfg, ctx());
    srv.process(&genm());
    assert_eq!(srv.phase(), TransactionPhase::Polling);
    srv
}

#[test]
fn test_malformed_request_ends_transaction() {
    let mut srv = polling_server();
    let mut pipe = Pipe::new(
        b"POST / HTTP/1.0\r\nContent-Type: application/pkixcmp\r\nContent-Length: 3\r\n\r\nabc",
    );
    assert!(matches!(
        serve_one(&mut pipe, &mut srv, DEFAULT_MAX_RESP_LEN),
        Err(TransportError::MalformedMessage(_))
    ));
    assert!(pipe.output.starts_with(b"HTTP/1.0 400"));
    assert_eq!(srv.phase(), TransactionPhase::Idle);
}

#[test]
fn test_rejected_http_head_ends_transaction() {
    let mut srv = polling_server();
    let mut pipe = Pipe::new(b"POST / HTTP/1.0\r\nContent-Type: application/pkixcmp\r\n\r\n");
    assert!(matches!(
        serve_one(&mut pipe, &mut srv, DEFAULT_MAX_RESP_LEN),
        Err(TransportError::MissingContentLength)
    ));
    assert!(pipe.output.starts_with(b"HTTP/1.0 411"));
    assert_eq!(srv.phase(), TransactionPhase::Idle);
}
