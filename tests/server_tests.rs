//! End-to-end requests over TCP through the may_minihttp transport.

mod common;

use brrtweb::action;
use brrtweb::body::Body;
use brrtweb::dispatcher::Controller;
use brrtweb::server::{HttpServer, ServerHandle};
use brrtweb::static_files::Static;
use brrtweb::HandlerError;
use common::fixtures::static_tree;
use common::harness::app;
use common::test_server::setup_may_runtime;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;
use tempfile::TempDir;

fn start_service() -> (ServerHandle, SocketAddr, TempDir) {
    setup_may_runtime();
    let dir = static_tree();
    let root = Controller::new()
        .action(
            "hello",
            action::text().params(1).handler(|ctx, args| {
                ctx.add_cookie(ctx.new_cookie("seen", "1"));
                ctx.add_cookie(ctx.new_cookie("name", &args[0]));
                Ok(Body::from(format!("hello {}", &args[0])))
            }),
        )
        .action(
            "echo",
            action::text()
                .verbs(["post"])
                .handler(|ctx, _| {
                    let form = ctx.form()?;
                    let form = form.borrow();
                    Ok(Body::from(form["msg"].as_str().unwrap_or("").to_string()))
                }),
        )
        .action(
            "crash",
            action::text().handler(|_, _| Err(HandlerError::internal("kaboom"))),
        )
        .mount("files", Static::new(dir.path()));
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let handle = HttpServer::from(app(root)).start(addr).unwrap();
    handle.wait_ready().unwrap();
    (handle, addr, dir)
}

fn send_request(addr: &SocketAddr, req: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(req.as_bytes()).unwrap();
    stream.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    let mut buf = Vec::new();
    loop {
        let mut tmp = [0u8; 1024];
        match stream.read(&mut tmp) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&tmp[..n]),
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                break
            }
            Err(e) => panic!("read error: {:?}", e),
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

/// Status code, header lines and body of a raw response.
fn parse_parts(resp: &str) -> (u16, Vec<(String, String)>, String) {
    let (head, body) = resp.split_once("\r\n\r\n").unwrap_or((resp, ""));
    let mut status = 0;
    let mut headers = Vec::new();
    for line in head.lines() {
        if line.starts_with("HTTP/1.1") {
            status = line.split_whitespace().nth(1).unwrap_or("0").parse().unwrap();
        } else if let Some((name, val)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), val.trim().to_string()));
        }
    }
    (status, headers, body.to_string())
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Vec<&'a str> {
    headers
        .iter()
        .filter(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .collect()
}

#[test]
fn test_handler_over_tcp() {
    let (handle, addr, _dir) = start_service();
    let resp = send_request(&addr, "GET /hello/world HTTP/1.1\r\nHost: x\r\n\r\n");
    handle.stop();

    let (status, headers, body) = parse_parts(&resp);
    assert_eq!(status, 200);
    assert_eq!(body, "hello world");
    assert_eq!(header(&headers, "content-type"), vec!["text/plain; charset=utf-8"]);
    assert_eq!(
        header(&headers, "set-cookie"),
        vec!["seen=1; path=/", "name=world; path=/"]
    );
}

#[test]
fn test_percent_decoded_path() {
    let (handle, addr, _dir) = start_service();
    let resp = send_request(&addr, "GET /hello/big%20world HTTP/1.1\r\nHost: x\r\n\r\n");
    handle.stop();

    let (status, _, body) = parse_parts(&resp);
    assert_eq!(status, 200);
    assert_eq!(body, "hello big world");
}

#[test]
fn test_form_post_over_tcp() {
    let (handle, addr, _dir) = start_service();
    let payload = "msg=ping";
    let req = format!(
        "POST /echo HTTP/1.1\r\nHost: x\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
        payload.len(),
        payload
    );
    let resp = send_request(&addr, &req);
    handle.stop();

    let (status, _, body) = parse_parts(&resp);
    assert_eq!(status, 200);
    assert_eq!(body, "ping");
}

#[test]
fn test_routing_errors_over_tcp() {
    let (handle, addr, _dir) = start_service();
    let missing = send_request(&addr, "GET /nope/nope/nope HTTP/1.1\r\nHost: x\r\n\r\n");
    let wrong_verb = send_request(&addr, "GET /echo HTTP/1.1\r\nHost: x\r\n\r\n");
    let traversal = send_request(&addr, "GET /files/../../etc/passwd HTTP/1.1\r\nHost: x\r\n\r\n");
    handle.stop();

    assert_eq!(parse_parts(&missing).0, 404);
    assert_eq!(parse_parts(&wrong_verb).0, 405);
    assert_eq!(parse_parts(&traversal).0, 403);
}

#[test]
fn test_static_file_over_tcp() {
    let (handle, addr, _dir) = start_service();
    let resp = send_request(&addr, "GET /files/a/a1 HTTP/1.1\r\nHost: x\r\n\r\n");
    handle.stop();

    let (status, headers, body) = parse_parts(&resp);
    assert_eq!(status, 200);
    assert_eq!(body, "A1");
    assert_eq!(header(&headers, "content-type"), vec!["application/octet-stream"]);
    assert_eq!(header(&headers, "content-length"), vec!["2"]);
}

#[test]
fn test_unhandled_error_is_500() {
    let (handle, addr, _dir) = start_service();
    let resp = send_request(&addr, "GET /crash HTTP/1.1\r\nHost: x\r\n\r\n");
    handle.stop();

    let (status, _, body) = parse_parts(&resp);
    assert_eq!(status, 500);
    assert!(body.starts_with("Internal Server Error"));
}

#[test]
fn test_per_request_headers_on_one_connection() {
    let (handle, addr, _dir) = start_service();
    let resp = send_request(
        &addr,
        "GET /hello/one HTTP/1.1\r\nHost: x\r\n\r\nGET /hello/two HTTP/1.1\r\nHost: x\r\n\r\n",
    );
    handle.stop();

    let second = resp.find("HTTP/1.1 200").and_then(|first| {
        resp[first + 1..].find("HTTP/1.1 200").map(|i| first + 1 + i)
    });
    let second = second.expect("two responses on the connection");
    let (_, first_headers, _) = parse_parts(&resp[..second]);
    let (_, second_headers, body) = parse_parts(&resp[second..]);
    assert_eq!(header(&first_headers, "set-cookie"), vec!["seen=1; path=/", "name=one; path=/"]);
    assert_eq!(header(&second_headers, "set-cookie"), vec!["seen=1; path=/", "name=two; path=/"]);
    assert_eq!(body, "hello two");
}
