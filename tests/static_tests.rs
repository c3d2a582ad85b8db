mod common;

use brrtweb::dispatcher::Controller;
use brrtweb::server::RawRequest;
use brrtweb::static_files::Static;
use common::fixtures::{static_tree, write};
use common::harness::*;

#[test]
fn test_static_scenario() {
    let dir = static_tree();
    let app = app(Static::new(dir.path()).with_default_document(Some("b")));

    let res = get(&app, "/");
    assert_eq!(res.status, "200 OK");
    assert_eq!(res.text(), "B");

    let res = get(&app, "/a/a1");
    assert_eq!(res.status, "200 OK");
    assert_eq!(res.text(), "A1");

    assert_eq!(get(&app, "/a/a3").code(), 404);
    assert_eq!(get(&app, "/../").code(), 403);
    assert_eq!(get(&app, "/a/../a/a2").text(), "A2");
}

#[test]
fn test_traversal_never_serves_outside_root() {
    let outer = tempfile::tempdir().unwrap();
    write(outer.path(), "secret", "top secret");
    write(outer.path(), "public/index.html", "<h1>hi</h1>");

    let app = app(Static::new(outer.path().join("public")));
    let res = get(&app, "/../secret");
    assert_eq!(res.code(), 403);
    assert!(!res.text().contains("top secret"));
    assert_eq!(get(&app, "/").text(), "<h1>hi</h1>");
}

#[test]
fn test_directory_without_default_document() {
    let dir = static_tree();
    let app = app(Static::new(dir.path()).with_default_document(None));
    assert_eq!(get(&app, "/a").code(), 404);

    let missing = common::harness::app(Static::new(dir.path()));
    assert_eq!(get(&missing, "/a").code(), 404);
}

#[test]
fn test_file_headers() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "style.css", "body {}");
    let app = app(Static::new(dir.path()));

    let res = get(&app, "/style.css");
    assert_eq!(res.header("content-type"), Some("text/css"));
    assert_eq!(res.header("content-length"), Some("7"));
    assert!(res.header("last-modified").is_some_and(|v| v.ends_with("GMT")));
    assert_eq!(res.text(), "body {}");
}

#[test]
fn test_static_serves_any_verb() {
    let dir = static_tree();
    let app = app(Static::new(dir.path()));
    assert_eq!(call(&app, RawRequest::new("POST", "/b")).text(), "B");
}

#[test]
fn test_static_mounted_under_controller() {
    let dir = static_tree();
    let app = app(Controller::new().mount("assets", Static::new(dir.path())));

    assert_eq!(get(&app, "/assets/a/a2").text(), "A2");
    assert_eq!(get(&app, "/assets/../b").code(), 403);
    assert_eq!(get(&app, "/other").code(), 404);
}

#[test]
fn test_large_file_is_streamed_whole() {
    let dir = tempfile::tempdir().unwrap();
    let contents = "0123456789abcdef".repeat(3000);
    write(dir.path(), "big.txt", &contents);
    let app = app(Static::new(dir.path()));

    let res = get(&app, "/big.txt");
    assert_eq!(res.body.len(), contents.len());
    assert_eq!(res.header("content-length"), Some("48000"));
    assert_eq!(res.text(), contents);
}
