mod common;

use brrtweb::action;
use brrtweb::body::Body;
use brrtweb::dispatcher::{Controller, JsonPatchController, RestController};
use brrtweb::server::RawRequest;
use brrtweb::HttpStatus;
use common::harness::*;
use serde_json::{json, Value};

fn form_echo() -> brrtweb::Application {
    app(Controller::new().action(
        "index",
        action::json().handler(|ctx, _| {
            let form = ctx.form()?.borrow().clone();
            let files: Vec<Value> = ctx
                .files()?
                .iter()
                .map(|f| json!({"field": f.field, "name": f.filename, "text": f.text()}))
                .collect();
            Ok(Body::Value(json!({"form": form, "files": files})))
        }),
    ))
}

fn json_of(res: &common::harness::Outcome) -> Value {
    serde_json::from_slice(&res.body).unwrap()
}

#[test]
fn test_urlencoded_form() {
    let res = call(
        &form_echo(),
        RawRequest::new("POST", "/").form_body(&[("a", "1"), ("b", ""), ("a", "2")]),
    );
    assert_eq!(json_of(&res)["form"], json!({"a": ["1", "2"], "b": ""}));
}

#[test]
fn test_json_form() {
    let res = call(
        &form_echo(),
        RawRequest::new("POST", "/").json_body(&json!({"nested": {"x": [1, 2]}})),
    );
    assert_eq!(json_of(&res)["form"], json!({"nested": {"x": [1, 2]}}));

    let res = call(
        &form_echo(),
        RawRequest::new("POST", "/").body("application/json", "{not json"),
    );
    assert_eq!(res.code(), 400);
}

#[test]
fn test_multipart_form_with_file() {
    let body = "--b0und\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\r\n\
Holiday\r\n\
--b0und\r\n\
Content-Disposition: form-data; name=\"notes\"; filename=\"notes.txt\"\r\n\
Content-Type: text/plain\r\n\r\n\
line one\r\n\
--b0und--\r\n";
    let res = call(
        &form_echo(),
        RawRequest::new("POST", "/").body("multipart/form-data; boundary=b0und", body),
    );
    assert_eq!(res.code(), 200);
    let out = json_of(&res);
    assert_eq!(out["form"]["title"], json!("Holiday"));
    assert_eq!(out["form"]["notes"]["filename"], json!("notes.txt"));
    assert_eq!(
        out["files"],
        json!([{"field": "notes", "name": "notes.txt", "text": "line one"}])
    );
}

fn patchable() -> brrtweb::Application {
    let items = RestController::new()
        .action(
            "get",
            action::json()
                .params(1)
                .keyword("fields", "all")
                .handler(|_, args| {
                    Ok(Body::Value(json!({
                        "id": &args[0],
                        "fields": args.keyword("fields").cloned().unwrap_or(Value::Null),
                    })))
                }),
        )
        .action(
            "put",
            action::text()
                .params(1)
                .handler(|ctx, args| {
                    let form = ctx.form()?.borrow().clone();
                    Ok(Body::from(format!("{} <- {}", &args[0], form["name"].as_str().unwrap_or("?"))))
                }),
        )
        .action(
            "delete",
            action::text()
                .params(1)
                .handler(|_, _| Err(HttpStatus::forbidden().into())),
        );
    app(JsonPatchController::new(Controller::new().mount("items", items)))
}

#[test]
fn test_json_patch_batch() {
    let ops = json!([
        {"op": "get", "path": "/items/1?fields=name"},
        {"op": "put", "path": "/items/2", "value": {"name": "lamp"}},
    ]);
    let res = call(&patchable(), RawRequest::new("PATCH", "/").json_body(&ops));
    assert_eq!(res.code(), 200);
    assert_eq!(res.header("content-type"), Some("application/json; charset=utf-8"));
    assert_eq!(
        json_of(&res),
        json!([{"id": "1", "fields": "name"}, "2 <- lamp"])
    );
}

#[test]
fn test_json_patch_failure_aborts_batch() {
    let ops = json!([
        {"op": "put", "path": "/items/2", "value": {"name": "lamp"}},
        {"op": "delete", "path": "/items/2"},
    ]);
    let res = call(&patchable(), RawRequest::new("PATCH", "/").json_body(&ops));
    assert_eq!(res.code(), 403);
}

#[test]
fn test_non_batch_requests_pass_through() {
    let app = patchable();
    assert_eq!(json_of(&get(&app, "/items/5"))["id"], json!("5"));
    // a PATCH whose form is not an array reaches the tree as is
    let res = call(
        &app,
        RawRequest::new("PATCH", "/items/5").json_body(&json!({"name": "x"})),
    );
    assert_eq!(res.code(), 405);
}
