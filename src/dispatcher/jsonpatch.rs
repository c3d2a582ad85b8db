//! Batch sub-dispatch of JSON Patch style documents.

use super::core::Dispatch;
use crate::application::split_segments;
use crate::body::Body;
use crate::context::{self, RequestContext};
use crate::status::{HandlerError, HandlerResult, HttpStatus};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// One operation of a batch.
#[derive(Debug, Clone, Deserialize)]
pub struct PatchOperation {
    /// HTTP method the operation is dispatched with (any case)
    pub op: String,
    /// Target relative to the wrapped dispatcher; may carry a `?query`
    pub path: String,
    /// Form of the sub-request; `{}` when absent or null
    #[serde(default)]
    pub value: Value,
}

/// Wraps a dispatcher so that a `PATCH` whose form is an array of
/// `{op, path, value}` documents runs each document as its own request.
///
/// Every operation gets a derived [`RequestContext`] with its own method,
/// path, query and form, entered for the duration of the operation. The
/// response is a JSON array holding each operation's result: parsed as
/// JSON when it is JSON, as a string otherwise. The first failing
/// operation aborts the batch with its error. Anything else is passed to
/// the wrapped dispatcher unchanged.
#[derive(Clone)]
pub struct JsonPatchController {
    inner: Arc<dyn Dispatch>,
}

impl JsonPatchController {
    pub fn new<D: Dispatch + 'static>(inner: D) -> Self {
        Self { inner: Arc::new(inner) }
    }

    fn run_operation(&self, ctx: &RequestContext, index: usize, operation: PatchOperation) -> Result<Value, HandlerError> {
        let form = if operation.value.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            operation.value
        };
        let sub = ctx.derive(&operation.op.to_ascii_uppercase(), &operation.path, form);
        let _guard = context::enter(&sub);
        let segments = split_segments(&sub.path());
        debug!(
            request_id = %ctx.id(),
            operation = index,
            method = %sub.method(),
            segments = ?segments,
            "Dispatching patch operation"
        );

        let mut raw = Vec::new();
        for chunk in self.inner.dispatch(&sub, &segments)?.into_chunks()? {
            raw.extend(sub.encode_response(chunk?)?);
        }
        Ok(serde_json::from_slice(&raw)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&raw).into_owned())))
    }
}

impl Dispatch for JsonPatchController {
    fn dispatch(&self, ctx: &RequestContext, segments: &[String]) -> HandlerResult {
        if ctx.method() != "patch" {
            return self.inner.dispatch(ctx, segments);
        }
        let operations = {
            let form = ctx.form()?;
            let form = form.borrow();
            if !form.is_array() {
                drop(form);
                return self.inner.dispatch(ctx, segments);
            }
            Vec::<PatchOperation>::deserialize(&*form).map_err(|err| {
                HttpStatus::bad_request().with_info(format!("Invalid patch document: {err}"))
            })?
        };

        let mut results = Vec::with_capacity(operations.len());
        for (index, operation) in operations.into_iter().enumerate() {
            match self.run_operation(ctx, index, operation) {
                Ok(value) => results.push(value),
                Err(err) => {
                    warn!(request_id = %ctx.id(), operation = index, error = %err, "Patch batch aborted");
                    return Err(err);
                }
            }
        }

        ctx.set_response_encoding(Some("utf-8"));
        ctx.set_response_content_type(Some("application/json"));
        Ok(Body::Text(serde_json::to_string(&Value::Array(results))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action;
    use crate::config::Settings;
    use crate::dispatcher::RestController;
    use crate::server::request::RawRequest;
    use serde_json::json;

    fn biscuits() -> RestController {
        RestController::new()
            .action(
                "put",
                action::json().optional(1).handler(|ctx, args| {
                    let mut result = ctx.form()?.borrow().clone();
                    result["id"] = args.get(0).map_or(Value::Null, |id| json!(id));
                    result["a"] = ctx.query().borrow().get("a").cloned().unwrap_or(Value::Null);
                    Ok(Body::Value(result))
                }),
            )
            .action(
                "get",
                action::json().optional(1).handler(|ctx, args| {
                    let mut result = ctx.form()?.borrow().clone();
                    result["id"] = args.get(0).map_or(Value::Null, |id| json!(id));
                    Ok(Body::Value(result))
                }),
            )
            .action(
                "error",
                action::json().handler(|_, _| Err(HandlerError::internal("boom"))),
            )
    }

    fn controller() -> JsonPatchController {
        JsonPatchController::new(
            RestController::new()
                .action("get", action::text().handler(|_, _| Ok(Body::stream(["hey"]))))
                .mount("biscuits", biscuits()),
        )
    }

    fn patch(target: &str, operations: Value) -> RequestContext {
        RequestContext::with_settings(
            RawRequest::new("PATCH", target).json_body(&operations),
            Arc::new(Settings::default()),
        )
    }

    fn run(ctx: &RequestContext) -> Value {
        match controller().dispatch(ctx, &[]) {
            Ok(Body::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_batch_results() {
        let ctx = patch(
            "/",
            json!([
                {"op": "get", "path": "/"},
                {"op": "put", "path": "biscuits/1", "value": {"name": "Ginger Nut"}},
                {"op": "GET", "path": "biscuits/2", "value": {"name": "Ginger Nut"}},
            ]),
        );
        let result = run(&ctx);
        assert_eq!(result[0], json!("hey"));
        assert_eq!(result[1]["name"], json!("Ginger Nut"));
        assert_eq!(result[1]["id"], json!("1"));
        assert_eq!(result[2]["id"], json!("2"));
        assert_eq!(ctx.response_content_type().as_deref(), Some("application/json"));
        assert_eq!(
            ctx.response_headers().get("content-type"),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(context::depth(), 0);
    }

    #[test]
    fn test_query_is_per_operation() {
        let ctx = patch(
            "/?a=10",
            json!([
                {"op": "get", "path": "/"},
                {"op": "PUT", "path": "biscuits/1?a=1", "value": {"name": "Ginger Nut"}},
                {"op": "put", "path": "biscuits/2", "value": {"name": "Ginger Nut"}},
            ]),
        );
        let result = run(&ctx);
        assert_eq!(result[1]["a"], json!("1"));
        assert_eq!(result[2]["a"], Value::Null);
    }

    #[test]
    fn test_failing_operation_aborts_batch() {
        let ctx = patch(
            "/",
            json!([
                {"op": "put", "path": "biscuits/1", "value": {"name": "Ginger Nut"}},
                {"op": "error", "path": "biscuits", "value": null},
            ]),
        );
        assert!(matches!(controller().dispatch(&ctx, &[]), Err(HandlerError::Internal(_))));
        assert_eq!(context::depth(), 0);
    }

    #[test]
    fn test_other_methods_pass_through() {
        let ctx = RequestContext::with_settings(RawRequest::new("GET", "/"), Arc::new(Settings::default()));
        match controller().dispatch(&ctx, &[]) {
            Ok(body) => {
                let chunks: Vec<_> = body.into_chunks().unwrap().map(Result::unwrap).collect();
                assert_eq!(chunks.len(), 1);
            }
            Err(err) => panic!("unexpected {err}"),
        }
    }
}
