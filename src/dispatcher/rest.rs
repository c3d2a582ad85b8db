use super::core::{invoke, Dispatch, Member, Members};
use crate::action::Action;
use crate::context::RequestContext;
use crate::status::{HandlerResult, HttpStatus};
use std::sync::Arc;
use tracing::debug;

/// A controller whose default handler is chosen by HTTP method.
///
/// A head segment naming a member dispatches to it as in
/// [`super::Controller`]. Otherwise the member named after the lower-cased
/// request method receives all segments, and a missing one answers
/// `405 Method Not Allowed`.
#[derive(Clone, Default)]
pub struct RestController {
    members: Members,
}

impl RestController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action; name it after a method (`get`, `put`, ...) to make
    /// it the handler for that verb.
    #[must_use]
    pub fn action(mut self, name: &str, action: Action) -> Self {
        self.members.insert(&name.to_ascii_lowercase(), Member::Action(action));
        self
    }

    #[must_use]
    pub fn mount<D: Dispatch + 'static>(mut self, name: &str, child: D) -> Self {
        self.members.insert(name, Member::Controller(Arc::new(child)));
        self
    }

    #[must_use]
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }
}

impl Dispatch for RestController {
    fn dispatch(&self, ctx: &RequestContext, segments: &[String]) -> HandlerResult {
        if let Some((head, tail)) = segments.split_first() {
            if let Some(member) = self.members.get(head) {
                debug!(request_id = %ctx.id(), member = %head, "RestController resolved member");
                return invoke(ctx, Some(member), tail);
            }
        }
        let method = ctx.method();
        match self.members.get(method) {
            Some(member) => {
                debug!(request_id = %ctx.id(), method = %method, "RestController resolved verb");
                invoke(ctx, Some(member), segments)
            }
            None => Err(HttpStatus::method_not_allowed().into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action;
    use crate::body::Body;
    use crate::config::Settings;
    use crate::server::request::RawRequest;
    use crate::status::HandlerError;

    fn ctx(method: &str) -> RequestContext {
        RequestContext::with_settings(RawRequest::new(method, "/"), Arc::new(Settings::default()))
    }

    fn segs(path: &[&str]) -> Vec<String> {
        path.iter().map(|s| s.to_string()).collect()
    }

    fn biscuits() -> RestController {
        RestController::new()
            .action(
                "get",
                action::text().optional(1).handler(|_, args| {
                    Ok(Body::from(format!("get {}", args.get(0).unwrap_or("all"))))
                }),
            )
            .action(
                "put",
                action::text().params(1).handler(|_, args| Ok(Body::from(format!("put {}", &args[0])))),
            )
    }

    fn text(result: HandlerResult) -> String {
        match result {
            Ok(Body::Text(s)) => s,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_verb_selects_handler() {
        let rest = biscuits();
        assert_eq!(text(rest.dispatch(&ctx("GET"), &[])), "get all");
        assert_eq!(text(rest.dispatch(&ctx("GET"), &segs(&["3"]))), "get 3");
        assert_eq!(text(rest.dispatch(&ctx("PUT"), &segs(&["3"]))), "put 3");
    }

    #[test]
    fn test_missing_verb_is_405() {
        match biscuits().dispatch(&ctx("DELETE"), &segs(&["3"])) {
            Err(HandlerError::Status(s)) => assert_eq!(s.code(), 405),
            other => panic!("expected 405, got {other:?}"),
        }
    }

    #[test]
    fn test_named_member_wins_over_verb() {
        let rest = RestController::new()
            .action("get", action::text().variadic().handler(|_, _| Ok(Body::from("verb"))))
            .mount("biscuits", biscuits());
        assert_eq!(text(rest.dispatch(&ctx("GET"), &segs(&["biscuits", "9"]))), "get 9");
        assert_eq!(text(rest.dispatch(&ctx("GET"), &segs(&["cookies"]))), "verb");
    }
}
