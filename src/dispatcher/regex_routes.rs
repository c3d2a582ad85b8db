use super::core::{invoke, Dispatch, Member};
use crate::action::Action;
use crate::context::RequestContext;
use crate::status::{HandlerResult, HttpStatus};
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Routes the remaining path by regular expression.
///
/// Routes are tried in registration order against `"/seg1/seg2/..."`; the
/// first pattern that matches at the start of the path wins and its capture
/// groups become the handler's positional arguments (groups that did not
/// participate are left out). No match answers `404 Not Found`.
#[derive(Clone, Default)]
pub struct RegexRouteController {
    routes: Vec<(Regex, Member)>,
}

impl RegexRouteController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route handled by an action.
    #[must_use]
    pub fn route(mut self, pattern: Regex, action: Action) -> Self {
        self.routes.push((pattern, Member::Action(action)));
        self
    }

    /// Add a route handled by a nested dispatcher; captures become its
    /// segments.
    #[must_use]
    pub fn route_to<D: Dispatch + 'static>(mut self, pattern: Regex, child: D) -> Self {
        self.routes.push((pattern, Member::Controller(Arc::new(child))));
        self
    }

    /// Compile `pattern` and add an action route.
    ///
    /// # Errors
    ///
    /// Returns the regex compilation error.
    pub fn try_route(self, pattern: &str, action: Action) -> Result<Self, regex::Error> {
        Ok(self.route(Regex::new(pattern)?, action))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Dispatch for RegexRouteController {
    fn dispatch(&self, ctx: &RequestContext, segments: &[String]) -> HandlerResult {
        let path = format!("/{}", segments.join("/"));
        for (index, (pattern, member)) in self.routes.iter().enumerate() {
            let Some(captures) = pattern.captures(&path) else {
                continue;
            };
            if captures.get(0).map_or(true, |m| m.start() != 0) {
                continue;
            }
            let args: Vec<String> = captures
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str().to_string())
                .collect();
            debug!(request_id = %ctx.id(), path = %path, route = index, args = args.len(), "Regex route matched");
            return invoke(ctx, Some(member), &args);
        }
        debug!(request_id = %ctx.id(), path = %path, "No regex route matched");
        Err(HttpStatus::not_found().into())
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

    fn ctx() -> RequestContext {
        RequestContext::with_settings(RawRequest::new("GET", "/"), Arc::new(Settings::default()))
    }

    fn segs(path: &[&str]) -> Vec<String> {
        path.iter().map(|s| s.to_string()).collect()
    }

    fn routes() -> RegexRouteController {
        RegexRouteController::new()
            .try_route(
                r"/installations/(?P<id>\d+)/devices/(\d+)$",
                action::text().params(2).handler(|_, args| {
                    Ok(Body::from(format!("device {} of {}", &args[1], &args[0])))
                }),
            )
            .unwrap()
            .try_route(
                r"/installations(?:/(\d+))?$",
                action::text().optional(1).handler(|_, args| {
                    Ok(Body::from(format!("installations {}", args.len())))
                }),
            )
            .unwrap()
    }

    fn text(result: HandlerResult) -> String {
        match result {
            Ok(Body::Text(s)) => s,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_captures_become_arguments() {
        let r = routes();
        assert_eq!(
            text(r.dispatch(&ctx(), &segs(&["installations", "4", "devices", "7"]))),
            "device 7 of 4"
        );
    }

    #[test]
    fn test_unmatched_optional_group_is_omitted() {
        let r = routes();
        assert_eq!(text(r.dispatch(&ctx(), &segs(&["installations"]))), "installations 0");
        assert_eq!(text(r.dispatch(&ctx(), &segs(&["installations", "2"]))), "installations 1");
    }

    #[test]
    fn test_match_must_start_at_root() {
        let r = RegexRouteController::new()
            .try_route("devices", action::text().handler(|_, _| Ok(Body::from("x"))))
            .unwrap();
        match r.dispatch(&ctx(), &segs(&["installations", "devices"])) {
            Err(HandlerError::Status(s)) => assert_eq!(s.code(), 404),
            other => panic!("expected 404, got {other:?}"),
        }
    }

    #[test]
    fn test_no_match_is_404() {
        match routes().dispatch(&ctx(), &segs(&["nothing"])) {
            Err(HandlerError::Status(s)) => assert_eq!(s.code(), 404),
            other => panic!("expected 404, got {other:?}"),
        }
    }
}
