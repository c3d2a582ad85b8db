//! # brrtweb
//!
//! **brrtweb** is an object-dispatch web framework for Rust: requests are
//! resolved against a tree of controllers, the matched handler is checked
//! against its declared contract, and whatever it produces is streamed back
//! through a response pipeline that maps failures to HTTP statuses.
//!
//! ## Overview
//!
//! Handlers never receive the raw transport request. They receive a
//! per-request [`context::RequestContext`] that parses the query string,
//! form and cookies lazily, collects response headers and cookies, and is
//! reachable from anywhere on the request's thread through
//! [`context::current`].
//!
//! ## Architecture
//!
//! - **[`context`]** - Per-request state, memoized request facts and the
//!   coroutine-local context stack
//! - **[`action`]** - Handler descriptors: verbs, arity, encoding, content
//!   type, form guards, and the `etag`/`chunked`/`json` wrappers
//! - **[`dispatcher`]** - Controller trees: name lookup, REST verbs, regex
//!   routes and JSON Patch batches
//! - **[`application`]** - The request/response pipeline and its hooks
//! - **[`validator`]** - Declarative form and query field validation
//! - **[`static_files`]** - A controller serving files from a directory
//! - **[`status`]** - HTTP conditions and the handler error type
//! - **[`cookies`]** - Request cookie parsing and `Set-Cookie` values
//! - **[`config`]** - Settings loaded from YAML/TOML and the environment
//! - **[`server`]** - Raw request/response types and the `may_minihttp`
//!   transport adapter
//! - **[`cli`]** - The `brrtweb` binary
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as HttpServer<br/>(may_minihttp)
//!     participant App as Application
//!     participant Ctx as RequestContext
//!     participant Tree as Controller tree
//!     participant Handler as Action
//!
//!     Client->>Server: GET /pets/12/
//!     Server->>App: handle(RawRequest)
//!     App->>Ctx: create + enter
//!     App->>App: begin_request hook
//!     App->>Tree: dispatch(["pets", "12"])
//!     Tree->>Tree: resolve member, check arity/verb/form
//!     Tree->>Handler: call(ctx, args)
//!     Handler-->>App: Body or HandlerError
//!     App->>App: pull first chunk
//!     alt HTTP condition
//!         App->>App: render status body
//!     end
//!     App->>App: begin_response hook, Set-Cookie headers
//!     App-->>Server: status + headers + lazy body
//!     Server-->>Client: HTTP response
//!     App->>Ctx: end_response hook + exit
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brrtweb::action;
//! use brrtweb::application::Application;
//! use brrtweb::body::Body;
//! use brrtweb::config::Settings;
//! use brrtweb::dispatcher::Controller;
//! use brrtweb::server::RawRequest;
//!
//! let root = Controller::new().action(
//!     "index",
//!     action::text().params(2).handler(|_ctx, args| {
//!         Ok(Body::from(format!("{}, {}", &args[0], &args[1])))
//!     }),
//! );
//! let app = Application::new(root).settings(Settings::default());
//!
//! let response = app.handle(RawRequest::new("GET", "/1/2/")).unwrap();
//! assert_eq!(response.status(), "200 OK");
//! assert_eq!(response.collect().unwrap(), b"1, 2");
//! ```
//!
//! ## Runtime Considerations
//!
//! The transport runs on the `may` coroutine runtime. Each request is
//! handled start to finish on one coroutine. The context stack is
//! coroutine-local, so a handler may sleep or block on IO through `may`
//! without another request observing its context.
//! Coroutine stack size comes from [`config::Settings::stack_size`]
//! (`BRRTWEB_STACK_SIZE`).

pub mod action;
pub mod application;
pub mod body;
pub mod cli;
pub mod config;
pub mod context;
pub mod cookies;
pub mod dispatcher;
pub mod ids;
pub mod server;
pub mod static_files;
pub mod status;
pub mod validator;

pub use application::{Application, Hooks, UnhandledError};
pub use context::RequestContext;
pub use dispatcher::{Controller, Dispatch, RestController};
pub use status::{HandlerError, HandlerResult, HttpStatus};
