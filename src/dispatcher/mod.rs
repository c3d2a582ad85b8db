//! # Dispatcher Module
//!
//! Resolves a slash-delimited path against a tree of controllers and invokes
//! the matched action.
//!
//! ## Overview
//!
//! Controllers compose by name: each holds an explicit table of members
//! (actions and child dispatchers) built once at startup and shared
//! read-only afterwards. Per request the path segments flow down the tree:
//!
//! 1. The head segment selects a member; with no head, or a head that names
//!    nothing, the default action receives every segment.
//! 2. The action's contract is checked: arity, verb, form guards.
//! 3. Response encoding and content type are applied, query keywords bound,
//!    and the handler invoked.
//!
//! A member that is itself a dispatcher receives the remaining segments and
//! repeats the algorithm.
//!
//! ## Flavours
//!
//! - [`Controller`]: name lookup with an `index` fallback
//! - [`RestController`]: falls back to the member named after the HTTP method
//! - [`RegexRouteController`]: ordered regular expressions; captures become
//!   arguments
//! - [`JsonPatchController`]: runs a `PATCH` batch as sub-requests
//! - [`crate::static_files::Static`]: serves files from a directory
//!
//! ```rust
//! use brrtweb::action;
//! use brrtweb::body::Body;
//! use brrtweb::dispatcher::{Controller, RestController};
//!
//! let pets = RestController::new()
//!     .action("get", action::json().optional(1).handler(|_ctx, args| {
//!         Ok(serde_json::json!({ "id": args.get(0) }).into())
//!     }));
//! let root = Controller::new()
//!     .action("index", action::text().handler(|_, _| Ok(Body::from("home"))))
//!     .mount("pets", pets);
//! # let _ = root;
//! ```

mod core;
mod jsonpatch;
mod regex_routes;
mod rest;

pub use core::{serve_handler, validate_handler, Controller, Dispatch, Member};
pub use jsonpatch::{JsonPatchController, PatchOperation};
pub use regex_routes::RegexRouteController;
pub use rest::RestController;
