//! # Request Context
//!
//! Per-request state: the raw request, lazily parsed request facts (method,
//! query, form, cookies) and the response in progress (headers, encoding,
//! outgoing cookies).
//!
//! Handlers receive the context explicitly. It is also pushed onto a
//! coroutine-local stack for the duration of the request, so code deep in a
//! call chain can reach it with [`current`]. Nested [`enter`] calls behave
//! as a stack and restore the previous context when their guard drops.
//!
//! ```rust
//! use brrtweb::context::{self, RequestContext};
//! use brrtweb::server::RawRequest;
//!
//! let ctx = RequestContext::new(RawRequest::new("GET", "/items?page=2"));
//! let _guard = context::enter(&ctx);
//! let current = context::current().unwrap();
//! assert_eq!(current.method(), "get");
//! assert_eq!(current.query().borrow()["page"], "2");
//! ```

mod caching;
mod core;
mod form;
mod stack;

pub use core::{RequestContext, Shared};
pub use form::UploadedFile;
pub use stack::{current, depth, enter, ContextError, ContextGuard};
