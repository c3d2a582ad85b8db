//! Transport-facing types: the raw request handed in, the committed
//! response handed out, and the `may_minihttp` adapter between them.

pub mod headers;
pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use headers::Headers;
pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_cookies, parse_query_string, RawRequest};
pub use response::{Response, ResponseBody};
pub use service::{raw_request, AppService};
