#![forbid(unsafe_code)]

//! Plain HTTP/1.1 client used to drive workload requests.
//!
//! Only `http://` targets are supported. Every response carries estimated wire byte counts so
//! callers can account for traffic without hooking the connection.

mod client;
mod error;
mod estimate;
mod types;
mod util;

pub use client::HttpClient;
pub use error::{Error, HttpTransportErrorKind, Result};
pub use estimate::estimate_http_request_bytes;
pub use types::{HttpRequest, HttpResponse};
