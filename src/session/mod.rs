//! Per-request session state: the inbound cookie jar and the two token cookies.

pub mod context;
pub mod cookie_store;

pub use context::RequestContext;
pub use cookie_store::CookieStore;
