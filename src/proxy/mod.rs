//! The authenticated relay: forward, refresh on 401, retry once, or send the browser to login.

pub mod orchestrator;
pub mod state;

pub use orchestrator::{login_location, ProxyError, ProxyOrchestrator, ProxyOutcome};
pub use state::{transition, ProxyAction, ProxyEvent, ProxyState};
