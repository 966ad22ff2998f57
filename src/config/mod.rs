//! Service configuration: the versioned file format, cookie settings and logging.

pub mod cookies;
pub mod logging;
pub mod types;

pub use cookies::*;
pub use logging::*;
pub use types::*;
