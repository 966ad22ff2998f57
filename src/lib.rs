//! Library exports for dashgate, shared between the binary and tests.

pub mod backend;
pub mod config;
pub mod proxy;
pub mod routes;
pub mod session;
pub mod startup;
pub mod state;
pub mod utils;
