// Library root: re-exports all modules so the CLI and integration tests can
// access the crate's public API.

pub mod config;
pub mod model;
pub mod purge;
pub mod recovery;
pub mod rehydrate;
pub mod resume;
pub mod session;
pub mod snapshot;
pub mod store;
