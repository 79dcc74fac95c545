//! Fetcher - Incremental mirroring of remote log directories
//!
//! Watches a set of remote prefixes through a storage backend and keeps a
//! local mirror current, downloading only objects that are unseen or
//! strictly newer than the last observed modification time.

mod fetch;
mod state;

pub use fetch::{FetchReport, Fetcher};
pub use state::FetchState;
