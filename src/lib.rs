//! amlwatch: ingests anti-money-laundering enforcement news into SQLite.
//!
//! A cycle walks the [`source`] registry, retrieves each source through a
//! [`fetch`] adapter, [`normalize`]s the entries, inserts new articles into
//! the [`storage`] layer (deduplicated by URL) and runs an [`extract`]or
//! over every article that was actually new. [`ingest`] owns cycles and
//! their exclusivity; [`api`] serves the stored data over HTTP.

pub mod api;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod ingest;
pub mod normalize;
pub mod source;
pub mod storage;
pub mod util;
