//! Operator front-end for the sitemap indexer.
//!
//! Wires the engine to file-backed sources, an SQLite checkpoint store, a
//! JSONL registration sink and a JSONL validation audit log.

pub mod audit;
pub mod cli;
pub mod sources;
