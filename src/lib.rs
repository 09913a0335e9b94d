//! Indexing core for a JSON-wire-compatible full-text search engine.
//!
//! An [`Index`](index::Index) is a fixed ring of [`PrimaryShard`]s, each
//! routed to by `hash(docID) mod N` ([`hash::route`]). A primary shard owns
//! a durable [`Wal`](wal::Wal) and an ordered, append-only list of
//! second-tier shards, each backed by a [`SegmentWriter`](segment::SegmentWriter)
//! wrapping a simplified inverted index. The [`Document Pipeline`](pipeline)
//! flattens, infers/validates mapping, and coerces every incoming document
//! before it's durably logged and indexed; the [`Registry`](registry::Registry)
//! owns the set of open indexes for one engine instance; [`bulk`] implements
//! the NDJSON wire protocol on top of it.
//!
//! Object storage, the metadata key-value store, and text analysis are
//! modeled as external-collaborator contracts ([`storage::StorageBackend`],
//! [`metadata_store::MetadataStore`], [`analyzer::AnalyzerRegistry`]) with a
//! disk-backed reference implementation of each, standing in for the real
//! engine's S3/MinIO drivers, embedded metadata store, and tokenizer
//! pipeline.

pub mod analyzer;
pub mod bulk;
pub mod config;
pub mod error;
pub mod hash;
pub mod index;
pub mod json_value;
pub mod mapping;
pub mod metadata_store;
pub mod pipeline;
pub mod posting;
pub mod registry;
pub mod segment;
pub mod shard;
pub mod stats;
pub mod storage;
pub mod wal;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use index::Index;
pub use registry::Registry;
