//! Stocks Core: market-data ingestion, normalization and the merge store.
//!
//! This crate contains the whole download pipeline:
//! - Domain types (symbols, intervals, price records)
//! - Date and ticker-set resolution
//! - Provider abstraction and the Yahoo Finance chart provider
//! - Batch fetching with per-batch failure isolation
//! - Schema normalization of multi-symbol provider tables
//! - Per-symbol merge store with atomic persistence
//! - Workspace configuration

pub mod config;
pub mod data;
pub mod domain;
