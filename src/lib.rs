#![doc = "po-ingest: ledger-driven ingestion of purchase-order archives."]

//! Reconciles a bucket against a persisted processing ledger: newly arrived
//! zip archives are downloaded, their mapping file is read, and every
//! attachment it names is republished under `by-po/<po number>/<file name>`.
//!
//! # Layout
//! - [`synchronise`]: the pipeline orchestrator
//! - [`ledger`], [`listing`], [`extract`], [`mapping`], [`republish`]: its stages
//! - [`contract`]: the [`contract::ObjectStore`] seam, with [`s3`] and [`memory`] behind it
//! - [`codec`]: schema-driven delimited-text codec shared by the ledger and mapping file
//! - [`cli`], [`load_config`]: binary glue

pub mod cli;
pub mod codec;
pub mod config;
pub mod contract;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod listing;
pub mod load_config;
pub mod mapping;
pub mod memory;
pub mod republish;
pub mod s3;
pub mod staging;
pub mod synchronise;

#[cfg(test)]
mod test_support;

pub use cli::{run, Cli, Commands};
pub use error::IngestError;
