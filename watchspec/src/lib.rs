#![cfg_attr(docsrs, feature(doc_cfg))]
//! # watchspec
//!
//! A declarative conformance-test interpreter for change streams.
//!
//! watchspec loads JSON spec files describing change stream scenarios, runs
//! each scenario against a store client, and checks the change documents it
//! read, the error it raised and the commands it sent against the declared
//! expectations.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use watchspec::{SpecFile, SpecRunner, memory::MemoryServer};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> watchspec::Result {
//!     let file = SpecFile::from_path("fixtures/change-streams.json")?;
//!     let server = MemoryServer::new();
//!
//!     let report = SpecRunner::new(server.connector()).run_file(&file).await?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```
//!
//! ## How a scenario runs
//!
//! 1. A fresh client is connected and a [`monitoring::EventLog`] attached to it.
//! 2. A change stream is opened on the scenario's target. Opening is lazy.
//! 3. On one task, the stream is drained for the expected number of changes
//!    while the scripted operations run on the administrative client after a
//!    settle delay ([`Config::settle_delay`]).
//! 4. The outcome and the recorded commands are checked with [`verify()`],
//!    using the partial matching rules of [`matcher`].
//!
//! ## Core Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SpecFile`] | A loaded and validated spec file |
//! | [`TestCase`] | One scenario: target, pipeline, operations, expectations |
//! | [`SpecRunner`] | Runs spec files and reports every case |
//! | [`StoreClient`] | The client interface scenarios run against |
//! | [`ChangeStream`] | A sequential feed of change documents |
//! | [`StoreError`] | An error reported by the store, passed through verbatim |
//! | [`Error`] | Verification and loading failures |
//!
//! ## Features
//!
//! - **`memory-store`** (default) - In-memory reference store implementing the client traits
//! - **`recorder`** - Built-in `Recorder` monitor writing commands to JSON Lines files
//!
//! ## Examples
//!
//! - `memory-suite.rs` - Runs the bundled fixture against the in-memory store

mod client;
mod config;
mod error;
mod store_error;

pub mod drain;
pub mod matcher;
pub mod monitoring;
pub mod monitors;
pub mod operation;
pub mod requirements;
pub mod runner;
pub mod scenario;
pub mod spec_file;
pub mod verify;

#[cfg(feature = "memory-store")]
#[cfg_attr(docsrs, doc(cfg(feature = "memory-store")))]
pub mod memory;

pub use client::{
    ChangeStream, Collection, ServerInfo, StoreClient, StoreConnector, Topology, WatchScope,
};
pub use config::Config;
pub use drain::drain;
pub use error::Error;
pub use operation::{Operation, OperationKind};
pub use runner::{CaseResult, SpecRunner, SuiteReport};
pub use scenario::{Outcome, RunContext, run_scenario};
pub use spec_file::{ExpectedOutcome, SpecFile, Target, TestCase};
pub use store_error::{StoreError, StoreResult};
pub use verify::verify;

/// A JSON object: commands, filters, change documents.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Convenience alias for `Result<T, watchspec::Error>`.
pub type Result<T = ()> = std::result::Result<T, Error>;
