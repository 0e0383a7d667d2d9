//! Switchboard fan-out pipeline.
//!
//! This crate owns everything between intake and the downstream platforms:
//!
//! - [`Store`] - SQLite persistence for events, jobs, registries, revenue
//! - [`Queue`] - durable work queue with leased batch dequeue and backoff
//! - [`Router`] - cached routing rules resolving events to platform targets
//! - [`Validator`] - the intake gate (honeypot, bot registry, email cache)
//! - [`adapters`] - per-platform delivery contracts behind one trait
//! - [`Linker`] - purchase → prior lead attribution carry-over
//! - [`Processor`] - intake orchestration and job execution
//! - [`Worker`] - the long-running fan-out loop
//!
//! # Architecture
//!
//! ```text
//! [HTTP intake] → Processor → Validator → Store ⇒ Linker ⇒ Router ⇒ Queue
//!                                                                     ↓
//! [Worker] → Queue.lease_batch → Processor.execute_job → Adapter.send
//! ```
//!
//! The store is the source of truth; the in-memory ready index is a hint.

pub mod adapters;
mod error;
pub mod index;
pub mod linker;
pub mod processor;
pub mod queue;
pub mod router;
pub mod store;
pub mod validator;
pub mod worker;

pub use error::{Error, Result};
pub use index::ReadyIndex;
pub use linker::Linker;
pub use processor::{IntakeOutcome, JobOutcome, Processor};
pub use queue::Queue;
pub use router::Router;
pub use store::Store;
pub use validator::{Validator, ValidatorConfig, Verdict};
pub use worker::{Worker, WorkerConfig};
