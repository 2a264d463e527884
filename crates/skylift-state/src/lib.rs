//! skylift-state — deployment record store.
//!
//! Records are JSON-serialized into a redb table keyed by deployment id.
//! The database always uses redb's in-memory backend: the store is created
//! when the process starts and discarded when it exits, so in-flight and
//! finished deployments alike are forgotten on restart.
//!
//! Callers depend on the [`DeploymentRepository`] trait rather than the
//! concrete store. Each record has a single writer (its orchestration
//! task); every read returns a committed snapshot.

pub mod error;
pub mod repository;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use repository::DeploymentRepository;
pub use store::StateStore;
