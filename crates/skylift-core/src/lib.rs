//! skylift-core — shared types for the Skylift deployment engine.
//!
//! Holds the deployment record and its lifecycle, the resource and
//! instance descriptors exchanged between pipeline stages, the
//! `skylift.toml` configuration, the application template catalog and
//! the automation credential source.

pub mod catalog;
pub mod config;
pub mod credentials;
pub mod types;

pub use catalog::{AppTemplate, CatalogError, Category, StaticCatalog, TemplateCatalog};
pub use config::SkyliftConfig;
pub use credentials::{AutomationCredential, CredentialError, CredentialSource, FileCredentialSource, PublicKey};
pub use types::*;
