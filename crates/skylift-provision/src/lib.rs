//! skylift-provision — compute instance creation.
//!
//! Provisioning is a capability with two implementations, chosen once at
//! process start:
//!
//! - [`GatewayProvisioner`] creates instances through the provider gateway
//!   API (credit payment, both public keys injected) and notifies the
//!   chosen compute node.
//! - [`ManualProvisioner`] is used when no gateway is configured. It
//!   validates the request and then fails with the equivalent CLI command
//!   and console link so an operator can create the instance by hand.
//!
//! Both validate the resource profile against [`ProviderLimits`] before
//! any network traffic. Instances are never deleted by the engine, even
//! when a later stage fails.

pub mod error;
pub mod gateway;
pub mod limits;
pub mod manual;
pub mod provisioner;

pub use error::{ProvisioningError, ProvisioningResult};
pub use gateway::GatewayProvisioner;
pub use limits::ProviderLimits;
pub use manual::{ManualProvisioner, manual_instructions};
pub use provisioner::{ProvisionRequest, Provisioner, StackMetadata};
