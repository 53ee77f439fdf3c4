//! # wminfo-vsphere
//!
//! vSphere inventory reporting over the vim25 SOAP API.
//!
//! Provides:
//! - **Reference discovery** scoped to a datacenter, with glob name filters
//! - **Batched property projection**, one round trip per object kind
//! - **Cross-reference assembly** of a VM's host, datastores and networks
//! - **Console hand-off**: clone ticket, certificate thumbprint, launch URL
//!
//! The core talks to the service only through [`session::InventorySession`];
//! [`vsphere::VsphereClient`] is the network implementation and
//! [`testing::FakeSession`] an in-memory one.

pub mod assembler;
pub mod config;
pub mod console;
pub mod error;
pub mod projector;
pub mod report;
pub mod resolver;
pub mod service;
pub mod session;
pub mod testing;
pub mod tls;
pub mod types;
pub mod vim25;
pub mod vsphere;

pub use config::{InventoryConfig, ServiceEndpoint};
pub use error::{InventoryError, InventoryErrorKind, InventoryResult};
pub use service::InventoryService;
pub use session::{CancelHandle, CancelSignal, InventorySession};
pub use types::*;
pub use vsphere::VsphereClient;
