//! Core module - command routing and namespace leases.
//!
//! This module contains the heart of slackernetes' message processing:
//! - Command registry and first-match routing
//! - Namespace lease protocol over cluster labels
//! - Reply formatting

pub mod format;
pub mod handlers;
pub mod lease;
pub mod registry;
pub mod router;

pub use format::{format, OutgoingPayload, Reply};
pub use handlers::default_registry;
pub use lease::{LabelLeaseRepository, LeaseManager, LeaseRepository};
pub use registry::{Context, Handler, Registry};
pub use router::{dispatch, DispatchOutcome};
