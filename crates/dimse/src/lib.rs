//! DIMSE (DICOM Message Service Element) service boundary
//!
//! This crate is the seam between a DICOM query/retrieve provider and the
//! network stack that carries the protocol. It supplies:
//! - the [`scp::QueryRetrieveProvider`] trait: the three callback contracts
//!   (C-ECHO, C-FIND, C-MOVE/C-GET) a provider implements,
//! - channel-streamed response types with backpressure and cancellation,
//! - the [`scp::DimseScp`] listener shell with association accounting.
//!
//! Association negotiation, PDU framing, and command decode stay on the far
//! side of this boundary.

pub mod config;
pub mod error;
pub mod scp;
pub mod types;

// Re-export commonly used types
pub use config::DimseConfig;
pub use error::{DimseError, Result};
pub use scp::{DimseScp, QueryRetrieveProvider};
pub use types::{
    AssociationInfo, CommandContext, DimseCommand, DimseStatus, FindResponse, RetrieveResponse,
};

/// Default DICOM port (non-TLS)
pub const DEFAULT_DIMSE_PORT: u16 = 11112;
