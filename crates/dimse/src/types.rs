//! Common types for the DIMSE service boundary

use std::net::SocketAddr;
use std::path::PathBuf;

use dicom_object::mem::InMemElement;
use dicom_object::DefaultDicomObject;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::DimseError;

/// One inbound association, as seen by the service provider.
///
/// Carries the correlation id under which every command and result of the
/// association is logged.
#[derive(Debug, Clone)]
pub struct AssociationInfo {
    /// Unique identifier for this association
    pub id: Uuid,

    /// Peer socket address
    pub peer: SocketAddr,

    /// Calling AE title, once negotiated
    pub calling_aet: Option<String>,

    /// Called AE title, once negotiated
    pub called_aet: Option<String>,

    /// Timestamp when the association was accepted
    pub established_at: chrono::DateTime<chrono::Utc>,
}

impl AssociationInfo {
    /// Create a new association record for a peer
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            calling_aet: None,
            called_aet: None,
            established_at: chrono::Utc::now(),
        }
    }

    /// Attach the negotiated AE titles
    pub fn with_ae_titles(
        mut self,
        calling: impl Into<String>,
        called: impl Into<String>,
    ) -> Self {
        self.calling_aet = Some(calling.into());
        self.called_aet = Some(called.into());
        self
    }
}

/// DIMSE command types served by this boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimseCommand {
    /// C-ECHO command
    Echo,
    /// C-FIND command
    Find,
    /// C-MOVE command
    Move,
    /// C-GET command
    Get,
}

impl std::fmt::Display for DimseCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimseCommand::Echo => write!(f, "C-ECHO"),
            DimseCommand::Find => write!(f, "C-FIND"),
            DimseCommand::Move => write!(f, "C-MOVE"),
            DimseCommand::Get => write!(f, "C-GET"),
        }
    }
}

/// DIMSE operation status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimseStatus {
    /// Operation completed successfully
    Success,
    /// Operation is pending (more responses to follow)
    Pending,
    /// Operation cancelled by the peer
    Cancel,
    /// Operation failed with a DICOM status code
    Failure(u16),
}

/// Per-command context handed to the service provider.
///
/// The cancellation token is owned by the consumer side; cloning the context
/// shares the same token, so cancelling any clone stops the producer.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// The association the command arrived on
    pub association: AssociationInfo,

    /// The command being serviced
    pub command: DimseCommand,

    /// Negotiated transfer syntax UID
    pub transfer_syntax_uid: String,

    /// Affected SOP class UID
    pub sop_class_uid: String,

    /// Cancellation signal, propagated from the consumer side
    pub cancel: CancellationToken,
}

impl CommandContext {
    /// Create a new command context with a fresh cancellation token
    pub fn new(
        association: AssociationInfo,
        command: DimseCommand,
        transfer_syntax_uid: impl Into<String>,
        sop_class_uid: impl Into<String>,
    ) -> Self {
        Self {
            association,
            command,
            transfer_syntax_uid: transfer_syntax_uid.into(),
            sop_class_uid: sop_class_uid.into(),
            cancel: CancellationToken::new(),
        }
    }
}

/// One item in a C-FIND response stream
#[derive(Debug)]
pub enum FindResponse {
    /// One matching record's elements, parallel to the query's filters
    Match { elements: Vec<InMemElement> },
    /// The query failed as a whole; no further items follow
    Failed { error: DimseError },
}

impl FindResponse {
    /// Create a match item
    pub fn matched(elements: Vec<InMemElement>) -> Self {
        Self::Match { elements }
    }

    /// Create a query-level failure item
    pub fn failed(error: DimseError) -> Self {
        Self::Failed { error }
    }
}

/// One item in a C-MOVE/C-GET response stream
#[derive(Debug)]
pub enum RetrieveResponse {
    /// One full dataset, re-read from storage with pixel data included
    Item {
        /// Items still to be emitted after this one
        remaining: usize,
        /// Source file of the dataset
        path: PathBuf,
        /// The full dataset
        object: Box<DefaultDicomObject>,
    },
    /// A single matched file could not be read back; the stream continues
    ItemFailed {
        remaining: usize,
        path: PathBuf,
        error: DimseError,
    },
    /// The query failed as a whole; no further items follow
    Failed { error: DimseError },
}

impl RetrieveResponse {
    /// Create a dataset item
    pub fn item(remaining: usize, path: PathBuf, object: DefaultDicomObject) -> Self {
        Self::Item {
            remaining,
            path,
            object: Box::new(object),
        }
    }

    /// Create a per-item failure
    pub fn item_failed(remaining: usize, path: PathBuf, error: DimseError) -> Self {
        Self::ItemFailed {
            remaining,
            path,
            error,
        }
    }

    /// Create a query-level failure item
    pub fn failed(error: DimseError) -> Self {
        Self::Failed { error }
    }

    /// The countdown of items still to come, if this is a per-item response
    pub fn remaining(&self) -> Option<usize> {
        match self {
            Self::Item { remaining, .. } | Self::ItemFailed { remaining, .. } => Some(*remaining),
            Self::Failed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_association_info() {
        let peer: SocketAddr = "198.51.100.7:49152".parse().unwrap();
        let info = AssociationInfo::new(peer).with_ae_titles("EVIL_SCU", "ARCHIVE");
        assert!(!info.id.is_nil());
        assert_eq!(info.peer, peer);
        assert_eq!(info.calling_aet.as_deref(), Some("EVIL_SCU"));
        assert_eq!(info.called_aet.as_deref(), Some("ARCHIVE"));
        assert!(info.established_at <= chrono::Utc::now());
    }

    #[test]
    fn test_command_display() {
        assert_eq!(DimseCommand::Echo.to_string(), "C-ECHO");
        assert_eq!(DimseCommand::Find.to_string(), "C-FIND");
        assert_eq!(DimseCommand::Move.to_string(), "C-MOVE");
        assert_eq!(DimseCommand::Get.to_string(), "C-GET");
    }

    #[test]
    fn test_context_shares_cancellation() {
        let peer: SocketAddr = "127.0.0.1:11112".parse().unwrap();
        let ctx = CommandContext::new(
            AssociationInfo::new(peer),
            DimseCommand::Find,
            "1.2.840.10008.1.2.1",
            "1.2.840.10008.5.1.4.1.2.1.1",
        );
        let clone = ctx.clone();
        clone.cancel.cancel();
        assert!(ctx.cancel.is_cancelled());
    }

    #[test]
    fn test_retrieve_remaining() {
        let failed = RetrieveResponse::failed(DimseError::internal("boom"));
        assert_eq!(failed.remaining(), None);

        let item = RetrieveResponse::item_failed(
            3,
            PathBuf::from("/images/a.dcm"),
            DimseError::dataset_read("gone"),
        );
        assert_eq!(item.remaining(), Some(3));
    }
}
