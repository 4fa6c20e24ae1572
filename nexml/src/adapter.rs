//! Integration seams for external toolkits and services.
//!
//! The core crate stays self-contained; anything that talks to another
//! tree library, a table engine, a name-resolution service, a repository,
//! or a remote schema validator plugs in through these traits.

use thiserror::Error;

use crate::error::NexmlError;
use crate::model::{Tree, TreeDraft};
use crate::tables::DataTable;
use crate::xml::Validation;

/// Raised when a remote validation service cannot be reached or refuses
/// the request. Callers fall back to local structural validation.
#[derive(Debug, Error)]
#[error("validation service unavailable: {reason}")]
pub struct ValidationUnavailable {
    /// Transport-level or service-level explanation.
    pub reason: String,
}

/// Raised when publishing a serialized document to a repository fails.
#[derive(Debug, Error)]
#[error("publish failed: {reason}")]
pub struct PublishError {
    /// Explanation from the repository or the transport.
    pub reason: String,
}

/// Converts between this crate's tree model and an external toolkit's.
pub trait TreeAdapter {
    /// The external toolkit's tree representation.
    type ExternalTree;

    /// Builds a draft from an external tree, ready for
    /// [`crate::document::add_tree_block`].
    ///
    /// # Errors
    ///
    /// Implementations report trees the document model cannot represent,
    /// typically as [`NexmlError::Malformed`].
    fn import(&self, tree: &Self::ExternalTree) -> Result<TreeDraft, NexmlError>;

    /// Renders a stored tree in the external toolkit's representation.
    ///
    /// # Errors
    ///
    /// Implementations report trees the external toolkit cannot represent.
    fn export(&self, tree: &Tree) -> Result<Self::ExternalTree, NexmlError>;
}

/// Converts projection output into an external table engine's format.
pub trait TableAdapter {
    /// The external engine's table representation.
    type ExternalTable;

    /// Renders a projected table in the external representation.
    ///
    /// # Errors
    ///
    /// Implementations report tables the external engine cannot represent.
    fn export(&self, table: &DataTable) -> Result<Self::ExternalTable, NexmlError>;
}

/// Resolves free-text taxon labels to candidate identifier URIs, in
/// decreasing order of confidence. An empty list means no match.
pub trait IdentifierResolver {
    /// Candidate URIs for `label`.
    fn resolve(&self, label: &str) -> Vec<String>;
}

/// Validates a serialized document against the authoritative schema.
pub trait ValidationService {
    /// Validates `xml`, returning the verdict.
    ///
    /// # Errors
    ///
    /// [`ValidationUnavailable`] when the service cannot be reached; the
    /// caller then falls back to local structural validation.
    fn validate(&self, xml: &str) -> Result<Validation, ValidationUnavailable>;
}

/// Publishes a serialized document to a data repository.
pub trait Publisher {
    /// Uploads `xml` and returns the repository's accession identifier.
    ///
    /// # Errors
    ///
    /// [`PublishError`] when the repository rejects the upload or the
    /// transport fails.
    fn publish(&self, xml: &str) -> Result<String, PublishError>;
}
