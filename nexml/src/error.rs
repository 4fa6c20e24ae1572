//! Error types for document mutation and the serialization gateway.
//!
//! Every variant names the offending identifier, prefix, or level; callers
//! should never have to dig through a stack trace to find out which entity
//! was rejected. All document mutations are all-or-nothing: an error from
//! any operation means the document is exactly as it was before the call.

use thiserror::Error;

/// Errors produced by document construction, metadata attachment, and
/// wire-format decoding.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NexmlError {
    /// A prefix was re-registered against a different URI. The registry is
    /// unchanged; re-registering the *same* URI is an accepted no-op.
    #[error("namespace prefix `{prefix}` is already bound to `{bound}`, cannot rebind to `{attempted}`")]
    NamespaceConflict {
        /// The contested prefix.
        prefix: String,
        /// The URI the prefix is currently bound to.
        bound: String,
        /// The URI the caller tried to bind instead.
        attempted: String,
    },

    /// A prefix was looked up that has never been registered.
    #[error("unknown namespace prefix `{0}`")]
    UnknownPrefix(String),

    /// A metadata annotation (or one of its descendants) uses a prefix the
    /// document's registry cannot resolve. Nothing was attached.
    #[error("unresolved namespace prefix `{prefix}` in metadata property `{property}`")]
    UnresolvedNamespace {
        /// The first unresolvable prefix found.
        prefix: String,
        /// The qualified property that carried it.
        property: String,
    },

    /// A tree tip or matrix row references an OTU identifier that no
    /// reachable OTU block contains. The mutation was rejected.
    #[error("dangling reference to OTU `{0}`")]
    DanglingReference(String),

    /// An identifier collides with one already present in the document
    /// for the same entity kind.
    #[error("duplicate identifier `{0}`")]
    DuplicateId(String),

    /// A metadata level string that names no known attachment point.
    #[error("unknown metadata level `{0}`")]
    UnknownLevel(String),

    /// A metadata target id that matches no entity at the requested level.
    #[error("no entity with id `{id}` at level `{level}`")]
    UnknownTarget {
        /// The requested level.
        level: String,
        /// The id that failed to match.
        id: String,
    },

    /// A tip node that carries neither a taxon label (draft path) nor an
    /// OTU reference (linked path).
    #[error("tip node `{0}` carries neither a taxon label nor an OTU reference")]
    UnlinkedTip(String),

    /// Branch lengths must be non-negative.
    #[error("negative branch length {length} on edge `{edge}`")]
    NegativeLength {
        /// The offending edge id.
        edge: String,
        /// The declared length.
        length: f64,
    },

    /// A state space declared on a column of a continuous matrix.
    #[error("character `{0}` declares a state space but the matrix kind is continuous")]
    UnexpectedStates(String),

    /// The wire format could not be reconstructed into a structurally
    /// valid document. Decoding fails atomically; no partial document is
    /// ever returned.
    #[error("malformed document: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let err = NexmlError::DanglingReference("X99".to_owned());
        assert!(err.to_string().contains("X99"));

        let err = NexmlError::NamespaceConflict {
            prefix: "dc".to_owned(),
            bound: "http://purl.org/dc/elements/1.1/".to_owned(),
            attempted: "http://example.org/".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("`dc`"));
        assert!(msg.contains("http://example.org/"));
    }
}
