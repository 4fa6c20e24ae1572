//! Serialization gateway: the NeXML wire format and validation.

pub mod reader;
pub mod writer;

pub use reader::decode;
pub use writer::{encode, xml_escape};

use crate::adapter::ValidationService;

/// The verdict of a validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// The byte stream is a valid document.
    Valid,
    /// The byte stream was rejected, with one message per finding.
    Invalid(Vec<String>),
}

impl Validation {
    /// True when the verdict is [`Validation::Valid`].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }
}

/// Validates a serialized document.
///
/// When `remote` is provided it is consulted first; if it cannot be
/// reached, the failure is logged and validation falls back to the local
/// structural check. The local check parses the stream and runs the full
/// set of document invariants, so it catches everything short of schema
/// details this crate does not model.
#[must_use]
pub fn validate(xml: &str, remote: Option<&dyn ValidationService>) -> Validation {
    if let Some(service) = remote {
        match service.validate(xml) {
            Ok(verdict) => return verdict,
            Err(unavailable) => {
                log::warn!("{unavailable}; falling back to local validation");
            }
        }
    }
    match decode(xml) {
        Ok(_) => Validation::Valid,
        Err(err) => Validation::Invalid(vec![err.to_string()]),
    }
}
