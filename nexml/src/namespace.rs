//! Namespace prefix bindings and the document-scoped registry.
//!
//! Every metadata property is qualified by a prefix (`dc:title`), and every
//! prefix must resolve to a vocabulary URI through the owning document's
//! [`NamespaceRegistry`]. Registration is append-only: vocabularies, once
//! declared, persist for the document's life, matching the append-only
//! nature of the wire format.

use crate::error::NexmlError;

/// Well-known vocabulary URIs pre-loaded into every new registry.
pub mod uris {
    /// The NeXML schema namespace.
    pub const NEX: &str = "http://www.nexml.org/2009";
    /// XML Schema instance namespace (`xsi:type` attributes).
    pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
    /// The XML namespace itself.
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    /// XML Schema datatypes.
    pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
    /// RDF namespace.
    pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
    /// RDFS namespace.
    pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
    /// Dublin Core elements.
    pub const DC: &str = "http://purl.org/dc/elements/1.1/";
    /// Dublin Core terms.
    pub const DCTERMS: &str = "http://purl.org/dc/terms/";
    /// PRISM publishing metadata.
    pub const PRISM: &str = "http://prismstandard.org/namespaces/1.2/basic/";
    /// Creative Commons licensing vocabulary.
    pub const CC: &str = "http://creativecommons.org/ns#";
    /// Friend-of-a-friend vocabulary.
    pub const FOAF: &str = "http://xmlns.com/foaf/0.1/";
    /// SKOS vocabulary.
    pub const SKOS: &str = "http://www.w3.org/2004/02/skos/core#";
}

/// Default bindings copied into each new registry, in declaration order.
///
/// This is an immutable static table, never process-global mutable state,
/// so documents cannot interfere with one another.
pub static DEFAULT_BINDINGS: &[(&str, &str)] = &[
    ("nex", uris::NEX),
    ("xsi", uris::XSI),
    ("xml", uris::XML),
    ("xsd", uris::XSD),
    ("rdf", uris::RDF),
    ("rdfs", uris::RDFS),
    ("dc", uris::DC),
    ("dcterms", uris::DCTERMS),
    ("prism", uris::PRISM),
    ("cc", uris::CC),
    ("foaf", uris::FOAF),
    ("skos", uris::SKOS),
];

/// Prefix → URI bindings for one document, in registration order with
/// built-ins first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceRegistry {
    bindings: Vec<(String, String)>,
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceRegistry {
    /// Creates a registry pre-loaded with [`DEFAULT_BINDINGS`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: DEFAULT_BINDINGS
                .iter()
                .map(|(p, u)| ((*p).to_owned(), (*u).to_owned()))
                .collect(),
        }
    }

    /// Creates an empty registry. Used by the decoder, which replays the
    /// bindings declared on the wire-format root element instead.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Registers `prefix` → `uri`.
    ///
    /// Re-registering an existing prefix with the same URI is an idempotent
    /// no-op. No binding is ever removed.
    ///
    /// # Errors
    ///
    /// [`NexmlError::NamespaceConflict`] if `prefix` is already bound to a
    /// different URI; the registry is left unchanged.
    pub fn register(&mut self, prefix: &str, uri: &str) -> Result<(), NexmlError> {
        if let Some((_, bound)) = self.bindings.iter().find(|(p, _)| p == prefix) {
            if bound == uri {
                return Ok(());
            }
            return Err(NexmlError::NamespaceConflict {
                prefix: prefix.to_owned(),
                bound: bound.clone(),
                attempted: uri.to_owned(),
            });
        }
        self.bindings.push((prefix.to_owned(), uri.to_owned()));
        Ok(())
    }

    /// Resolves `prefix` to its bound URI.
    ///
    /// # Errors
    ///
    /// [`NexmlError::UnknownPrefix`] if the prefix is unbound.
    pub fn resolve(&self, prefix: &str) -> Result<&str, NexmlError> {
        self.bindings
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, u)| u.as_str())
            .ok_or_else(|| NexmlError::UnknownPrefix(prefix.to_owned()))
    }

    /// Returns whether `prefix` is bound.
    #[must_use]
    pub fn contains(&self, prefix: &str) -> bool {
        self.bindings.iter().any(|(p, _)| p == prefix)
    }

    /// All bindings in registration order, built-ins first.
    #[must_use]
    pub fn snapshot(&self) -> &[(String, String)] {
        &self.bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_preloaded_in_order() {
        let registry = NamespaceRegistry::new();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), DEFAULT_BINDINGS.len());
        assert_eq!(snapshot[0].0, "nex");
        assert_eq!(registry.resolve("dc").unwrap(), uris::DC);
    }

    #[test]
    fn register_is_idempotent_on_same_uri() {
        let mut registry = NamespaceRegistry::new();
        registry.register("dc", uris::DC).unwrap();
        registry.register("obo", "http://purl.obolibrary.org/obo/").unwrap();
        registry.register("obo", "http://purl.obolibrary.org/obo/").unwrap();
        assert_eq!(registry.snapshot().len(), DEFAULT_BINDINGS.len() + 1);
    }

    #[test]
    fn rebind_to_different_uri_is_rejected() {
        let mut registry = NamespaceRegistry::new();
        let before = registry.snapshot().to_vec();
        let err = registry.register("dc", "http://example.org/").unwrap_err();
        assert!(matches!(err, NexmlError::NamespaceConflict { .. }));
        // Registry unchanged after the rejected rebind.
        assert_eq!(registry.snapshot(), &before[..]);
    }

    #[test]
    fn unknown_prefix_is_an_error() {
        let registry = NamespaceRegistry::new();
        let err = registry.resolve("obo").unwrap_err();
        assert!(matches!(err, NexmlError::UnknownPrefix(p) if p == "obo"));
    }

    #[test]
    fn custom_bindings_come_after_builtins() {
        let mut registry = NamespaceRegistry::new();
        registry.register("obo", "http://purl.obolibrary.org/obo/").unwrap();
        let last = registry.snapshot().last().cloned();
        assert_eq!(
            last,
            Some(("obo".to_owned(), "http://purl.obolibrary.org/obo/".to_owned()))
        );
    }
}
