//! The recursive metadata annotation model.
//!
//! A [`Meta`] is a namespace-qualified property together with either a
//! typed literal or a resource reference, plus an ordered list of child
//! annotations of the same shape. Construction is namespace-agnostic so
//! annotations can be composed before any document (and hence any
//! registry) exists; prefixes are validated only when the annotation is
//! attached. Ownership is strictly tree-shaped: every child belongs to
//! exactly one parent, so no cycles can form.

use crate::error::NexmlError;
use crate::namespace::NamespaceRegistry;

/// Declared datatype of a literal annotation value.
///
/// The declared type is carried verbatim across encode/decode; a value
/// written as `xsd:integer` decodes as `Integer` even though the content
/// is stored as its lexical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LiteralType {
    /// `xsd:string`.
    String,
    /// `xsd:integer`.
    Integer,
    /// `xsd:decimal`.
    Decimal,
    /// `xsd:boolean`.
    Boolean,
    /// `xsd:date`.
    Date,
}

impl LiteralType {
    /// The qualified datatype name written on the wire.
    #[must_use]
    pub fn datatype(self) -> &'static str {
        match self {
            LiteralType::String => "xsd:string",
            LiteralType::Integer => "xsd:integer",
            LiteralType::Decimal => "xsd:decimal",
            LiteralType::Boolean => "xsd:boolean",
            LiteralType::Date => "xsd:date",
        }
    }

    /// Parses a wire-format datatype name. Returns `None` for datatypes
    /// outside the supported set; the decoder turns that into a
    /// [`NexmlError::Malformed`] rather than silently retyping.
    #[must_use]
    pub fn from_datatype(datatype: &str) -> Option<Self> {
        match datatype {
            "xsd:string" => Some(LiteralType::String),
            "xsd:integer" => Some(LiteralType::Integer),
            "xsd:decimal" => Some(LiteralType::Decimal),
            "xsd:boolean" => Some(LiteralType::Boolean),
            "xsd:date" => Some(LiteralType::Date),
            _ => None,
        }
    }
}

/// The value carried by an annotation: a typed literal or a resource URI.
///
/// The distinction is preserved across round-trip — a literal whose
/// content happens to look like a URI never becomes a resource.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MetaValue {
    /// A typed scalar rendered as element content on the wire.
    Literal {
        /// Declared datatype.
        datatype: LiteralType,
        /// Lexical form of the value.
        content: String,
    },
    /// A reference to an external resource, rendered as an `href`
    /// attribute on the wire.
    Resource {
        /// The resource URI.
        href: String,
    },
}

/// A namespace-qualified annotation, attachable to the document root or to
/// any entity, with ordered nested children.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Meta {
    /// Qualified property name, `prefix:local-name`.
    pub property: String,
    /// Literal or resource value.
    pub value: MetaValue,
    /// Ordered nested annotations; possibly empty.
    pub children: Vec<Meta>,
}

impl Meta {
    /// Creates a literal annotation with an explicit datatype.
    #[must_use]
    pub fn literal(
        property: impl Into<String>,
        datatype: LiteralType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            value: MetaValue::Literal {
                datatype,
                content: content.into(),
            },
            children: Vec::new(),
        }
    }

    /// Creates an `xsd:string` literal annotation.
    #[must_use]
    pub fn text(property: impl Into<String>, content: impl Into<String>) -> Self {
        Self::literal(property, LiteralType::String, content)
    }

    /// Creates a resource annotation pointing at `href`.
    #[must_use]
    pub fn resource(property: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: MetaValue::Resource { href: href.into() },
            children: Vec::new(),
        }
    }

    /// Replaces the nested children, preserving their order.
    #[must_use]
    pub fn with_children(mut self, children: Vec<Meta>) -> Self {
        self.children = children;
        self
    }

    /// The prefix part of the qualified property. A property with no `:`
    /// separator yields itself, which no registry resolves as a prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.property.split(':').next().unwrap_or_default()
    }

    /// Checks that this annotation's prefix and every descendant's prefix
    /// resolve in `registry`. Called by every attach path before any
    /// mutation, so a failure never partially attaches an annotation.
    ///
    /// # Errors
    ///
    /// [`NexmlError::UnresolvedNamespace`] naming the first unresolvable
    /// prefix encountered in depth-first order.
    pub fn resolve(&self, registry: &NamespaceRegistry) -> Result<(), NexmlError> {
        let prefix = self.prefix();
        if !registry.contains(prefix) {
            return Err(NexmlError::UnresolvedNamespace {
                prefix: prefix.to_owned(),
                property: self.property.clone(),
            });
        }
        for child in &self.children {
            child.resolve(registry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_is_namespace_agnostic() {
        // No registry in sight; composition must still work.
        let meta = Meta::text("madeup:field", "x")
            .with_children(vec![Meta::resource("alsomadeup:ref", "http://example.org/")]);
        assert_eq!(meta.children.len(), 1);
    }

    #[test]
    fn resolve_walks_descendants() {
        let registry = NamespaceRegistry::new();
        let ok = Meta::text("dc:title", "My analysis")
            .with_children(vec![Meta::resource("dcterms:source", "http://example.org/")]);
        ok.resolve(&registry).unwrap();

        let bad = Meta::text("dc:title", "My analysis")
            .with_children(vec![Meta::text("obo:death", "2024-01-01")]);
        let err = bad.resolve(&registry).unwrap_err();
        assert!(
            matches!(err, NexmlError::UnresolvedNamespace { ref prefix, .. } if prefix == "obo")
        );
    }

    #[test]
    fn unqualified_property_never_resolves() {
        let registry = NamespaceRegistry::new();
        let err = Meta::text("title", "x").resolve(&registry).unwrap_err();
        assert!(matches!(err, NexmlError::UnresolvedNamespace { .. }));
    }

    #[test]
    fn datatype_round_trips_by_name() {
        for ty in [
            LiteralType::String,
            LiteralType::Integer,
            LiteralType::Decimal,
            LiteralType::Boolean,
            LiteralType::Date,
        ] {
            assert_eq!(LiteralType::from_datatype(ty.datatype()), Some(ty));
        }
        assert_eq!(LiteralType::from_datatype("xsd:hexBinary"), None);
    }
}
