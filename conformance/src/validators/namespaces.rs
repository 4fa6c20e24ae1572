//! Namespace registry validator.
//!
//! Verifies that the document's registry carries the core `nex` binding,
//! that every binding maps to an absolute URI, and that every annotation
//! in the document resolves through the registry.

use nexml::namespace::uris;
use nexml::{Document, Meta, MetaLevel};

use crate::report::ConformanceReport;

const LEVELS: &[MetaLevel] = &[
    MetaLevel::Document,
    MetaLevel::Otus,
    MetaLevel::Otu,
    MetaLevel::Trees,
    MetaLevel::Tree,
    MetaLevel::Node,
    MetaLevel::Edge,
    MetaLevel::Characters,
    MetaLevel::Char,
    MetaLevel::Row,
];

/// Validates the namespace registry and every annotation's prefix.
#[must_use]
pub fn validate(document: &Document) -> ConformanceReport {
    let mut report = ConformanceReport::new();
    report.record_check("namespaces");
    let registry = document.registry();

    match registry.resolve("nex") {
        Ok(uri) if uri == uris::NEX => {}
        Ok(uri) => {
            report.fail(
                "namespaces",
                None,
                format!("`nex` is bound to `{uri}` instead of `{}`", uris::NEX),
            );
        }
        Err(_) => {
            report.fail("namespaces", None, "`nex` is not bound in the registry");
        }
    }

    for (prefix, uri) in registry.snapshot() {
        if !uri.contains("://") && !uri.starts_with("urn:") {
            report.warn(
                "namespaces",
                None,
                format!("prefix `{prefix}` is bound to relative URI `{uri}`"),
            );
        }
    }

    for level in LEVELS {
        for (id, entries) in document.meta_entries(*level) {
            for meta in entries {
                report_unresolved(document, meta, id, &mut report);
            }
        }
    }

    report
}

fn report_unresolved(document: &Document, meta: &Meta, owner: &str, report: &mut ConformanceReport) {
    if !document.registry().contains(meta.prefix()) {
        report.fail(
            "namespaces",
            Some(owner),
            format!("annotation `{}` has an unresolvable prefix", meta.property),
        );
    }
    for child in &meta.children {
        report_unresolved(document, child, owner, report);
    }
}
