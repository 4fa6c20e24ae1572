//! Conformance suite for `nexml` documents.
//!
//! Aggregates structural validators beyond the invariants the core crate
//! enforces at mutation time: registry health, referential integrity,
//! taxon-list reuse policy, and serialization round-trip identity.
//!
//! # Conformance Scope
//!
//! | Concern | Check |
//! |---------|-------|
//! | Namespaces | core `nex` binding, absolute URIs, annotation prefixes |
//! | References | taxon lists, node/tip OTU links, rows, cells |
//! | Merge policy | no duplicate taxon label sets |
//! | Round trip | decode(encode(d)) = d, serialized form validates |
//!
//! # Entry Point
//!
//! ```
//! use nexml::Document;
//! use nexml_conformance::run_all;
//!
//! let report = run_all(&Document::new());
//! assert!(report.all_passed());
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod report;
pub mod validators;

pub use report::{ConformanceReport, Finding, Severity};

use std::path::Path;

use anyhow::Context;
use nexml::Document;

/// Runs all conformance validators and returns the aggregated report.
///
/// Validators run in this order:
/// 1. Namespace registry and annotation prefixes
/// 2. Referential integrity
/// 3. Taxon-list reuse policy
/// 4. Serialization round trip
#[must_use]
pub fn run_all(document: &Document) -> ConformanceReport {
    let mut report = ConformanceReport::new();
    report.extend(validators::namespaces::validate(document));
    report.extend(validators::references::validate(document));
    report.extend(validators::merge_policy::validate(document));
    report.extend(validators::roundtrip::validate(document));
    report
}

/// Parses a serialized document from disk and runs all validators on it.
///
/// A stream that fails to parse yields a single-failure report rather
/// than an error; errors are reserved for file system problems.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn run_path(path: &Path) -> anyhow::Result<ConformanceReport> {
    let xml = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    match nexml::xml::decode(&xml) {
        Ok(document) => Ok(run_all(&document)),
        Err(err) => {
            let mut report = ConformanceReport::new();
            report.record_check("parse");
            report.fail("parse", None, format!("{} does not parse: {err}", path.display()));
            Ok(report)
        }
    }
}
