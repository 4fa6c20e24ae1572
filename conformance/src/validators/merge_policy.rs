//! Taxon-list reuse policy validator.
//!
//! The mutation API reuses an existing taxon list whenever a new block
//! would carry the identical label set. A document holding two distinct
//! taxon lists with the same label set still verifies, but it defeats the
//! merge policy downstream, so this validator flags each later duplicate
//! against the block it shadows.

use std::collections::BTreeMap;

use nexml::Document;

use crate::report::ConformanceReport;

/// Flags distinct taxon lists carrying identical label sets.
#[must_use]
pub fn validate(document: &Document) -> ConformanceReport {
    let mut report = ConformanceReport::new();
    report.record_check("merge-policy");

    let mut by_label_set: BTreeMap<Vec<&str>, &str> = BTreeMap::new();
    for block in document.otus_blocks() {
        let key: Vec<&str> = block.label_set().into_iter().collect();
        match by_label_set.get(&key) {
            Some(first) => {
                report.warn(
                    "merge-policy",
                    Some(&block.id),
                    format!(
                        "carries the same label set as `{first}` and will not merge in projections"
                    ),
                );
            }
            None => {
                by_label_set.insert(key, &block.id);
            }
        }
    }

    report
}
