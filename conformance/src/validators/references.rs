//! Referential integrity validator.
//!
//! Walks every cross-reference in the document: block-level taxon list
//! references, node-to-OTU links, tip linkage, matrix row ownership, and
//! cell-to-column references. Each broken reference is reported against
//! the entity that holds it.

use nexml::Document;

use crate::report::ConformanceReport;

/// Validates every cross-reference in `document`.
#[must_use]
pub fn validate(document: &Document) -> ConformanceReport {
    let mut report = ConformanceReport::new();
    report.record_check("references");

    for block in document.tree_blocks() {
        if document.otus_block(&block.otus).is_none() {
            report.fail(
                "references",
                Some(&block.id),
                format!("references missing taxon list `{}`", block.otus),
            );
        }
        for tree in &block.trees {
            for node in &tree.nodes {
                if let Some(otu) = &node.otu {
                    if document.find_otu(otu).is_none() {
                        report.fail(
                            "references",
                            Some(&node.id),
                            format!("node in tree `{}` references missing OTU `{otu}`", tree.id),
                        );
                    }
                }
            }
            for tip in tree.tips() {
                if tip.otu.is_none() {
                    report.fail(
                        "references",
                        Some(&tip.id),
                        format!("tip in tree `{}` is not linked to an OTU", tree.id),
                    );
                }
            }
            for edge in &tree.edges {
                if tree.node(&edge.source).is_none() || tree.node(&edge.target).is_none() {
                    report.fail(
                        "references",
                        Some(&edge.id),
                        format!("edge in tree `{}` references a node outside the tree", tree.id),
                    );
                }
            }
        }
    }

    for block in document.characters_blocks() {
        let Some(taxa) = document.otus_block(&block.otus) else {
            report.fail(
                "references",
                Some(&block.id),
                format!("references missing taxon list `{}`", block.otus),
            );
            continue;
        };
        for row in &block.rows {
            if taxa.otu(&row.otu).is_none() {
                report.fail(
                    "references",
                    Some(&row.id),
                    format!(
                        "row in block `{}` references OTU `{}` outside `{}`",
                        block.id, row.otu, taxa.id
                    ),
                );
            }
            for cell_char in row.cells.keys() {
                if block.character(cell_char).is_none() {
                    report.fail(
                        "references",
                        Some(&row.id),
                        format!(
                            "row in block `{}` has a cell for undeclared column `{cell_char}`",
                            block.id
                        ),
                    );
                }
            }
        }
    }

    report
}
