//! Property-based round-trip tests for the wire format.
//!
//! Uses proptest to verify that any document assembled through the public
//! mutation API survives `encode` followed by `decode` unchanged.

use std::collections::BTreeSet;

use proptest::prelude::*;

use nexml::{
    add_characters_block, add_tree_block, xml, DataKind, Document, MatrixDraft, Meta, TreeDraft,
};

fn taxon_labels() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-z]{3,8}", 2..6)
        .prop_map(|set: BTreeSet<String>| set.into_iter().collect())
}

/// A star tree over `labels` with whole-number branch lengths, which
/// format and re-parse exactly.
fn star_tree(labels: &[String], lengths: &[u16]) -> TreeDraft {
    let mut draft = TreeDraft::new();
    let tips: Vec<usize> = labels
        .iter()
        .zip(lengths)
        .map(|(label, length)| draft.leaf(label.clone(), Some(f64::from(*length))))
        .collect();
    let root = draft.internal(tips, None);
    draft.set_root(root);
    draft
}

fn discrete_matrix(labels: &[String], cells: &[Vec<Option<u8>>]) -> MatrixDraft {
    let columns = cells.first().map_or(0, Vec::len);
    let mut draft = MatrixDraft::new(DataKind::Discrete);
    for index in 0..columns {
        draft.column(
            format!("char{}", index + 1),
            Some(vec!["0".to_owned(), "1".to_owned()]),
        );
    }
    for (label, row) in labels.iter().zip(cells) {
        draft.row(
            label.clone(),
            row.iter().map(|cell| cell.map(|s| s.to_string())).collect(),
        );
    }
    draft
}

proptest! {
    /// decode(encode(d)) = d for tree-bearing documents.
    #[test]
    fn prop_tree_documents_round_trip(
        labels in taxon_labels(),
        seed_lengths in prop::collection::vec(0u16..1000, 6),
    ) {
        let lengths = &seed_lengths[..labels.len()];
        let document = add_tree_block(vec![star_tree(&labels, lengths)], None).unwrap();

        let bytes = xml::encode(&document);
        let restored = xml::decode(&bytes).unwrap();
        prop_assert_eq!(restored, document);
    }

    /// decode(encode(d)) = d when a matrix over the same taxa is added,
    /// including the shared taxonomic unit block.
    #[test]
    fn prop_mixed_documents_round_trip(
        labels in taxon_labels(),
        seed_lengths in prop::collection::vec(0u16..1000, 6),
        seed_cells in prop::collection::vec(
            prop::collection::vec(prop::option::of(0u8..2), 3),
            6,
        ),
    ) {
        let lengths = &seed_lengths[..labels.len()];
        let cells = &seed_cells[..labels.len()];

        let document = add_tree_block(vec![star_tree(&labels, lengths)], None).unwrap();
        let document =
            add_characters_block(discrete_matrix(&labels, cells), Some(document)).unwrap();

        prop_assert_eq!(document.otus_blocks().len(), 1);

        let bytes = xml::encode(&document);
        let restored = xml::decode(&bytes).unwrap();
        prop_assert_eq!(restored, document);
    }

    /// Annotations at every occupied level survive the round trip. Titles
    /// span the full printable range, including leading, trailing, and
    /// whitespace-only values and the markup-significant characters.
    #[test]
    fn prop_annotated_documents_round_trip(
        labels in taxon_labels(),
        title in "[ -~]{1,24}",
    ) {
        let mut draft = TreeDraft::new();
        let tips: Vec<usize> = labels.iter().map(|l| draft.leaf(l.clone(), None)).collect();
        let root = draft.internal(tips, None);
        draft.set_root(root);

        let mut document = add_tree_block(vec![draft], None).unwrap();
        document
            .add_metadata(Meta::text("dc:title", title), "document", None)
            .unwrap();
        document
            .add_metadata(
                Meta::resource(
                    "cc:license",
                    "http://creativecommons.org/publicdomain/zero/1.0/",
                ),
                "otus/otu",
                None,
            )
            .unwrap();

        let bytes = xml::encode(&document);
        let restored = xml::decode(&bytes).unwrap();
        prop_assert_eq!(restored, document);
    }
}

#[test]
fn empty_document_round_trips() {
    let document = Document::new();
    let bytes = xml::encode(&document);
    assert_eq!(xml::decode(&bytes).unwrap(), document);
}
