//! Tabular projections of the hierarchical document model.
//!
//! Projections are pure: they borrow the document, never mutate it, and
//! never fail on missing data — an absent value surfaces as `None`, not as
//! an error or an empty string. The dynamically-shaped results
//! (`get_metadata` over `"all"`, `get_characters` over one or many OTU
//! sets, `get_trees` over varying cardinalities) are expressed as tagged
//! enums rather than a single lowest-common-denominator shape.

use std::collections::BTreeMap;

use crate::document::{Document, MetaLevel};
use crate::error::NexmlError;
use crate::meta::{Meta, MetaValue};
use crate::model::Tree;

/// A wide metadata table: one row per entity, one column per distinct
/// qualified property observed across those entities.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetaTable {
    /// Entity ids, one per row.
    pub ids: Vec<String>,
    /// Qualified property names, in first-observed order.
    pub columns: Vec<String>,
    /// Row-major cells aligned with `columns`; `None` is explicit absence.
    pub rows: Vec<Vec<Option<String>>>,
}

/// A character-data table: one row per OTU of the underlying block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataTable {
    /// Row names: OTU labels, falling back to ids for unlabeled OTUs.
    pub row_names: Vec<String>,
    /// Column names, in matrix-then-column order.
    pub columns: Vec<String>,
    /// Row-major cells aligned with `columns`; `None` is missing data.
    pub rows: Vec<Vec<Option<String>>>,
}

/// Result of [`get_metadata`]: flat for one level, raw for `"all"`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataView {
    /// Wide table for a single level.
    Table(MetaTable),
    /// For `"all"`: entity id → raw annotation list, unflattened, because
    /// annotation shapes vary too much across levels to share one schema.
    /// Every entity appears, with an empty list when unannotated, so an
    /// absent key always means the entity does not exist.
    Raw(BTreeMap<String, Vec<Meta>>),
}

/// Result of [`get_characters`], shaped by how many OTU sets are present.
#[derive(Debug, Clone, PartialEq)]
pub enum CharactersView {
    /// All characters blocks share one OTU block: a single merged table.
    Single(DataTable),
    /// Blocks over differing OTU sets stay separate, keyed by the id of
    /// the OTU block they describe. Empty when the document has no
    /// characters blocks.
    ByBlock(BTreeMap<String, DataTable>),
}

/// Result of [`get_trees`]: the most specific shape for the cardinality.
#[derive(Debug, Clone, PartialEq)]
pub enum TreesView<'a> {
    /// Exactly one block holding exactly one tree.
    Single(&'a Tree),
    /// Exactly one block holding several trees.
    Block(Vec<&'a Tree>),
    /// Any other cardinality, including zero blocks.
    Blocks(Vec<Vec<&'a Tree>>),
}

fn cell_value(meta: &Meta) -> String {
    match &meta.value {
        MetaValue::Literal { content, .. } => content.clone(),
        MetaValue::Resource { href } => href.clone(),
    }
}

/// Projects metadata at `level` into a wide table, or — for `level ==
/// "all"` — into the raw per-entity annotation mapping.
///
/// When an entity carries the same property more than once, the first
/// occurrence fills the cell; the raw `"all"` view is the lossless
/// alternative.
///
/// # Errors
///
/// [`NexmlError::UnknownLevel`] for an unrecognized level string.
pub fn get_metadata(document: &Document, level: &str) -> Result<MetadataView, NexmlError> {
    if level == "all" {
        let mut raw: BTreeMap<String, Vec<Meta>> = BTreeMap::new();
        let levels = [
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
        for level in levels {
            for (id, meta) in document.meta_entries(level) {
                raw.entry(id.to_owned()).or_default().extend_from_slice(meta);
            }
        }
        return Ok(MetadataView::Raw(raw));
    }

    let level: MetaLevel = level.parse()?;
    let entries = document.meta_entries(level);

    let mut columns: Vec<String> = Vec::new();
    for (_, meta) in &entries {
        for m in *meta {
            if !columns.contains(&m.property) {
                columns.push(m.property.clone());
            }
        }
    }

    let mut ids = Vec::with_capacity(entries.len());
    let mut rows = Vec::with_capacity(entries.len());
    for (id, meta) in entries {
        ids.push(id.to_owned());
        let row: Vec<Option<String>> = columns
            .iter()
            .map(|property| {
                meta.iter()
                    .find(|m| &m.property == property)
                    .map(cell_value)
            })
            .collect();
        rows.push(row);
    }

    Ok(MetadataView::Table(MetaTable { ids, columns, rows }))
}

/// Projects character matrices into flat tables.
///
/// Blocks that reference the *same* OTU block merge by column-union keyed
/// on OTU id into one wide table; blocks over differing OTU sets are kept
/// as separate entries — merging never interpolates rows across differing
/// taxon sets. Because OTU blocks are reused by exact label-set equality,
/// "same OTU block id" is equivalent to "same taxon set".
///
/// With `rownames_as_column` a leading `taxon` column duplicates the row
/// names, for hosts whose tabular type has no row-name concept.
#[must_use]
pub fn get_characters(document: &Document, rownames_as_column: bool) -> CharactersView {
    // Group characters blocks by the OTU block they describe, preserving
    // addition order inside each group.
    let mut groups: Vec<(&str, Vec<&crate::model::CharactersBlock>)> = Vec::new();
    for block in document.characters_blocks() {
        match groups.iter_mut().find(|(otus, _)| *otus == block.otus) {
            Some((_, blocks)) => blocks.push(block),
            None => groups.push((block.otus.as_str(), vec![block])),
        }
    }

    let mut tables: BTreeMap<String, DataTable> = BTreeMap::new();
    for (otus_id, blocks) in &groups {
        let Some(otus) = document.otus_block(otus_id) else {
            continue;
        };

        let mut columns: Vec<String> = Vec::new();
        if rownames_as_column {
            columns.push("taxon".to_owned());
        }
        // Column ownership: (block index in group, char id).
        let mut sources: Vec<(usize, String)> = Vec::new();
        for (index, block) in blocks.iter().enumerate() {
            for def in &block.chars {
                let name = def.label.clone().unwrap_or_else(|| def.id.clone());
                let name = if columns.contains(&name) {
                    format!("{}.{name}", block.id)
                } else {
                    name
                };
                columns.push(name);
                sources.push((index, def.id.clone()));
            }
        }

        let row_names: Vec<String> = otus
            .otus
            .iter()
            .map(|o| o.label.clone().unwrap_or_else(|| o.id.clone()))
            .collect();

        let mut rows = Vec::with_capacity(otus.otus.len());
        for otu in &otus.otus {
            let mut row: Vec<Option<String>> = Vec::with_capacity(columns.len());
            if rownames_as_column {
                row.push(Some(otu.label.clone().unwrap_or_else(|| otu.id.clone())));
            }
            for (block_index, char_id) in &sources {
                let value = blocks[*block_index]
                    .row_for(&otu.id)
                    .and_then(|r| r.cells.get(char_id))
                    .cloned();
                row.push(value);
            }
            rows.push(row);
        }

        tables.insert(
            (*otus_id).to_owned(),
            DataTable {
                row_names,
                columns,
                rows,
            },
        );
    }

    if tables.len() == 1 {
        if let Some((_, table)) = tables.into_iter().next() {
            return CharactersView::Single(table);
        }
        // Unreachable: len() == 1 guarantees a first entry.
        return CharactersView::ByBlock(BTreeMap::new());
    }
    CharactersView::ByBlock(tables)
}

/// Projects trees into the most specific shape for the cardinality:
/// a single tree, the single block's tree list, or the nested list.
/// Interactive callers match on the variant; programmatic callers should
/// prefer [`get_trees_list`].
#[must_use]
pub fn get_trees(document: &Document) -> TreesView<'_> {
    let blocks = document.tree_blocks();
    if blocks.len() == 1 {
        let trees: Vec<&Tree> = blocks[0].trees.iter().collect();
        if trees.len() == 1 {
            return TreesView::Single(trees[0]);
        }
        return TreesView::Block(trees);
    }
    TreesView::Blocks(get_trees_list(document))
}

/// Projects trees into the uniform nested-list shape, one inner list per
/// tree block, regardless of cardinality.
#[must_use]
pub fn get_trees_list(document: &Document) -> Vec<Vec<&Tree>> {
    document
        .tree_blocks()
        .iter()
        .map(|block| block.trees.iter().collect())
        .collect()
}

#[cfg(feature = "serializers")]
mod json {
    use super::{DataTable, MetaTable};
    use serde_json::{json, Map, Value};

    impl MetaTable {
        /// Renders the table as a JSON array of per-row objects, absent
        /// values as JSON `null`.
        #[must_use]
        pub fn to_json(&self) -> Value {
            let rows: Vec<Value> = self
                .ids
                .iter()
                .zip(&self.rows)
                .map(|(id, row)| {
                    let mut object = Map::new();
                    object.insert("id".to_owned(), json!(id));
                    for (column, cell) in self.columns.iter().zip(row) {
                        object.insert(column.clone(), json!(cell));
                    }
                    Value::Object(object)
                })
                .collect();
            Value::Array(rows)
        }
    }

    impl DataTable {
        /// Renders the table as a JSON array of per-row objects keyed by
        /// row name, missing data as JSON `null`.
        #[must_use]
        pub fn to_json(&self) -> Value {
            let rows: Vec<Value> = self
                .row_names
                .iter()
                .zip(&self.rows)
                .map(|(name, row)| {
                    let mut object = Map::new();
                    object.insert("taxon".to_owned(), json!(name));
                    for (column, cell) in self.columns.iter().zip(row) {
                        if column != "taxon" {
                            object.insert(column.clone(), json!(cell));
                        }
                    }
                    Value::Object(object)
                })
                .collect();
            Value::Array(rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{add_characters_block, add_tree_block};
    use crate::meta::Meta;
    use crate::model::{DataKind, MatrixDraft, Otu, OtusBlock, TreeDraft};

    fn star_draft(labels: &[&str]) -> TreeDraft {
        let mut draft = TreeDraft::new();
        let leaves: Vec<usize> = labels.iter().map(|l| draft.leaf(*l, Some(1.0))).collect();
        let root = draft.internal(leaves, None);
        draft.set_root(root);
        draft
    }

    fn discrete(labels: &[(&str, &str)]) -> MatrixDraft {
        let mut draft = MatrixDraft::new(DataKind::Discrete);
        draft.column("eyes", Some(vec!["0".to_owned(), "1".to_owned()]));
        for (taxon, value) in labels {
            draft.row(*taxon, vec![Some((*value).to_owned())]);
        }
        draft
    }

    #[test]
    fn metadata_table_is_wide_with_explicit_absence() {
        let mut doc = Document::new();
        doc.add_otus_if_absent(&["A".to_owned(), "B".to_owned()]);
        let first = doc.otus_blocks()[0].otus[0].id.clone();
        doc.add_metadata(Meta::text("dc:source", "trap 7"), "otus/otu", Some(&first))
            .unwrap();
        doc.add_metadata(Meta::text("dc:creator", "an expedition"), "otus/otu", None)
            .unwrap();

        let MetadataView::Table(table) = get_metadata(&doc, "otus/otu").unwrap() else {
            panic!("expected a flat table");
        };
        assert_eq!(table.columns, vec!["dc:source", "dc:creator"]);
        assert_eq!(table.rows[0][0].as_deref(), Some("trap 7"));
        assert_eq!(table.rows[1][0], None, "absence must stay explicit");
        assert_eq!(table.rows[1][1].as_deref(), Some("an expedition"));
    }

    #[test]
    fn metadata_all_returns_raw_annotations() {
        let mut doc = Document::new();
        doc.add_metadata(
            Meta::text("dc:title", "study").with_children(vec![Meta::resource(
                "dcterms:source",
                "http://example.org/",
            )]),
            "document",
            None,
        )
        .unwrap();

        doc.insert_otus_block(OtusBlock {
            id: "otus1".to_owned(),
            label: None,
            otus: vec![Otu {
                id: "t1".to_owned(),
                label: Some("Homo sapiens".to_owned()),
                meta: Vec::new(),
            }],
            meta: Vec::new(),
        })
        .unwrap();

        let MetadataView::Raw(raw) = get_metadata(&doc, "all").unwrap() else {
            panic!("expected the raw mapping");
        };
        assert_eq!(raw.len(), 3);
        assert_eq!(raw["document"][0].children.len(), 1);
        // Unannotated entities still appear, with empty lists.
        assert!(raw["otus1"].is_empty());
        assert!(raw["t1"].is_empty());
    }

    #[test]
    fn unknown_level_is_rejected() {
        let doc = Document::new();
        let err = get_metadata(&doc, "otus/leaf").unwrap_err();
        assert!(matches!(err, NexmlError::UnknownLevel(_)));
    }

    #[test]
    fn same_taxon_set_merges_into_one_wide_table() {
        let doc = add_characters_block(discrete(&[("A", "0"), ("B", "1")]), None).unwrap();
        let mut second = MatrixDraft::new(DataKind::Continuous);
        second.column("mass", None);
        second.row("A", vec![Some("12.5".to_owned())]);
        second.row("B", vec![Some("7.25".to_owned())]);
        let doc = add_characters_block(second, Some(doc)).unwrap();

        let CharactersView::Single(table) = get_characters(&doc, false) else {
            panic!("identical taxon sets must merge into a single table");
        };
        assert_eq!(table.columns, vec!["eyes", "mass"]);
        assert_eq!(table.row_names, vec!["A", "B"]);
        assert_eq!(table.rows[0], vec![Some("0".to_owned()), Some("12.5".to_owned())]);
    }

    #[test]
    fn differing_taxon_sets_stay_separate() {
        let doc = add_characters_block(discrete(&[("A", "0"), ("B", "1")]), None).unwrap();
        let doc =
            add_characters_block(discrete(&[("A", "0"), ("C", "1")]), Some(doc)).unwrap();

        let CharactersView::ByBlock(tables) = get_characters(&doc, false) else {
            panic!("differing taxon sets must not merge");
        };
        assert_eq!(tables.len(), 2);
        for table in tables.values() {
            assert_eq!(table.rows.len(), 2, "no row padding across sets");
        }
    }

    #[test]
    fn sparse_rows_surface_missing_data_as_none() {
        let mut draft = MatrixDraft::new(DataKind::Discrete);
        draft.column("eyes", Some(vec!["0".to_owned(), "1".to_owned()]));
        draft.row("A", vec![Some("1".to_owned())]);
        draft.row("B", vec![None]);
        let doc = add_characters_block(draft, None).unwrap();

        let CharactersView::Single(table) = get_characters(&doc, false) else {
            panic!("one block, one table");
        };
        assert_eq!(table.rows[1], vec![None]);
    }

    #[test]
    fn rownames_as_column_prepends_a_taxon_column() {
        let doc = add_characters_block(discrete(&[("A", "0")]), None).unwrap();
        let CharactersView::Single(table) = get_characters(&doc, true) else {
            panic!("one block, one table");
        };
        assert_eq!(table.columns[0], "taxon");
        assert_eq!(table.rows[0][0].as_deref(), Some("A"));
    }

    #[test]
    fn trees_views_match_cardinality() {
        let doc = add_tree_block(vec![star_draft(&["A", "B"])], None).unwrap();
        assert!(matches!(get_trees(&doc), TreesView::Single(_)));

        let doc = add_tree_block(
            vec![star_draft(&["A", "B"]), star_draft(&["A", "B"])],
            None,
        )
        .unwrap();
        assert!(matches!(get_trees(&doc), TreesView::Block(b) if b.len() == 2));

        let doc = add_tree_block(vec![star_draft(&["C", "D"])], Some(doc)).unwrap();
        assert!(matches!(get_trees(&doc), TreesView::Blocks(b) if b.len() == 2));
        assert_eq!(get_trees_list(&doc).len(), 2);
    }

    #[test]
    fn projections_do_not_mutate() {
        let doc = add_tree_block(vec![star_draft(&["A", "B"])], None).unwrap();
        let before = doc.clone();
        let _ = get_trees(&doc);
        let _ = get_trees_list(&doc);
        let _ = get_characters(&doc, true);
        let _ = get_metadata(&doc, "all").unwrap();
        assert_eq!(doc, before);
    }
}
