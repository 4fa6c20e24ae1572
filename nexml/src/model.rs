//! Entity types of the document object model.
//!
//! Blocks own their entities as plain `Vec`s and entities reference each
//! other by id, an arena-style layout: trees are flat vectors of nodes and
//! edges linked by node ids rather than pointer graphs. Every entity
//! carries its own ordered list of [`Meta`] annotations.
//!
//! The `*Draft` types at the bottom are label-first builders for callers
//! composing data before any document exists; identifiers are allocated
//! when a draft is materialized into a [`Document`](crate::Document).

use std::collections::BTreeSet;

use crate::meta::Meta;

/// An operational taxonomic unit: a labeled taxon/sample referenced by
/// tree tips and matrix rows.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Otu {
    /// Document-unique identifier.
    pub id: String,
    /// Taxon label; optional.
    pub label: Option<String>,
    /// Annotations attached to this OTU.
    pub meta: Vec<Meta>,
}

/// An ordered set of OTUs sharing one identifier space.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OtusBlock {
    /// Document-unique identifier.
    pub id: String,
    /// Block label; optional.
    pub label: Option<String>,
    /// The OTUs, in insertion order.
    pub otus: Vec<Otu>,
    /// Annotations attached to the block itself.
    pub meta: Vec<Meta>,
}

impl OtusBlock {
    /// The set of taxon labels in this block. Unlabeled OTUs are skipped.
    #[must_use]
    pub fn label_set(&self) -> BTreeSet<&str> {
        self.otus
            .iter()
            .filter_map(|o| o.label.as_deref())
            .collect()
    }

    /// Looks up an OTU by id.
    #[must_use]
    pub fn otu(&self, id: &str) -> Option<&Otu> {
        self.otus.iter().find(|o| o.id == id)
    }

    /// Looks up an OTU by taxon label.
    #[must_use]
    pub fn otu_by_label(&self, label: &str) -> Option<&Otu> {
        self.otus.iter().find(|o| o.label.as_deref() == Some(label))
    }
}

/// A vertex of a tree. Tip nodes reference exactly one OTU; internal
/// nodes carry no OTU reference.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    /// Document-unique identifier.
    pub id: String,
    /// Display label; optional.
    pub label: Option<String>,
    /// Referenced OTU id, for tip nodes.
    pub otu: Option<String>,
    /// Whether this node is the designated root.
    pub root: bool,
    /// Annotations attached to this node.
    pub meta: Vec<Meta>,
}

/// A directed edge between two nodes of the same tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Edge {
    /// Document-unique identifier.
    pub id: String,
    /// Id of the parent-side node.
    pub source: String,
    /// Id of the child-side node.
    pub target: String,
    /// Branch length; non-negative when present.
    pub length: Option<f64>,
    /// Annotations attached to this edge.
    pub meta: Vec<Meta>,
}

/// A connected graph of nodes and edges, rooted when some node carries the
/// root flag.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tree {
    /// Document-unique identifier.
    pub id: String,
    /// Tree label; optional.
    pub label: Option<String>,
    /// All nodes, arena-style.
    pub nodes: Vec<Node>,
    /// All edges; endpoints are node ids within this tree.
    pub edges: Vec<Edge>,
    /// Annotations attached to the tree.
    pub meta: Vec<Meta>,
}

impl Tree {
    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Tip nodes: nodes that are the source of no edge.
    #[must_use]
    pub fn tips(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| !self.edges.iter().any(|e| e.source == n.id))
            .collect()
    }

    /// Whether the tree is rooted, i.e. some node carries the root flag.
    #[must_use]
    pub fn is_rooted(&self) -> bool {
        self.nodes.iter().any(|n| n.root)
    }
}

/// An ordered collection of trees sharing one OTU block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeBlock {
    /// Document-unique identifier.
    pub id: String,
    /// Block label; optional.
    pub label: Option<String>,
    /// Id of the referenced OTU block.
    pub otus: String,
    /// The trees, in insertion order.
    pub trees: Vec<Tree>,
    /// Annotations attached to the block itself.
    pub meta: Vec<Meta>,
}

/// Declared data kind of a character matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataKind {
    /// Discrete standard characters with enumerable state spaces.
    Discrete,
    /// Continuous-valued characters.
    Continuous,
    /// Molecular sequence characters.
    Molecular,
}

impl DataKind {
    /// The `xsi:type` written on the wire for this kind.
    #[must_use]
    pub fn xsi_type(self) -> &'static str {
        match self {
            DataKind::Discrete => "nex:StandardCells",
            DataKind::Continuous => "nex:ContinuousCells",
            DataKind::Molecular => "nex:DnaSeqs",
        }
    }

    /// Parses a wire-format `xsi:type`.
    #[must_use]
    pub fn from_xsi_type(xsi_type: &str) -> Option<Self> {
        match xsi_type {
            "nex:StandardCells" => Some(DataKind::Discrete),
            "nex:ContinuousCells" => Some(DataKind::Continuous),
            "nex:DnaSeqs" => Some(DataKind::Molecular),
            _ => None,
        }
    }
}

/// A character (column) definition.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacterDef {
    /// Document-unique identifier.
    pub id: String,
    /// Column label; optional.
    pub label: Option<String>,
    /// State space symbols, for discrete/molecular kinds only.
    pub states: Option<Vec<String>>,
    /// Annotations attached to this column.
    pub meta: Vec<Meta>,
}

/// One matrix row, keyed by OTU id. Rows are sparse: declared cells need
/// not cover every column or every OTU of the block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatrixRow {
    /// Document-unique identifier.
    pub id: String,
    /// Id of the OTU this row describes.
    pub otu: String,
    /// Cell values keyed by character id; absent keys are missing data.
    pub cells: std::collections::BTreeMap<String, String>,
    /// Annotations attached to this row.
    pub meta: Vec<Meta>,
}

/// A character matrix of one kind over one OTU block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharactersBlock {
    /// Document-unique identifier.
    pub id: String,
    /// Block label; optional.
    pub label: Option<String>,
    /// Id of the referenced OTU block.
    pub otus: String,
    /// Declared data kind.
    pub kind: DataKind,
    /// Ordered column definitions.
    pub chars: Vec<CharacterDef>,
    /// Rows in insertion order.
    pub rows: Vec<MatrixRow>,
    /// Annotations attached to the block itself.
    pub meta: Vec<Meta>,
}

impl CharactersBlock {
    /// Looks up a column definition by id.
    #[must_use]
    pub fn character(&self, id: &str) -> Option<&CharacterDef> {
        self.chars.iter().find(|c| c.id == id)
    }

    /// Looks up the row for an OTU id.
    #[must_use]
    pub fn row_for(&self, otu: &str) -> Option<&MatrixRow> {
        self.rows.iter().find(|r| r.otu == otu)
    }
}

// ---------------------------------------------------------------------------
// Drafts: label-first builders, materialized by Document operations.
// ---------------------------------------------------------------------------

/// A vertex of a [`TreeDraft`], indexed positionally.
#[derive(Debug, Clone)]
pub(crate) struct DraftVertex {
    pub(crate) label: Option<String>,
    pub(crate) length: Option<f64>,
    pub(crate) children: Vec<usize>,
}

/// A tree under construction, before any identifiers exist.
///
/// Built bottom-up: create leaves first, then internal vertices over their
/// children, then designate the top vertex with [`TreeDraft::set_root`].
/// Tips are referenced by taxon label; OTU links are resolved when the
/// draft is materialized into a document.
#[derive(Debug, Clone, Default)]
pub struct TreeDraft {
    /// Tree label carried onto the materialized tree.
    pub label: Option<String>,
    pub(crate) vertices: Vec<DraftVertex>,
    pub(crate) root: Option<usize>,
    pub(crate) rooted: bool,
}

impl TreeDraft {
    /// Creates an empty draft. Drafts are rooted unless
    /// [`TreeDraft::set_unrooted`] is called.
    #[must_use]
    pub fn new() -> Self {
        Self {
            label: None,
            vertices: Vec::new(),
            root: None,
            rooted: true,
        }
    }

    /// Attaches a label to the draft.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Adds a tip vertex with a taxon label and an optional incoming
    /// branch length. Returns the vertex index.
    pub fn leaf(&mut self, label: impl Into<String>, length: Option<f64>) -> usize {
        self.vertices.push(DraftVertex {
            label: Some(label.into()),
            length,
            children: Vec::new(),
        });
        self.vertices.len() - 1
    }

    /// Adds an internal vertex over existing children. Returns the vertex
    /// index.
    pub fn internal(&mut self, children: Vec<usize>, length: Option<f64>) -> usize {
        self.vertices.push(DraftVertex {
            label: None,
            length,
            children,
        });
        self.vertices.len() - 1
    }

    /// Designates the top vertex of the draft.
    pub fn set_root(&mut self, vertex: usize) {
        self.root = Some(vertex);
    }

    /// Marks the materialized tree as unrooted: the top vertex remains the
    /// traversal origin but no node carries the root flag.
    pub fn set_unrooted(&mut self) {
        self.rooted = false;
    }

    /// The set of tip labels in this draft.
    #[must_use]
    pub fn tip_labels(&self) -> BTreeSet<&str> {
        self.vertices
            .iter()
            .filter(|v| v.children.is_empty())
            .filter_map(|v| v.label.as_deref())
            .collect()
    }
}

/// One column of a [`MatrixDraft`].
#[derive(Debug, Clone)]
pub(crate) struct DraftColumn {
    pub(crate) label: String,
    pub(crate) states: Option<Vec<String>>,
}

/// A character matrix under construction, rows keyed by taxon label.
#[derive(Debug, Clone)]
pub struct MatrixDraft {
    /// Block label carried onto the materialized block.
    pub label: Option<String>,
    /// Declared data kind.
    pub kind: DataKind,
    pub(crate) columns: Vec<DraftColumn>,
    pub(crate) rows: Vec<(String, Vec<Option<String>>)>,
}

impl MatrixDraft {
    /// Creates an empty draft of the given kind.
    #[must_use]
    pub fn new(kind: DataKind) -> Self {
        Self {
            label: None,
            kind,
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Attaches a label to the draft.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Appends a column. `states` declares the state-space symbols for
    /// discrete/molecular kinds; pass `None` for continuous data.
    pub fn column(&mut self, label: impl Into<String>, states: Option<Vec<String>>) {
        self.columns.push(DraftColumn {
            label: label.into(),
            states,
        });
    }

    /// Appends a row for `taxon`. `cells` aligns positionally with the
    /// columns added so far; `None` marks missing data. Rows shorter than
    /// the column list are valid (sparse matrices).
    pub fn row(&mut self, taxon: impl Into<String>, cells: Vec<Option<String>>) {
        self.rows.push((taxon.into(), cells));
    }

    /// The set of taxon labels in this draft.
    #[must_use]
    pub fn taxon_labels(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|(t, _)| t.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_tip_labels_ignore_internals() {
        let mut draft = TreeDraft::new();
        let a = draft.leaf("A", Some(1.0));
        let b = draft.leaf("B", Some(2.0));
        let r = draft.internal(vec![a, b], None);
        draft.set_root(r);
        let labels: Vec<&str> = draft.tip_labels().into_iter().collect();
        assert_eq!(labels, vec!["A", "B"]);
    }

    #[test]
    fn tips_are_nodes_without_outgoing_edges() {
        let tree = Tree {
            id: "tree1".to_owned(),
            label: None,
            nodes: vec![
                Node {
                    id: "node1".to_owned(),
                    label: None,
                    otu: None,
                    root: true,
                    meta: Vec::new(),
                },
                Node {
                    id: "node2".to_owned(),
                    label: Some("A".to_owned()),
                    otu: Some("otu1".to_owned()),
                    root: false,
                    meta: Vec::new(),
                },
            ],
            edges: vec![Edge {
                id: "edge1".to_owned(),
                source: "node1".to_owned(),
                target: "node2".to_owned(),
                length: Some(0.5),
                meta: Vec::new(),
            }],
            meta: Vec::new(),
        };
        let tips = tree.tips();
        assert_eq!(tips.len(), 1);
        assert_eq!(tips[0].id, "node2");
        assert!(tree.is_rooted());
    }

    #[test]
    fn label_set_is_order_free() {
        let block = OtusBlock {
            id: "otus1".to_owned(),
            label: None,
            otus: vec![
                Otu {
                    id: "otu1".to_owned(),
                    label: Some("C".to_owned()),
                    meta: Vec::new(),
                },
                Otu {
                    id: "otu2".to_owned(),
                    label: Some("A".to_owned()),
                    meta: Vec::new(),
                },
            ],
            meta: Vec::new(),
        };
        let labels: Vec<&str> = block.label_set().into_iter().collect();
        assert_eq!(labels, vec!["A", "C"]);
    }
}
