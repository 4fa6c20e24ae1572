//! The document object model: ownership, identifier allocation, and the
//! additive operations callers build documents with.
//!
//! A [`Document`] owns its OTU blocks, tree blocks, characters blocks, one
//! [`NamespaceRegistry`], and an ordered list of root-level annotations.
//! Mutations are all-or-nothing: each operation assembles a candidate
//! state, runs the full invariant sweep ([`Document::verify`]), and only
//! then replaces the previous state, so a rejected call leaves the
//! document exactly as it was.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use crate::error::NexmlError;
use crate::meta::Meta;
use crate::model::{
    CharacterDef, CharactersBlock, DataKind, Edge, MatrixDraft, MatrixRow, Node, Otu, OtusBlock,
    Tree, TreeBlock, TreeDraft,
};
use crate::namespace::NamespaceRegistry;

/// Position of a top-level block in document addition order. Encoding
/// walks this sequence so the wire format preserves interleaved addition
/// order across block kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    /// An OTU block, by index into the document's OTU block list.
    Otus(usize),
    /// A tree block, by index.
    Trees(usize),
    /// A characters block, by index.
    Characters(usize),
}

/// An attachment level for metadata operations and projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaLevel {
    /// The document root.
    Document,
    /// Every OTU block.
    Otus,
    /// Every OTU.
    Otu,
    /// Every tree block.
    Trees,
    /// Every tree.
    Tree,
    /// Every tree node.
    Node,
    /// Every tree edge.
    Edge,
    /// Every characters block.
    Characters,
    /// Every character (column) definition.
    Char,
    /// Every matrix row.
    Row,
}

impl MetaLevel {
    /// The level string as callers write it.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MetaLevel::Document => "document",
            MetaLevel::Otus => "otus",
            MetaLevel::Otu => "otus/otu",
            MetaLevel::Trees => "trees",
            MetaLevel::Tree => "trees/tree",
            MetaLevel::Node => "trees/tree/node",
            MetaLevel::Edge => "trees/tree/edge",
            MetaLevel::Characters => "characters",
            MetaLevel::Char => "characters/char",
            MetaLevel::Row => "characters/row",
        }
    }
}

impl FromStr for MetaLevel {
    type Err = NexmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(MetaLevel::Document),
            "otus" => Ok(MetaLevel::Otus),
            "otus/otu" => Ok(MetaLevel::Otu),
            "trees" => Ok(MetaLevel::Trees),
            "trees/tree" => Ok(MetaLevel::Tree),
            "trees/tree/node" => Ok(MetaLevel::Node),
            "trees/tree/edge" => Ok(MetaLevel::Edge),
            "characters" => Ok(MetaLevel::Characters),
            "characters/char" => Ok(MetaLevel::Char),
            "characters/row" => Ok(MetaLevel::Row),
            other => Err(NexmlError::UnknownLevel(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct IdAllocator {
    counters: BTreeMap<&'static str, u64>,
}

impl IdAllocator {
    fn next(&mut self, kind: &'static str) -> String {
        let counter = self.counters.entry(kind).or_insert(0);
        *counter += 1;
        format!("{kind}{counter}")
    }
}

/// A phylogenetic data-exchange document.
#[derive(Debug, Clone)]
pub struct Document {
    registry: NamespaceRegistry,
    meta: Vec<Meta>,
    otus: Vec<OtusBlock>,
    trees: Vec<TreeBlock>,
    characters: Vec<CharactersBlock>,
    order: Vec<BlockRef>,
    ids: IdAllocator,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

// Identifier allocation state is bookkeeping, not document content; two
// documents with the same entities, annotations, and bindings are equal.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.registry == other.registry
            && self.meta == other.meta
            && self.otus == other.otus
            && self.trees == other.trees
            && self.characters == other.characters
            && self.order == other.order
    }
}

impl Document {
    /// Creates an empty document with the default namespace registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: NamespaceRegistry::new(),
            meta: Vec::new(),
            otus: Vec::new(),
            trees: Vec::new(),
            characters: Vec::new(),
            order: Vec::new(),
            ids: IdAllocator::default(),
        }
    }

    pub(crate) fn from_parts(
        registry: NamespaceRegistry,
        meta: Vec<Meta>,
        otus: Vec<OtusBlock>,
        trees: Vec<TreeBlock>,
        characters: Vec<CharactersBlock>,
        order: Vec<BlockRef>,
    ) -> Result<Self, NexmlError> {
        let doc = Self {
            registry,
            meta,
            otus,
            trees,
            characters,
            order,
            ids: IdAllocator::default(),
        };
        doc.verify()?;
        Ok(doc)
    }

    /// The document's namespace registry.
    #[must_use]
    pub fn registry(&self) -> &NamespaceRegistry {
        &self.registry
    }

    /// Registers a namespace binding on the document's registry.
    ///
    /// # Errors
    ///
    /// [`NexmlError::NamespaceConflict`] on a rebind to a different URI.
    pub fn register_namespace(&mut self, prefix: &str, uri: &str) -> Result<(), NexmlError> {
        self.registry.register(prefix, uri)
    }

    /// Root-level annotations, in attachment order.
    #[must_use]
    pub fn root_meta(&self) -> &[Meta] {
        &self.meta
    }

    /// All OTU blocks, in addition order.
    #[must_use]
    pub fn otus_blocks(&self) -> &[OtusBlock] {
        &self.otus
    }

    /// All tree blocks, in addition order.
    #[must_use]
    pub fn tree_blocks(&self) -> &[TreeBlock] {
        &self.trees
    }

    /// All characters blocks, in addition order.
    #[must_use]
    pub fn characters_blocks(&self) -> &[CharactersBlock] {
        &self.characters
    }

    /// Top-level block addition order across kinds.
    #[must_use]
    pub fn block_order(&self) -> &[BlockRef] {
        &self.order
    }

    /// Looks up an OTU block by id.
    #[must_use]
    pub fn otus_block(&self, id: &str) -> Option<&OtusBlock> {
        self.otus.iter().find(|b| b.id == id)
    }

    /// Looks up an OTU by id across all blocks.
    #[must_use]
    pub fn find_otu(&self, id: &str) -> Option<&Otu> {
        self.otus.iter().find_map(|b| b.otu(id))
    }

    fn id_in_use(&self, kind: &'static str, id: &str) -> bool {
        match kind {
            "otus" => self.otus.iter().any(|b| b.id == id),
            "otu" => self.otus.iter().any(|b| b.otus.iter().any(|o| o.id == id)),
            "trees" => self.trees.iter().any(|b| b.id == id),
            "tree" => self
                .trees
                .iter()
                .any(|b| b.trees.iter().any(|t| t.id == id)),
            "node" => self
                .trees
                .iter()
                .flat_map(|b| &b.trees)
                .any(|t| t.nodes.iter().any(|n| n.id == id)),
            "edge" => self
                .trees
                .iter()
                .flat_map(|b| &b.trees)
                .any(|t| t.edges.iter().any(|e| e.id == id)),
            "characters" => self.characters.iter().any(|b| b.id == id),
            "char" => self
                .characters
                .iter()
                .any(|b| b.chars.iter().any(|c| c.id == id)),
            "row" => self
                .characters
                .iter()
                .any(|b| b.rows.iter().any(|r| r.id == id)),
            _ => false,
        }
    }

    fn fresh_id(&mut self, kind: &'static str) -> String {
        loop {
            let id = self.ids.next(kind);
            if !self.id_in_use(kind, &id) {
                return id;
            }
        }
    }

    /// Returns the id of an OTU block whose taxon label set equals
    /// `labels` (order-free, value equality), creating a new block if none
    /// matches. Duplicate labels in the input are collapsed to their first
    /// occurrence. This is an equality-of-sets rule: a subset or superset
    /// never reuses an existing block.
    pub fn add_otus_if_absent(&mut self, labels: &[String]) -> String {
        let mut unique: Vec<&str> = Vec::new();
        for label in labels {
            if !unique.contains(&label.as_str()) {
                unique.push(label);
            }
        }
        let wanted: std::collections::BTreeSet<&str> = unique.iter().copied().collect();

        if let Some(block) = self.otus.iter().find(|b| b.label_set() == wanted) {
            log::debug!("reusing OTU block `{}` for {} taxa", block.id, wanted.len());
            return block.id.clone();
        }

        let block_id = self.fresh_id("otus");
        let otus = unique
            .iter()
            .map(|label| Otu {
                id: self.fresh_id("otu"),
                label: Some((*label).to_owned()),
                meta: Vec::new(),
            })
            .collect::<Vec<_>>();
        self.otus.push(OtusBlock {
            id: block_id.clone(),
            label: None,
            otus,
            meta: Vec::new(),
        });
        self.order.push(BlockRef::Otus(self.otus.len() - 1));
        block_id
    }

    /// Materializes `drafts` into a new tree block, reusing an existing
    /// OTU block when the drafts' combined tip label set matches one
    /// exactly, and returns the new block's id.
    ///
    /// # Errors
    ///
    /// [`NexmlError::UnlinkedTip`] if a draft tip has no taxon label,
    /// [`NexmlError::NegativeLength`] for a negative branch length, or any
    /// invariant violation from the final verification sweep. On error the
    /// document is unchanged.
    pub fn append_tree_block(&mut self, drafts: Vec<TreeDraft>) -> Result<String, NexmlError> {
        let mut labels: Vec<String> = Vec::new();
        for draft in &drafts {
            for vertex in &draft.vertices {
                if vertex.children.is_empty() {
                    if let Some(label) = &vertex.label {
                        if !labels.contains(label) {
                            labels.push(label.clone());
                        }
                    }
                }
            }
        }

        let mut next = self.clone();
        let otus_id = next.add_otus_if_absent(&labels);
        let by_label: BTreeMap<String, String> = next
            .otus_block(&otus_id)
            .map(|b| {
                b.otus
                    .iter()
                    .filter_map(|o| o.label.clone().map(|l| (l, o.id.clone())))
                    .collect()
            })
            .unwrap_or_default();

        let block_id = next.fresh_id("trees");
        let mut trees = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let tree = next.materialize_tree(draft, &by_label)?;
            trees.push(tree);
        }
        next.trees.push(TreeBlock {
            id: block_id.clone(),
            label: None,
            otus: otus_id,
            trees,
            meta: Vec::new(),
        });
        next.order.push(BlockRef::Trees(next.trees.len() - 1));
        next.verify()?;
        *self = next;
        Ok(block_id)
    }

    fn materialize_tree(
        &mut self,
        draft: TreeDraft,
        by_label: &BTreeMap<String, String>,
    ) -> Result<Tree, NexmlError> {
        let tree_id = self.fresh_id("tree");

        // Each vertex may have at most one parent; anything else is not a
        // tree.
        let mut seen_child: HashSet<usize> = HashSet::new();
        for vertex in &draft.vertices {
            for child in &vertex.children {
                if *child >= draft.vertices.len() {
                    return Err(NexmlError::Malformed(format!(
                        "draft vertex index {child} out of range"
                    )));
                }
                if !seen_child.insert(*child) {
                    return Err(NexmlError::Malformed(format!(
                        "draft vertex {child} has more than one parent"
                    )));
                }
            }
        }

        let node_ids: Vec<String> = draft
            .vertices
            .iter()
            .map(|_| self.fresh_id("node"))
            .collect();

        let mut nodes = Vec::with_capacity(draft.vertices.len());
        for (index, vertex) in draft.vertices.iter().enumerate() {
            let otu = if vertex.children.is_empty() {
                let label = vertex
                    .label
                    .as_deref()
                    .ok_or_else(|| NexmlError::UnlinkedTip(node_ids[index].clone()))?;
                let otu = by_label
                    .get(label)
                    .ok_or_else(|| NexmlError::DanglingReference(label.to_owned()))?;
                Some(otu.clone())
            } else {
                None
            };
            nodes.push(Node {
                id: node_ids[index].clone(),
                label: vertex.label.clone(),
                otu,
                root: draft.rooted && draft.root == Some(index),
                meta: Vec::new(),
            });
        }

        let mut edges = Vec::new();
        for (index, vertex) in draft.vertices.iter().enumerate() {
            for child in &vertex.children {
                let edge_id = self.fresh_id("edge");
                let length = draft.vertices[*child].length;
                if let Some(length) = length {
                    if length < 0.0 {
                        return Err(NexmlError::NegativeLength {
                            edge: edge_id,
                            length,
                        });
                    }
                }
                edges.push(Edge {
                    id: edge_id,
                    source: node_ids[index].clone(),
                    target: node_ids[*child].clone(),
                    length,
                    meta: Vec::new(),
                });
            }
        }

        Ok(Tree {
            id: tree_id,
            label: draft.label,
            nodes,
            edges,
            meta: Vec::new(),
        })
    }

    /// Materializes `draft` into a new characters block, reusing an
    /// existing OTU block when the row taxon set matches one exactly, and
    /// returns the new block's id.
    ///
    /// # Errors
    ///
    /// [`NexmlError::UnexpectedStates`] for a state space on a continuous
    /// matrix, [`NexmlError::DuplicateId`] for two rows with the same
    /// taxon, [`NexmlError::Malformed`] for rows wider than the column
    /// list, or any invariant violation from the final verification sweep.
    /// On error the document is unchanged.
    pub fn append_characters_block(&mut self, draft: MatrixDraft) -> Result<String, NexmlError> {
        if draft.kind == DataKind::Continuous {
            if let Some(col) = draft.columns.iter().find(|c| c.states.is_some()) {
                return Err(NexmlError::UnexpectedStates(col.label.clone()));
            }
        }

        let mut labels: Vec<String> = Vec::new();
        for (taxon, _) in &draft.rows {
            if labels.contains(taxon) {
                return Err(NexmlError::DuplicateId(taxon.clone()));
            }
            labels.push(taxon.clone());
        }

        let mut next = self.clone();
        let otus_id = next.add_otus_if_absent(&labels);
        let by_label: BTreeMap<String, String> = next
            .otus_block(&otus_id)
            .map(|b| {
                b.otus
                    .iter()
                    .filter_map(|o| o.label.clone().map(|l| (l, o.id.clone())))
                    .collect()
            })
            .unwrap_or_default();

        let block_id = next.fresh_id("characters");
        let chars: Vec<CharacterDef> = draft
            .columns
            .iter()
            .map(|col| CharacterDef {
                id: next.fresh_id("char"),
                label: Some(col.label.clone()),
                states: col.states.clone(),
                meta: Vec::new(),
            })
            .collect();

        let mut rows = Vec::with_capacity(draft.rows.len());
        for (taxon, cells) in &draft.rows {
            if cells.len() > chars.len() {
                return Err(NexmlError::Malformed(format!(
                    "row for `{taxon}` has {} cells but only {} columns are declared",
                    cells.len(),
                    chars.len()
                )));
            }
            let otu = by_label
                .get(taxon)
                .ok_or_else(|| NexmlError::DanglingReference(taxon.clone()))?;
            let mut keyed = BTreeMap::new();
            for (index, cell) in cells.iter().enumerate() {
                if let Some(value) = cell {
                    keyed.insert(chars[index].id.clone(), value.clone());
                }
            }
            rows.push(MatrixRow {
                id: next.fresh_id("row"),
                otu: otu.clone(),
                cells: keyed,
                meta: Vec::new(),
            });
        }

        next.characters.push(CharactersBlock {
            id: block_id.clone(),
            label: draft.label.clone(),
            otus: otus_id,
            kind: draft.kind,
            chars,
            rows,
            meta: Vec::new(),
        });
        next.order.push(BlockRef::Characters(next.characters.len() - 1));
        next.verify()?;
        *self = next;
        Ok(block_id)
    }

    /// Inserts a fully-formed, id-linked OTU block. Used by decoding and
    /// by adapters that manage their own identifiers.
    ///
    /// # Errors
    ///
    /// Any invariant violation (duplicate identifiers, unresolvable
    /// annotation prefixes) rejects the insert with the document
    /// unchanged.
    pub fn insert_otus_block(&mut self, block: OtusBlock) -> Result<(), NexmlError> {
        let mut next = self.clone();
        next.otus.push(block);
        next.order.push(BlockRef::Otus(next.otus.len() - 1));
        next.verify()?;
        *self = next;
        Ok(())
    }

    /// Inserts a fully-formed, id-linked tree block. Every tip must
    /// reference an OTU id that resolves in some block of this document.
    ///
    /// # Errors
    ///
    /// [`NexmlError::DanglingReference`] naming the unresolvable OTU id,
    /// or any other invariant violation; the document is unchanged.
    pub fn insert_tree_block(&mut self, block: TreeBlock) -> Result<(), NexmlError> {
        let mut next = self.clone();
        next.trees.push(block);
        next.order.push(BlockRef::Trees(next.trees.len() - 1));
        next.verify()?;
        *self = next;
        Ok(())
    }

    /// Inserts a fully-formed, id-linked characters block. Every row key
    /// must resolve inside the referenced block's OTU set.
    ///
    /// # Errors
    ///
    /// [`NexmlError::DanglingReference`] naming the unresolvable OTU id,
    /// or any other invariant violation; the document is unchanged.
    pub fn insert_characters_block(&mut self, block: CharactersBlock) -> Result<(), NexmlError> {
        let mut next = self.clone();
        next.characters.push(block);
        next.order.push(BlockRef::Characters(next.characters.len() - 1));
        next.verify()?;
        *self = next;
        Ok(())
    }

    /// Attaches `meta` at `level`.
    ///
    /// With `target = Some(id)`, attaches to that entity only. With
    /// `target = None` and an entity level, attaches to **every entity
    /// currently existing** at that level — a deliberate "apply now"
    /// snapshot, not a live query: entities added later are unaffected.
    /// Repeated calls with equal content append duplicates; annotations
    /// are never silently merged.
    ///
    /// # Errors
    ///
    /// [`NexmlError::UnknownLevel`] for an unrecognized level string,
    /// [`NexmlError::UnresolvedNamespace`] if any prefix in `meta` or its
    /// descendants is unregistered, or [`NexmlError::UnknownTarget`] if
    /// `target` matches nothing. Nothing is attached on error.
    pub fn add_metadata(
        &mut self,
        meta: Meta,
        level: &str,
        target: Option<&str>,
    ) -> Result<(), NexmlError> {
        let level = MetaLevel::from_str(level)?;
        meta.resolve(&self.registry)?;

        if level == MetaLevel::Document {
            self.meta.push(meta);
            return Ok(());
        }

        match target {
            Some(id) => {
                let slot =
                    self.meta_slot_mut(level, id)
                        .ok_or_else(|| NexmlError::UnknownTarget {
                            level: level.as_str().to_owned(),
                            id: id.to_owned(),
                        })?;
                slot.push(meta);
            }
            None => {
                for slot in self.meta_slots_mut(level) {
                    slot.push(meta.clone());
                }
            }
        }
        Ok(())
    }

    fn meta_slot_mut(&mut self, level: MetaLevel, id: &str) -> Option<&mut Vec<Meta>> {
        match level {
            MetaLevel::Document => Some(&mut self.meta),
            MetaLevel::Otus => self
                .otus
                .iter_mut()
                .find(|b| b.id == id)
                .map(|b| &mut b.meta),
            MetaLevel::Otu => self
                .otus
                .iter_mut()
                .flat_map(|b| b.otus.iter_mut())
                .find(|o| o.id == id)
                .map(|o| &mut o.meta),
            MetaLevel::Trees => self
                .trees
                .iter_mut()
                .find(|b| b.id == id)
                .map(|b| &mut b.meta),
            MetaLevel::Tree => self
                .trees
                .iter_mut()
                .flat_map(|b| b.trees.iter_mut())
                .find(|t| t.id == id)
                .map(|t| &mut t.meta),
            MetaLevel::Node => self
                .trees
                .iter_mut()
                .flat_map(|b| b.trees.iter_mut())
                .flat_map(|t| t.nodes.iter_mut())
                .find(|n| n.id == id)
                .map(|n| &mut n.meta),
            MetaLevel::Edge => self
                .trees
                .iter_mut()
                .flat_map(|b| b.trees.iter_mut())
                .flat_map(|t| t.edges.iter_mut())
                .find(|e| e.id == id)
                .map(|e| &mut e.meta),
            MetaLevel::Characters => self
                .characters
                .iter_mut()
                .find(|b| b.id == id)
                .map(|b| &mut b.meta),
            MetaLevel::Char => self
                .characters
                .iter_mut()
                .flat_map(|b| b.chars.iter_mut())
                .find(|c| c.id == id)
                .map(|c| &mut c.meta),
            MetaLevel::Row => self
                .characters
                .iter_mut()
                .flat_map(|b| b.rows.iter_mut())
                .find(|r| r.id == id)
                .map(|r| &mut r.meta),
        }
    }

    fn meta_slots_mut(&mut self, level: MetaLevel) -> Vec<&mut Vec<Meta>> {
        match level {
            MetaLevel::Document => vec![&mut self.meta],
            MetaLevel::Otus => self.otus.iter_mut().map(|b| &mut b.meta).collect(),
            MetaLevel::Otu => self
                .otus
                .iter_mut()
                .flat_map(|b| b.otus.iter_mut())
                .map(|o| &mut o.meta)
                .collect(),
            MetaLevel::Trees => self.trees.iter_mut().map(|b| &mut b.meta).collect(),
            MetaLevel::Tree => self
                .trees
                .iter_mut()
                .flat_map(|b| b.trees.iter_mut())
                .map(|t| &mut t.meta)
                .collect(),
            MetaLevel::Node => self
                .trees
                .iter_mut()
                .flat_map(|b| b.trees.iter_mut())
                .flat_map(|t| t.nodes.iter_mut())
                .map(|n| &mut n.meta)
                .collect(),
            MetaLevel::Edge => self
                .trees
                .iter_mut()
                .flat_map(|b| b.trees.iter_mut())
                .flat_map(|t| t.edges.iter_mut())
                .map(|e| &mut e.meta)
                .collect(),
            MetaLevel::Characters => self.characters.iter_mut().map(|b| &mut b.meta).collect(),
            MetaLevel::Char => self
                .characters
                .iter_mut()
                .flat_map(|b| b.chars.iter_mut())
                .map(|c| &mut c.meta)
                .collect(),
            MetaLevel::Row => self
                .characters
                .iter_mut()
                .flat_map(|b| b.rows.iter_mut())
                .map(|r| &mut r.meta)
                .collect(),
        }
    }

    /// Entity ids and their annotation lists at `level`, in document
    /// order. The projection engine builds its tables from this.
    #[must_use]
    pub fn meta_entries(&self, level: MetaLevel) -> Vec<(&str, &[Meta])> {
        match level {
            MetaLevel::Document => vec![("document", self.meta.as_slice())],
            MetaLevel::Otus => self
                .otus
                .iter()
                .map(|b| (b.id.as_str(), b.meta.as_slice()))
                .collect(),
            MetaLevel::Otu => self
                .otus
                .iter()
                .flat_map(|b| &b.otus)
                .map(|o| (o.id.as_str(), o.meta.as_slice()))
                .collect(),
            MetaLevel::Trees => self
                .trees
                .iter()
                .map(|b| (b.id.as_str(), b.meta.as_slice()))
                .collect(),
            MetaLevel::Tree => self
                .trees
                .iter()
                .flat_map(|b| &b.trees)
                .map(|t| (t.id.as_str(), t.meta.as_slice()))
                .collect(),
            MetaLevel::Node => self
                .trees
                .iter()
                .flat_map(|b| &b.trees)
                .flat_map(|t| &t.nodes)
                .map(|n| (n.id.as_str(), n.meta.as_slice()))
                .collect(),
            MetaLevel::Edge => self
                .trees
                .iter()
                .flat_map(|b| &b.trees)
                .flat_map(|t| &t.edges)
                .map(|e| (e.id.as_str(), e.meta.as_slice()))
                .collect(),
            MetaLevel::Characters => self
                .characters
                .iter()
                .map(|b| (b.id.as_str(), b.meta.as_slice()))
                .collect(),
            MetaLevel::Char => self
                .characters
                .iter()
                .flat_map(|b| &b.chars)
                .map(|c| (c.id.as_str(), c.meta.as_slice()))
                .collect(),
            MetaLevel::Row => self
                .characters
                .iter()
                .flat_map(|b| &b.rows)
                .map(|r| (r.id.as_str(), r.meta.as_slice()))
                .collect(),
        }
    }

    /// Runs the full invariant sweep: per-kind identifier uniqueness,
    /// referential integrity of every tip and row, branch length signs,
    /// state-space consistency, annotation prefix resolution, and block
    /// order consistency.
    ///
    /// # Errors
    ///
    /// The first violation found, naming the offending identifier or
    /// prefix.
    pub fn verify(&self) -> Result<(), NexmlError> {
        self.verify_unique_ids()?;
        self.verify_order()?;

        for meta in &self.meta {
            meta.resolve(&self.registry)?;
        }
        for block in &self.otus {
            for meta in &block.meta {
                meta.resolve(&self.registry)?;
            }
            for otu in &block.otus {
                for meta in &otu.meta {
                    meta.resolve(&self.registry)?;
                }
            }
        }

        for block in &self.trees {
            if self.otus_block(&block.otus).is_none() {
                return Err(NexmlError::DanglingReference(block.otus.clone()));
            }
            for meta in &block.meta {
                meta.resolve(&self.registry)?;
            }
            for tree in &block.trees {
                self.verify_tree(tree)?;
            }
        }

        for block in &self.characters {
            let otus = self
                .otus_block(&block.otus)
                .ok_or_else(|| NexmlError::DanglingReference(block.otus.clone()))?;
            self.verify_characters(block, otus)?;
        }

        Ok(())
    }

    fn verify_unique_ids(&self) -> Result<(), NexmlError> {
        fn check<'a>(ids: impl Iterator<Item = &'a str>) -> Result<(), NexmlError> {
            let mut seen: HashSet<&str> = HashSet::new();
            for id in ids {
                if !seen.insert(id) {
                    return Err(NexmlError::DuplicateId(id.to_owned()));
                }
            }
            Ok(())
        }

        check(self.otus.iter().map(|b| b.id.as_str()))?;
        check(
            self.otus
                .iter()
                .flat_map(|b| &b.otus)
                .map(|o| o.id.as_str()),
        )?;
        check(self.trees.iter().map(|b| b.id.as_str()))?;
        check(
            self.trees
                .iter()
                .flat_map(|b| &b.trees)
                .map(|t| t.id.as_str()),
        )?;
        check(
            self.trees
                .iter()
                .flat_map(|b| &b.trees)
                .flat_map(|t| &t.nodes)
                .map(|n| n.id.as_str()),
        )?;
        check(
            self.trees
                .iter()
                .flat_map(|b| &b.trees)
                .flat_map(|t| &t.edges)
                .map(|e| e.id.as_str()),
        )?;
        check(self.characters.iter().map(|b| b.id.as_str()))?;
        check(
            self.characters
                .iter()
                .flat_map(|b| &b.chars)
                .map(|c| c.id.as_str()),
        )?;
        check(
            self.characters
                .iter()
                .flat_map(|b| &b.rows)
                .map(|r| r.id.as_str()),
        )?;
        Ok(())
    }

    fn verify_order(&self) -> Result<(), NexmlError> {
        let mut seen: HashSet<(u8, usize)> = HashSet::new();
        for block in &self.order {
            let (kind, index, len) = match block {
                BlockRef::Otus(i) => (0u8, *i, self.otus.len()),
                BlockRef::Trees(i) => (1u8, *i, self.trees.len()),
                BlockRef::Characters(i) => (2u8, *i, self.characters.len()),
            };
            if index >= len || !seen.insert((kind, index)) {
                return Err(NexmlError::Malformed(
                    "block order does not cover every block exactly once".to_owned(),
                ));
            }
        }
        if seen.len() != self.otus.len() + self.trees.len() + self.characters.len() {
            return Err(NexmlError::Malformed(
                "block order does not cover every block exactly once".to_owned(),
            ));
        }
        Ok(())
    }

    fn verify_tree(&self, tree: &Tree) -> Result<(), NexmlError> {
        for meta in &tree.meta {
            meta.resolve(&self.registry)?;
        }
        for node in &tree.nodes {
            for meta in &node.meta {
                meta.resolve(&self.registry)?;
            }
            if let Some(otu) = &node.otu {
                if self.find_otu(otu).is_none() {
                    return Err(NexmlError::DanglingReference(otu.clone()));
                }
            }
        }
        for edge in &tree.edges {
            for meta in &edge.meta {
                meta.resolve(&self.registry)?;
            }
            if tree.node(&edge.source).is_none() || tree.node(&edge.target).is_none() {
                return Err(NexmlError::Malformed(format!(
                    "edge `{}` references a node outside tree `{}`",
                    edge.id, tree.id
                )));
            }
            if let Some(length) = edge.length {
                if length < 0.0 {
                    return Err(NexmlError::NegativeLength {
                        edge: edge.id.clone(),
                        length,
                    });
                }
            }
        }
        for tip in tree.tips() {
            if tip.otu.is_none() {
                return Err(NexmlError::UnlinkedTip(tip.id.clone()));
            }
        }
        Ok(())
    }

    fn verify_characters(
        &self,
        block: &CharactersBlock,
        otus: &OtusBlock,
    ) -> Result<(), NexmlError> {
        for meta in &block.meta {
            meta.resolve(&self.registry)?;
        }
        for def in &block.chars {
            for meta in &def.meta {
                meta.resolve(&self.registry)?;
            }
            if def.states.is_some() && block.kind == DataKind::Continuous {
                return Err(NexmlError::UnexpectedStates(
                    def.label.clone().unwrap_or_else(|| def.id.clone()),
                ));
            }
        }
        let mut seen_otus: HashSet<&str> = HashSet::new();
        for row in &block.rows {
            for meta in &row.meta {
                meta.resolve(&self.registry)?;
            }
            if otus.otu(&row.otu).is_none() {
                return Err(NexmlError::DanglingReference(row.otu.clone()));
            }
            if !seen_otus.insert(row.otu.as_str()) {
                return Err(NexmlError::DuplicateId(row.otu.clone()));
            }
            for (char_id, value) in &row.cells {
                let def = block.character(char_id).ok_or_else(|| {
                    NexmlError::Malformed(format!(
                        "row `{}` has a cell for unknown character `{char_id}`",
                        row.id
                    ))
                })?;
                if block.kind != DataKind::Continuous {
                    if let Some(states) = &def.states {
                        if !states.contains(value) {
                            return Err(NexmlError::Malformed(format!(
                                "cell value `{value}` is outside the state space of `{char_id}`"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Builds a tree block from `drafts` onto `document`, creating a fresh
/// document when `None` is given.
///
/// # Errors
///
/// See [`Document::append_tree_block`].
pub fn add_tree_block(
    drafts: Vec<TreeDraft>,
    document: Option<Document>,
) -> Result<Document, NexmlError> {
    let mut doc = document.unwrap_or_default();
    doc.append_tree_block(drafts)?;
    Ok(doc)
}

/// Builds a characters block from `draft` onto `document`, creating a
/// fresh document when `None` is given.
///
/// # Errors
///
/// See [`Document::append_characters_block`].
pub fn add_characters_block(
    draft: MatrixDraft,
    document: Option<Document>,
) -> Result<Document, NexmlError> {
    let mut doc = document.unwrap_or_default();
    doc.append_characters_block(draft)?;
    Ok(doc)
}

/// Attaches `meta` at `level` on `document`, creating a fresh document
/// when `None` is given.
///
/// # Errors
///
/// See [`Document::add_metadata`].
pub fn add_metadata(
    meta: Meta,
    document: Option<Document>,
    level: &str,
    target: Option<&str>,
) -> Result<Document, NexmlError> {
    let mut doc = document.unwrap_or_default();
    doc.add_metadata(meta, level, target)?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Meta;

    fn star_draft(labels: &[&str]) -> TreeDraft {
        let mut draft = TreeDraft::new();
        let leaves: Vec<usize> = labels
            .iter()
            .map(|l| draft.leaf(*l, Some(1.0)))
            .collect();
        let root = draft.internal(leaves, None);
        draft.set_root(root);
        draft
    }

    #[test]
    fn otu_reuse_is_order_free_set_equality() {
        let doc = add_tree_block(vec![star_draft(&["A", "B", "C"])], None).unwrap();
        let first = doc.otus_blocks()[0].id.clone();

        let doc = add_tree_block(vec![star_draft(&["C", "B", "A"])], Some(doc)).unwrap();
        assert_eq!(doc.otus_blocks().len(), 1, "same set must reuse the block");
        assert_eq!(doc.tree_blocks()[1].otus, first);

        let doc = add_tree_block(vec![star_draft(&["A", "B", "D"])], Some(doc)).unwrap();
        assert_eq!(doc.otus_blocks().len(), 2, "different set must not reuse");
        assert_ne!(doc.tree_blocks()[2].otus, first);
    }

    #[test]
    fn subset_does_not_reuse() {
        let mut doc = Document::new();
        doc.append_tree_block(vec![star_draft(&["A", "B", "C"])]).unwrap();
        doc.append_tree_block(vec![star_draft(&["A", "B"])]).unwrap();
        assert_eq!(doc.otus_blocks().len(), 2);
    }

    #[test]
    fn dangling_tip_reference_is_rejected_atomically() {
        let mut doc = Document::new();
        doc.append_tree_block(vec![star_draft(&["A", "B"])]).unwrap();
        let before = doc.clone();

        let block = TreeBlock {
            id: "treesX".to_owned(),
            label: None,
            otus: doc.otus_blocks()[0].id.clone(),
            trees: vec![Tree {
                id: "treeX".to_owned(),
                label: None,
                nodes: vec![Node {
                    id: "nodeX".to_owned(),
                    label: None,
                    otu: Some("X99".to_owned()),
                    root: true,
                    meta: Vec::new(),
                }],
                edges: Vec::new(),
                meta: Vec::new(),
            }],
            meta: Vec::new(),
        };
        let err = doc.insert_tree_block(block).unwrap_err();
        assert!(matches!(err, NexmlError::DanglingReference(id) if id == "X99"));
        assert_eq!(doc, before, "rejected insert must leave the document unchanged");
    }

    #[test]
    fn matrix_row_outside_block_otu_set_is_rejected() {
        let mut doc = Document::new();
        doc.append_tree_block(vec![star_draft(&["A", "B"])]).unwrap();
        let otus_id = doc.otus_blocks()[0].id.clone();
        let before = doc.clone();

        let block = CharactersBlock {
            id: "charactersX".to_owned(),
            label: None,
            otus: otus_id,
            kind: DataKind::Discrete,
            chars: vec![CharacterDef {
                id: "charX".to_owned(),
                label: None,
                states: None,
                meta: Vec::new(),
            }],
            rows: vec![MatrixRow {
                id: "rowX".to_owned(),
                otu: "X99".to_owned(),
                cells: BTreeMap::new(),
                meta: Vec::new(),
            }],
            meta: Vec::new(),
        };
        let err = doc.insert_characters_block(block).unwrap_err();
        assert!(matches!(err, NexmlError::DanglingReference(id) if id == "X99"));
        assert_eq!(doc, before);
    }

    #[test]
    fn level_scoped_metadata_is_a_snapshot_not_a_live_query() {
        let mut doc = Document::new();
        doc.add_otus_if_absent(&["A".to_owned(), "B".to_owned()]);
        doc.add_metadata(Meta::text("dc:source", "field notes"), "otus/otu", None)
            .unwrap();

        // A third OTU added afterwards must not carry the annotation.
        let block_id = doc.add_otus_if_absent(&["A".to_owned(), "B".to_owned(), "C".to_owned()]);
        let block = doc.otus_block(&block_id).unwrap();
        let annotated: usize = doc
            .meta_entries(MetaLevel::Otu)
            .iter()
            .filter(|(_, meta)| !meta.is_empty())
            .count();
        assert_eq!(annotated, 2);
        assert!(block.otus.iter().all(|o| o.meta.is_empty()));
    }

    #[test]
    fn metadata_attach_failures_do_not_mutate() {
        let mut doc = Document::new();
        doc.add_otus_if_absent(&["A".to_owned()]);
        let before = doc.clone();

        let err = doc
            .add_metadata(Meta::text("obo:part_of", "x"), "otus/otu", None)
            .unwrap_err();
        assert!(matches!(err, NexmlError::UnresolvedNamespace { .. }));
        assert_eq!(doc, before);

        let err = doc
            .add_metadata(Meta::text("dc:title", "x"), "otus/nope", None)
            .unwrap_err();
        assert!(matches!(err, NexmlError::UnknownLevel(_)));

        let err = doc
            .add_metadata(Meta::text("dc:title", "x"), "otus/otu", Some("otu99"))
            .unwrap_err();
        assert!(matches!(err, NexmlError::UnknownTarget { .. }));
        assert_eq!(doc, before);
    }

    #[test]
    fn repeated_attach_appends_duplicates() {
        let mut doc = Document::new();
        doc.add_metadata(Meta::text("dc:title", "same"), "document", None)
            .unwrap();
        doc.add_metadata(Meta::text("dc:title", "same"), "document", None)
            .unwrap();
        assert_eq!(doc.root_meta().len(), 2);
    }

    #[test]
    fn negative_branch_length_is_rejected() {
        let mut draft = TreeDraft::new();
        let a = draft.leaf("A", Some(-0.5));
        let b = draft.leaf("B", Some(1.0));
        let root = draft.internal(vec![a, b], None);
        draft.set_root(root);

        let err = add_tree_block(vec![draft], None).unwrap_err();
        assert!(matches!(err, NexmlError::NegativeLength { .. }));
    }

    #[test]
    fn continuous_matrix_rejects_state_spaces() {
        let mut draft = MatrixDraft::new(DataKind::Continuous);
        draft.column("mass", Some(vec!["0".to_owned(), "1".to_owned()]));
        draft.row("A", vec![Some("0.5".to_owned())]);
        let err = add_characters_block(draft, None).unwrap_err();
        assert!(matches!(err, NexmlError::UnexpectedStates(c) if c == "mass"));
    }

    #[test]
    fn generated_ids_are_unique_per_kind() {
        let mut doc = Document::new();
        doc.append_tree_block(vec![star_draft(&["A", "B"])]).unwrap();
        doc.append_tree_block(vec![star_draft(&["C", "D"])]).unwrap();
        doc.verify().unwrap();
        assert_eq!(doc.tree_blocks()[0].id, "trees1");
        assert_eq!(doc.tree_blocks()[1].id, "trees2");
    }
}
