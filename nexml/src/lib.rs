//! Phylogenetic data-exchange documents.
//!
//! The `nexml` crate builds, annotates, merges, and serializes documents
//! that bundle taxonomic unit lists, phylogenetic trees, and character
//! matrices with namespace-qualified metadata, losslessly round-tripping
//! through the NeXML wire format.
//!
//! # Entry Point
//!
//! ```
//! use nexml::{add_tree_block, TreeDraft};
//!
//! let mut draft = TreeDraft::new();
//! let human = draft.leaf("Homo sapiens", Some(6.5));
//! let chimp = draft.leaf("Pan troglodytes", Some(6.5));
//! let root = draft.internal(vec![human, chimp], None);
//! draft.set_root(root);
//!
//! let document = add_tree_block(vec![draft], None).unwrap();
//! assert_eq!(document.tree_blocks().len(), 1);
//! assert_eq!(document.otus_blocks()[0].otus.len(), 2);
//! ```
//!
//! # Serialization
//!
//! ```
//! use nexml::{add_tree_block, xml, TreeDraft};
//!
//! let mut draft = TreeDraft::new();
//! let a = draft.leaf("A", None);
//! let b = draft.leaf("B", None);
//! let root = draft.internal(vec![a, b], None);
//! draft.set_root(root);
//!
//! let document = add_tree_block(vec![draft], None).unwrap();
//! let bytes = xml::encode(&document);
//! assert_eq!(xml::decode(&bytes).unwrap(), document);
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod adapter;
pub mod document;
pub mod error;
pub mod meta;
pub mod model;
pub mod namespace;
pub mod tables;
pub mod xml;

pub use document::{
    add_characters_block, add_metadata, add_tree_block, BlockRef, Document, MetaLevel,
};
pub use error::NexmlError;
pub use meta::{LiteralType, Meta, MetaValue};
pub use model::{
    CharacterDef, CharactersBlock, DataKind, Edge, MatrixDraft, MatrixRow, Node, Otu, OtusBlock,
    Tree, TreeBlock, TreeDraft,
};
pub use namespace::NamespaceRegistry;
pub use tables::{
    get_characters, get_metadata, get_trees, get_trees_list, CharactersView, DataTable, MetaTable,
    MetadataView, TreesView,
};
