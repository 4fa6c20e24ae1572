//! Event-driven parser for the NeXML wire format.
//!
//! Parsing runs in two phases: a [`quick_xml::Reader`] event loop folds the
//! byte stream into a generic element tree, then a recursive walk maps that
//! tree onto the document model. The assembled parts pass through the same
//! invariant verification as every mutating operation, so a malformed or
//! referentially broken stream never yields a document.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::document::{BlockRef, Document};
use crate::error::NexmlError;
use crate::meta::{LiteralType, Meta, MetaValue};
use crate::model::{
    CharacterDef, CharactersBlock, DataKind, Edge, MatrixRow, Node, Otu, OtusBlock, Tree,
    TreeBlock,
};
use crate::namespace::NamespaceRegistry;

/// A raw element with its qualified name, attributes, text content, and
/// child elements in stream order.
#[derive(Debug, Default)]
struct Elem {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Elem>,
}

impl Elem {
    fn local_name(&self) -> &str {
        local(&self.name)
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn require_attr(&self, name: &str) -> Result<&str, NexmlError> {
        self.attr(name).ok_or_else(|| {
            NexmlError::Malformed(format!(
                "element <{}> is missing required attribute `{name}`",
                self.name
            ))
        })
    }
}

fn local(qualified: &str) -> &str {
    match qualified.split_once(':') {
        Some((_, name)) => name,
        None => qualified,
    }
}

fn malformed(err: impl std::fmt::Display) -> NexmlError {
    NexmlError::Malformed(err.to_string())
}

/// Parses `xml` into a [`Document`].
///
/// # Errors
///
/// [`NexmlError::Malformed`] for byte streams that are not well-formed or
/// that omit required structure; the other [`NexmlError`] variants surface
/// when the parsed parts violate a document invariant, exactly as they
/// would through the mutating API.
pub fn decode(xml: &str) -> Result<Document, NexmlError> {
    let root = parse_tree(xml)?;
    if root.local_name() != "nexml" {
        return Err(NexmlError::Malformed(format!(
            "expected a <nexml> root element, found <{}>",
            root.name
        )));
    }

    let mut registry = NamespaceRegistry::empty();
    for (key, value) in &root.attrs {
        if let Some(prefix) = key.strip_prefix("xmlns:") {
            registry.register(prefix, value)?;
        }
    }

    let mut meta = Vec::new();
    let mut otus = Vec::new();
    let mut trees = Vec::new();
    let mut characters = Vec::new();
    let mut order = Vec::new();

    for child in &root.children {
        match child.local_name() {
            "meta" => meta.push(read_meta(child)?),
            "otus" => {
                order.push(BlockRef::Otus(otus.len()));
                otus.push(read_otus(child)?);
            }
            "trees" => {
                order.push(BlockRef::Trees(trees.len()));
                trees.push(read_trees(child)?);
            }
            "characters" => {
                order.push(BlockRef::Characters(characters.len()));
                characters.push(read_characters(child)?);
            }
            other => {
                return Err(NexmlError::Malformed(format!(
                    "unexpected element <{other}> under the document root"
                )))
            }
        }
    }

    Document::from_parts(registry, meta, otus, trees, characters, order)
}

/// Folds the event stream into an element tree using an explicit stack.
fn parse_tree(xml: &str) -> Result<Elem, NexmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Elem> = Vec::new();
    let mut root: Option<Elem> = None;

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(start) => {
                stack.push(elem_from_start(&start)?);
            }
            Event::Empty(start) => {
                let elem = elem_from_start(&start)?;
                attach(&mut stack, &mut root, elem)?;
            }
            Event::End(_) => {
                let elem = stack.pop().ok_or_else(|| {
                    NexmlError::Malformed("unbalanced closing tag".to_owned())
                })?;
                attach(&mut stack, &mut root, elem)?;
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape().map_err(malformed)?);
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions.
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(NexmlError::Malformed(
            "unexpected end of input inside an open element".to_owned(),
        ));
    }
    root.ok_or_else(|| NexmlError::Malformed("document has no root element".to_owned()))
}

fn elem_from_start(start: &quick_xml::events::BytesStart<'_>) -> Result<Elem, NexmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(malformed)?.into_owned();
        attrs.push((key, value));
    }
    Ok(Elem {
        name,
        attrs,
        text: String::new(),
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [Elem],
    root: &mut Option<Elem>,
    elem: Elem,
) -> Result<(), NexmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(elem);
    } else if root.is_some() {
        return Err(NexmlError::Malformed(
            "multiple root elements".to_owned(),
        ));
    } else {
        *root = Some(elem);
    }
    Ok(())
}

fn read_meta(elem: &Elem) -> Result<Meta, NexmlError> {
    let property = elem.require_attr("property")?.to_owned();
    let mut children = Vec::new();
    for child in &elem.children {
        if child.local_name() == "meta" {
            children.push(read_meta(child)?);
        } else {
            return Err(NexmlError::Malformed(format!(
                "unexpected element <{}> inside a <meta> annotation",
                child.name
            )));
        }
    }

    let value = match elem.attr("xsi:type") {
        Some("nex:LiteralMeta") => {
            let raw = elem.require_attr("datatype")?;
            let datatype = LiteralType::from_datatype(raw).ok_or_else(|| {
                NexmlError::Malformed(format!(
                    "annotation `{property}` carries unsupported datatype `{raw}`"
                ))
            })?;
            // The value normally lives in the `content` attribute; element
            // text is accepted for documents that inline it instead.
            let content = match elem.attr("content") {
                Some(value) => value.to_owned(),
                None => elem.text.clone(),
            };
            MetaValue::Literal { datatype, content }
        }
        Some("nex:ResourceMeta") => MetaValue::Resource {
            href: elem.require_attr("href")?.to_owned(),
        },
        other => {
            return Err(NexmlError::Malformed(format!(
                "annotation `{property}` has unrecognized xsi:type `{}`",
                other.unwrap_or("<absent>")
            )))
        }
    };

    Ok(Meta {
        property,
        value,
        children,
    })
}

fn read_meta_into(elem: &Elem, meta: &mut Vec<Meta>) -> Result<bool, NexmlError> {
    if elem.local_name() == "meta" {
        meta.push(read_meta(elem)?);
        return Ok(true);
    }
    Ok(false)
}

fn read_otus(elem: &Elem) -> Result<OtusBlock, NexmlError> {
    let mut block = OtusBlock {
        id: elem.require_attr("id")?.to_owned(),
        label: elem.attr("label").map(str::to_owned),
        otus: Vec::new(),
        meta: Vec::new(),
    };
    for child in &elem.children {
        if read_meta_into(child, &mut block.meta)? {
            continue;
        }
        if child.local_name() != "otu" {
            return Err(NexmlError::Malformed(format!(
                "unexpected element <{}> inside <otus>",
                child.name
            )));
        }
        let mut otu = Otu {
            id: child.require_attr("id")?.to_owned(),
            label: child.attr("label").map(str::to_owned),
            meta: Vec::new(),
        };
        for grandchild in &child.children {
            if !read_meta_into(grandchild, &mut otu.meta)? {
                return Err(NexmlError::Malformed(format!(
                    "unexpected element <{}> inside <otu>",
                    grandchild.name
                )));
            }
        }
        block.otus.push(otu);
    }
    Ok(block)
}

fn read_trees(elem: &Elem) -> Result<TreeBlock, NexmlError> {
    let mut block = TreeBlock {
        id: elem.require_attr("id")?.to_owned(),
        label: elem.attr("label").map(str::to_owned),
        otus: elem.require_attr("otus")?.to_owned(),
        trees: Vec::new(),
        meta: Vec::new(),
    };
    for child in &elem.children {
        if read_meta_into(child, &mut block.meta)? {
            continue;
        }
        if child.local_name() != "tree" {
            return Err(NexmlError::Malformed(format!(
                "unexpected element <{}> inside <trees>",
                child.name
            )));
        }
        block.trees.push(read_tree(child)?);
    }
    Ok(block)
}

fn read_tree(elem: &Elem) -> Result<Tree, NexmlError> {
    let mut tree = Tree {
        id: elem.require_attr("id")?.to_owned(),
        label: elem.attr("label").map(str::to_owned),
        nodes: Vec::new(),
        edges: Vec::new(),
        meta: Vec::new(),
    };
    for child in &elem.children {
        if read_meta_into(child, &mut tree.meta)? {
            continue;
        }
        match child.local_name() {
            "node" => {
                let mut node = Node {
                    id: child.require_attr("id")?.to_owned(),
                    label: child.attr("label").map(str::to_owned),
                    otu: child.attr("otu").map(str::to_owned),
                    root: child.attr("root") == Some("true"),
                    meta: Vec::new(),
                };
                for grandchild in &child.children {
                    if !read_meta_into(grandchild, &mut node.meta)? {
                        return Err(NexmlError::Malformed(format!(
                            "unexpected element <{}> inside <node>",
                            grandchild.name
                        )));
                    }
                }
                tree.nodes.push(node);
            }
            "edge" => {
                let length = match child.attr("length") {
                    Some(raw) => Some(raw.parse::<f64>().map_err(|_| {
                        NexmlError::Malformed(format!(
                            "edge `{}` has non-numeric length `{raw}`",
                            child.attr("id").unwrap_or("<anonymous>")
                        ))
                    })?),
                    None => None,
                };
                let mut edge = Edge {
                    id: child.require_attr("id")?.to_owned(),
                    source: child.require_attr("source")?.to_owned(),
                    target: child.require_attr("target")?.to_owned(),
                    length,
                    meta: Vec::new(),
                };
                for grandchild in &child.children {
                    if !read_meta_into(grandchild, &mut edge.meta)? {
                        return Err(NexmlError::Malformed(format!(
                            "unexpected element <{}> inside <edge>",
                            grandchild.name
                        )));
                    }
                }
                tree.edges.push(edge);
            }
            other => {
                return Err(NexmlError::Malformed(format!(
                    "unexpected element <{other}> inside <tree>"
                )))
            }
        }
    }
    Ok(tree)
}

fn read_characters(elem: &Elem) -> Result<CharactersBlock, NexmlError> {
    let xsi_type = elem.require_attr("xsi:type")?;
    let kind = DataKind::from_xsi_type(xsi_type).ok_or_else(|| {
        NexmlError::Malformed(format!(
            "characters block has unrecognized xsi:type `{xsi_type}`"
        ))
    })?;
    let mut block = CharactersBlock {
        id: elem.require_attr("id")?.to_owned(),
        label: elem.attr("label").map(str::to_owned),
        otus: elem.require_attr("otus")?.to_owned(),
        kind,
        chars: Vec::new(),
        rows: Vec::new(),
        meta: Vec::new(),
    };
    for child in &elem.children {
        if read_meta_into(child, &mut block.meta)? {
            continue;
        }
        match child.local_name() {
            "format" => block.chars = read_format(child)?,
            "matrix" => block.rows = read_matrix(child)?,
            other => {
                return Err(NexmlError::Malformed(format!(
                    "unexpected element <{other}> inside <characters>"
                )))
            }
        }
    }
    Ok(block)
}

fn read_format(elem: &Elem) -> Result<Vec<CharacterDef>, NexmlError> {
    // State spaces first, then the columns that reference them.
    let mut state_sets: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut chars = Vec::new();

    for child in &elem.children {
        match child.local_name() {
            "states" => {
                let id = child.require_attr("id")?.to_owned();
                let mut symbols = Vec::new();
                for state in &child.children {
                    if state.local_name() != "state" {
                        return Err(NexmlError::Malformed(format!(
                            "unexpected element <{}> inside <states>",
                            state.name
                        )));
                    }
                    symbols.push(state.require_attr("symbol")?.to_owned());
                }
                state_sets.insert(id, symbols);
            }
            "char" => {
                let states = match child.attr("states") {
                    Some(reference) => Some(
                        state_sets
                            .get(reference)
                            .cloned()
                            .ok_or_else(|| NexmlError::DanglingReference(reference.to_owned()))?,
                    ),
                    None => None,
                };
                let mut def = CharacterDef {
                    id: child.require_attr("id")?.to_owned(),
                    label: child.attr("label").map(str::to_owned),
                    states,
                    meta: Vec::new(),
                };
                for grandchild in &child.children {
                    if !read_meta_into(grandchild, &mut def.meta)? {
                        return Err(NexmlError::Malformed(format!(
                            "unexpected element <{}> inside <char>",
                            grandchild.name
                        )));
                    }
                }
                chars.push(def);
            }
            other => {
                return Err(NexmlError::Malformed(format!(
                    "unexpected element <{other}> inside <format>"
                )))
            }
        }
    }
    Ok(chars)
}

fn read_matrix(elem: &Elem) -> Result<Vec<MatrixRow>, NexmlError> {
    let mut rows = Vec::new();
    for child in &elem.children {
        if child.local_name() != "row" {
            return Err(NexmlError::Malformed(format!(
                "unexpected element <{}> inside <matrix>",
                child.name
            )));
        }
        let mut row = MatrixRow {
            id: child.require_attr("id")?.to_owned(),
            otu: child.require_attr("otu")?.to_owned(),
            cells: BTreeMap::new(),
            meta: Vec::new(),
        };
        for grandchild in &child.children {
            if read_meta_into(grandchild, &mut row.meta)? {
                continue;
            }
            if grandchild.local_name() != "cell" {
                return Err(NexmlError::Malformed(format!(
                    "unexpected element <{}> inside <row>",
                    grandchild.name
                )));
            }
            row.cells.insert(
                grandchild.require_attr("char")?.to_owned(),
                grandchild.require_attr("state")?.to_owned(),
            );
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::uris;

    const MINIMAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nex:nexml version="0.9" xmlns:nex="http://www.nexml.org/2009" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <meta xsi:type="nex:LiteralMeta" property="dc:title" datatype="xsd:string">Primate study</meta>
  <otus id="otus1">
    <otu id="otu1" label="Homo sapiens" />
    <otu id="otu2" label="Pan troglodytes" />
  </otus>
  <trees id="trees1" otus="otus1">
    <tree id="tree1" xsi:type="nex:FloatTree">
      <node id="n1" root="true" />
      <node id="n2" otu="otu1" />
      <node id="n3" otu="otu2" />
      <edge id="e1" source="n1" target="n2" length="0.12" />
      <edge id="e2" source="n1" target="n3" length="0.34" />
    </tree>
  </trees>
</nex:nexml>
"#;

    #[test]
    fn minimal_document_parses() {
        let doc = decode(MINIMAL).unwrap();
        assert_eq!(doc.registry().resolve("dc").unwrap(), uris::DC);
        assert_eq!(doc.root_meta().len(), 1);
        assert_eq!(doc.otus_blocks()[0].otus.len(), 2);
        let tree = &doc.tree_blocks()[0].trees[0];
        assert_eq!(tree.nodes.len(), 3);
        assert_eq!(tree.edges[0].length, Some(0.12));
        assert!(tree.is_rooted());
    }

    #[test]
    fn unknown_datatype_is_rejected() {
        let xml = MINIMAL.replace("xsd:string", "xsd:duration");
        let err = decode(&xml).unwrap_err();
        assert!(matches!(err, NexmlError::Malformed(_)));
        assert!(err.to_string().contains("xsd:duration"));
    }

    #[test]
    fn dangling_block_reference_is_rejected() {
        let xml = MINIMAL.replace("otus=\"otus1\"", "otus=\"otus99\"");
        let err = decode(&xml).unwrap_err();
        assert!(matches!(err, NexmlError::DanglingReference(_)));
    }

    #[test]
    fn non_numeric_edge_length_is_rejected() {
        let xml = MINIMAL.replace("length=\"0.12\"", "length=\"long\"");
        let err = decode(&xml).unwrap_err();
        assert!(err.to_string().contains("e1"));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let truncated = &MINIMAL[..MINIMAL.len() / 2];
        assert!(decode(truncated).is_err());
    }

    #[test]
    fn states_resolve_through_their_declarations() {
        let xml = r#"<nex:nexml version="0.9" xmlns:nex="http://www.nexml.org/2009" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <otus id="otus1"><otu id="otu1" label="A" /></otus>
  <characters id="characters1" otus="otus1" xsi:type="nex:StandardCells">
    <format>
      <states id="states_c1">
        <state id="states_c1_s1" symbol="0" />
        <state id="states_c1_s2" symbol="1" />
      </states>
      <char id="c1" label="wings" states="states_c1" />
    </format>
    <matrix>
      <row id="row1" otu="otu1"><cell char="c1" state="1" /></row>
    </matrix>
  </characters>
</nex:nexml>"#;
        let doc = decode(xml).unwrap();
        let block = &doc.characters_blocks()[0];
        assert_eq!(
            block.chars[0].states.as_deref(),
            Some(["0".to_owned(), "1".to_owned()].as_slice())
        );
        assert_eq!(block.rows[0].cells["c1"], "1");
    }
}
