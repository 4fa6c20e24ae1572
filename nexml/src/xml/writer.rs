//! Hand-written emitter for the NeXML wire format.
//!
//! The root element carries the registry snapshot as `xmlns:` attribute
//! declarations; blocks follow in addition order; every annotation renders
//! as a `<meta>` element — literal values as `datatype` and `content`
//! attributes, resources as an `href` attribute — with nested annotations
//! as child `<meta>` elements, recursively. Attribute form keeps literal
//! content byte-exact across round-trip regardless of surrounding
//! pretty-printing whitespace.

use std::fmt::Write as _;

use crate::document::{BlockRef, Document};
use crate::meta::{Meta, MetaValue};
use crate::model::{CharactersBlock, OtusBlock, Tree, TreeBlock};

/// Escapes text for use in element content or attribute values.
#[must_use]
pub fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn label_attr(label: Option<&str>) -> String {
    label
        .map(|l| format!(" label=\"{}\"", xml_escape(l)))
        .unwrap_or_default()
}

/// Serializes `document` to the wire format.
///
/// Infallible: any document that passed its mutation-time invariant
/// checks encodes to a well-formed byte stream.
#[must_use]
pub fn encode(document: &Document) -> String {
    let mut out = String::with_capacity(16 * 1024);

    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<nex:nexml version=\"0.9\"");
    for (prefix, uri) in document.registry().snapshot() {
        let _ = write!(out, " xmlns:{prefix}=\"{}\"", xml_escape(uri));
    }
    out.push_str(">\n");

    for meta in document.root_meta() {
        write_meta(&mut out, meta, 1);
    }

    for block in document.block_order() {
        match block {
            BlockRef::Otus(i) => write_otus(&mut out, &document.otus_blocks()[*i]),
            BlockRef::Trees(i) => write_trees(&mut out, &document.tree_blocks()[*i]),
            BlockRef::Characters(i) => {
                write_characters(&mut out, &document.characters_blocks()[*i]);
            }
        }
    }

    out.push_str("</nex:nexml>\n");
    out
}

fn write_meta(out: &mut String, meta: &Meta, depth: usize) {
    let pad = "  ".repeat(depth);
    match &meta.value {
        MetaValue::Literal { datatype, content } => {
            let _ = write!(
                out,
                "{pad}<meta xsi:type=\"nex:LiteralMeta\" property=\"{}\" datatype=\"{}\" content=\"{}\"",
                xml_escape(&meta.property),
                datatype.datatype(),
                xml_escape(content)
            );
            if meta.children.is_empty() {
                out.push_str(" />\n");
            } else {
                out.push_str(">\n");
                for child in &meta.children {
                    write_meta(out, child, depth + 1);
                }
                let _ = writeln!(out, "{pad}</meta>");
            }
        }
        MetaValue::Resource { href } => {
            let _ = write!(
                out,
                "{pad}<meta xsi:type=\"nex:ResourceMeta\" property=\"{}\" href=\"{}\"",
                xml_escape(&meta.property),
                xml_escape(href)
            );
            if meta.children.is_empty() {
                out.push_str(" />\n");
            } else {
                out.push_str(">\n");
                for child in &meta.children {
                    write_meta(out, child, depth + 1);
                }
                let _ = writeln!(out, "{pad}</meta>");
            }
        }
    }
}

fn write_otus(out: &mut String, block: &OtusBlock) {
    let _ = writeln!(
        out,
        "  <otus id=\"{}\"{}>",
        xml_escape(&block.id),
        label_attr(block.label.as_deref())
    );
    for meta in &block.meta {
        write_meta(out, meta, 2);
    }
    for otu in &block.otus {
        if otu.meta.is_empty() {
            let _ = writeln!(
                out,
                "    <otu id=\"{}\"{} />",
                xml_escape(&otu.id),
                label_attr(otu.label.as_deref())
            );
        } else {
            let _ = writeln!(
                out,
                "    <otu id=\"{}\"{}>",
                xml_escape(&otu.id),
                label_attr(otu.label.as_deref())
            );
            for meta in &otu.meta {
                write_meta(out, meta, 3);
            }
            out.push_str("    </otu>\n");
        }
    }
    out.push_str("  </otus>\n");
}

fn write_trees(out: &mut String, block: &TreeBlock) {
    let _ = writeln!(
        out,
        "  <trees id=\"{}\"{} otus=\"{}\">",
        xml_escape(&block.id),
        label_attr(block.label.as_deref()),
        xml_escape(&block.otus)
    );
    for meta in &block.meta {
        write_meta(out, meta, 2);
    }
    for tree in &block.trees {
        write_tree(out, tree);
    }
    out.push_str("  </trees>\n");
}

fn write_tree(out: &mut String, tree: &Tree) {
    let _ = writeln!(
        out,
        "    <tree id=\"{}\"{} xsi:type=\"nex:FloatTree\">",
        xml_escape(&tree.id),
        label_attr(tree.label.as_deref())
    );
    for meta in &tree.meta {
        write_meta(out, meta, 3);
    }
    for node in &tree.nodes {
        let _ = write!(
            out,
            "      <node id=\"{}\"{}",
            xml_escape(&node.id),
            label_attr(node.label.as_deref())
        );
        if let Some(otu) = &node.otu {
            let _ = write!(out, " otu=\"{}\"", xml_escape(otu));
        }
        if node.root {
            out.push_str(" root=\"true\"");
        }
        if node.meta.is_empty() {
            out.push_str(" />\n");
        } else {
            out.push_str(">\n");
            for meta in &node.meta {
                write_meta(out, meta, 4);
            }
            out.push_str("      </node>\n");
        }
    }
    for edge in &tree.edges {
        let _ = write!(
            out,
            "      <edge id=\"{}\" source=\"{}\" target=\"{}\"",
            xml_escape(&edge.id),
            xml_escape(&edge.source),
            xml_escape(&edge.target)
        );
        if let Some(length) = edge.length {
            let _ = write!(out, " length=\"{length}\"");
        }
        if edge.meta.is_empty() {
            out.push_str(" />\n");
        } else {
            out.push_str(">\n");
            for meta in &edge.meta {
                write_meta(out, meta, 4);
            }
            out.push_str("      </edge>\n");
        }
    }
    out.push_str("    </tree>\n");
}

fn write_characters(out: &mut String, block: &CharactersBlock) {
    let _ = writeln!(
        out,
        "  <characters id=\"{}\"{} otus=\"{}\" xsi:type=\"{}\">",
        xml_escape(&block.id),
        label_attr(block.label.as_deref()),
        xml_escape(&block.otus),
        block.kind.xsi_type()
    );
    for meta in &block.meta {
        write_meta(out, meta, 2);
    }

    out.push_str("    <format>\n");
    for def in &block.chars {
        if let Some(states) = &def.states {
            let _ = writeln!(out, "      <states id=\"states_{}\">", xml_escape(&def.id));
            for (index, symbol) in states.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "        <state id=\"states_{}_s{}\" symbol=\"{}\" />",
                    xml_escape(&def.id),
                    index + 1,
                    xml_escape(symbol)
                );
            }
            out.push_str("      </states>\n");
        }
    }
    for def in &block.chars {
        let _ = write!(
            out,
            "      <char id=\"{}\"{}",
            xml_escape(&def.id),
            label_attr(def.label.as_deref())
        );
        if def.states.is_some() {
            let _ = write!(out, " states=\"states_{}\"", xml_escape(&def.id));
        }
        if def.meta.is_empty() {
            out.push_str(" />\n");
        } else {
            out.push_str(">\n");
            for meta in &def.meta {
                write_meta(out, meta, 4);
            }
            out.push_str("      </char>\n");
        }
    }
    out.push_str("    </format>\n");

    out.push_str("    <matrix>\n");
    for row in &block.rows {
        let _ = writeln!(
            out,
            "      <row id=\"{}\" otu=\"{}\">",
            xml_escape(&row.id),
            xml_escape(&row.otu)
        );
        for meta in &row.meta {
            write_meta(out, meta, 4);
        }
        // Cells in declared column order.
        for def in &block.chars {
            if let Some(value) = row.cells.get(&def.id) {
                let _ = writeln!(
                    out,
                    "        <cell char=\"{}\" state=\"{}\" />",
                    xml_escape(&def.id),
                    xml_escape(value)
                );
            }
        }
        out.push_str("      </row>\n");
    }
    out.push_str("    </matrix>\n");
    out.push_str("  </characters>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::add_tree_block;
    use crate::meta::Meta;
    use crate::model::TreeDraft;

    #[test]
    fn root_carries_every_binding() {
        let mut doc = Document::new();
        doc.register_namespace("obo", "http://purl.obolibrary.org/obo/")
            .unwrap();
        let xml = encode(&doc);
        for (prefix, uri) in doc.registry().snapshot() {
            assert!(xml.contains(&format!("xmlns:{prefix}=\"{uri}\"")));
        }
    }

    #[test]
    fn literal_content_is_an_attribute_and_resources_use_href() {
        let mut doc = Document::new();
        doc.add_metadata(Meta::text("dc:title", "A <bold> title"), "document", None)
            .unwrap();
        doc.add_metadata(
            Meta::resource("cc:license", "http://creativecommons.org/publicdomain/zero/1.0/"),
            "document",
            None,
        )
        .unwrap();
        let xml = encode(&doc);
        assert!(xml.contains("content=\"A &lt;bold&gt; title\""));
        assert!(xml.contains("href=\"http://creativecommons.org/publicdomain/zero/1.0/\""));
    }

    #[test]
    fn blocks_appear_in_addition_order() {
        let mut draft = TreeDraft::new();
        let a = draft.leaf("A", None);
        let b = draft.leaf("B", None);
        let root = draft.internal(vec![a, b], None);
        draft.set_root(root);
        let doc = add_tree_block(vec![draft], None).unwrap();

        let xml = encode(&doc);
        let otus_at = xml.find("<otus ").unwrap();
        let trees_at = xml.find("<trees ").unwrap();
        assert!(otus_at < trees_at);
    }
}
