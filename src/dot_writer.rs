//! # DOT Writer
//!
//! Streams a [`ContractGraph`] as a `strict graph` in DOT syntax:
//!
//! ```text
//! strict graph {
//! "0xaaaa…" [label="", shape="circle", width="1.5"];
//! "0xaaaa…" -- "0xbbbb…"  [weight="3"];
//! }
//! ```
//!
//! Every node line starts from the default attributes (`label=""`,
//! `shape="circle"`); node attributes of the same name replace the defaults
//! in place, others are appended. All values are quoted. Lines go straight
//! to the writer, nothing is assembled in memory first.

use crate::graph_builder::{ContractGraph, Node};
use crate::types::conversions::address_to_string;
use std::io::{self, Write};

pub const DEFAULT_NODE_ATTRIBUTES: [(&str, &str); 2] = [("label", ""), ("shape", "circle")];

pub fn write_graph<W: Write>(graph: &ContractGraph, writer: &mut W) -> io::Result<()> {
    writer.write_all(b"strict graph {\n")?;
    for (address, node) in graph.nodes() {
        write!(writer, "\"{}\" ", address_to_string(*address))?;
        write_attributes(writer, node_attributes(node))?;
        writer.write_all(b";\n")?;
    }
    for (key, edge) in graph.edges() {
        let (a, b) = key.endpoints();
        write!(
            writer,
            "\"{}\" -- \"{}\"  ",
            address_to_string(a),
            address_to_string(b)
        )?;
        let weight = edge.weight.to_string();
        write_attributes(writer, [("weight", weight.as_str())])?;
        writer.write_all(b";\n")?;
    }
    writer.write_all(b"}")?;
    writer.flush()
}

/// Render the whole graph into a string.
pub fn graph_to_string(graph: &ContractGraph) -> String {
    let mut out = Vec::new();
    // Writing into a Vec cannot fail
    let _ = write_graph(graph, &mut out);
    String::from_utf8_lossy(&out).into_owned()
}

fn node_attributes(node: &Node) -> Vec<(&str, &str)> {
    let mut attributes: Vec<(&str, &str)> = DEFAULT_NODE_ATTRIBUTES.to_vec();
    for (name, value) in node.attributes() {
        match attributes.iter_mut().find(|(n, _)| *n == name.as_str()) {
            Some(slot) => slot.1 = value.as_str(),
            None => attributes.push((name.as_str(), value.as_str())),
        }
    }
    attributes
}

fn write_attributes<'a, W, I>(writer: &mut W, attributes: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    writer.write_all(b"[")?;
    for (i, (name, value)) in attributes.into_iter().enumerate() {
        if i > 0 {
            writer.write_all(b", ")?;
        }
        write!(writer, "{}=\"{}\"", name, value)?;
    }
    writer.write_all(b"]")
}
