//! Reading pre-existing live content back into a virtual tree, so that the first update can patch it in place.

use crate::{
	document::{Document, NodeInfo},
	facts::{Facts, NamespacedAttribute},
	node::Node,
};
use tracing::{trace, trace_span};

/// Builds a virtual tree that mirrors `node`.
///
/// Only tags, namespaces, attributes and text survive.
/// Anything else that isn't an element or text node (comments, for example) becomes empty text, which keeps child positions aligned.
/// Attributes are recorded verbatim, bypassing the sanitization of [`Facts::attribute`],
/// so that unsafe live values differ from the next view and are removed or rewritten by the first patch.
pub fn virtualize<Msg, D: Document>(document: &D, node: &D::Node) -> Node<Msg, D> {
	let span = trace_span!("Virtualizing");
	let _enter = span.enter();

	virtualize_node(document, node)
}

fn virtualize_node<Msg, D: Document>(document: &D, node: &D::Node) -> Node<Msg, D> {
	match document.inspect(node) {
		NodeInfo::Text(text) => Node::text(text),
		NodeInfo::Element { tag, namespace, attributes } => {
			let facts = virtualize_attributes(attributes);
			let children = virtualize_child_nodes(document, node);
			match namespace {
				Some(namespace) => Node::element_ns(&namespace, &tag, facts, children),
				None => Node::element(&tag, facts, children),
			}
		}
		NodeInfo::Other => {
			trace!("Standing in empty text for {:?}.", node);
			Node::text("")
		}
	}
}

pub fn virtualize_child_nodes<Msg, D: Document>(document: &D, node: &D::Node) -> Vec<Node<Msg, D>> {
	document.child_nodes(node).iter().map(|child| virtualize_node(document, child)).collect()
}

/// Facts holding exactly the given `(namespace, name, value)` attributes.
pub fn virtualize_attributes<Msg>(attributes: Vec<(Option<String>, String, String)>) -> Facts<Msg> {
	let mut facts = Facts::new();
	for (namespace, name, value) in attributes {
		match namespace {
			Some(namespace) => {
				facts.namespaced.insert(name, NamespacedAttribute { namespace, value });
			}
			None => {
				facts.attributes.insert(name, value);
			}
		}
	}
	facts
}
