//! The live document tree capability the patcher renders into.
//!
//! Implementations exist for an in-memory tree ([`crate::memory`]) and the browser DOM ([`crate::web`]).

use core::{any::Any, fmt::Debug};
use std::rc::Rc;

/// Stable identity of a live node, used to key per-node side tables (listeners, tagger contexts).
pub type NodeKey = u64;

/// A type-erased event listener.
///
/// The raw event payload is handed over as [`Any`] so that decoders can downcast it to whatever the backend dispatches
/// (`web_sys::Event` for [`crate::web::WebDocument`], arbitrary test values for [`crate::memory::MemoryDocument`]).
pub type Listener = Rc<dyn Fn(&dyn Any) -> EventOutcome>;

/// What the document should do with an event after a listener ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventOutcome {
	pub stop_propagation: bool,
	pub prevent_default: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
	/// Whether the listener promises never to prevent the default action.
	pub passive: bool,
}

/// A plain (non-attribute) property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
	Null,
	Bool(bool),
	Number(f64),
	String(String),
}

impl From<bool> for PropertyValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<f64> for PropertyValue {
	fn from(value: f64) -> Self {
		Self::Number(value)
	}
}

impl From<&str> for PropertyValue {
	fn from(value: &str) -> Self {
		Self::String(value.to_owned())
	}
}

impl From<String> for PropertyValue {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

/// A read-back view of a single live node, used to virtualize pre-existing content.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeInfo {
	Text(String),
	Element {
		tag: String,
		namespace: Option<String>,
		/// `(namespace, name, value)`
		attributes: Vec<(Option<String>, String, String)>,
	},
	/// Comments, processing instructions and anything else that has no virtual counterpart.
	Other,
}

/// Mutation and inspection operations on a live document tree.
///
/// Every fallible operation reports failures through [`Document::Error`].
/// The patcher logs these and continues with the rest of the patch list, so a failing backend degrades the output but never aborts a render cycle.
pub trait Document {
	type Node: Clone + Debug;
	type Error: Debug;

	fn node_key(&self, node: &Self::Node) -> NodeKey;

	/// Creates a detached element, in `namespace` if one is given.
	fn create_element(&mut self, namespace: Option<&str>, tag: &str) -> Result<Self::Node, Self::Error>;
	fn create_text_node(&mut self, text: &str) -> Self::Node;
	/// Replaces the content of a text node.
	fn set_text(&mut self, node: &Self::Node, text: &str) -> Result<(), Self::Error>;

	fn parent_node(&self, node: &Self::Node) -> Option<Self::Node>;
	fn child_nodes(&self, node: &Self::Node) -> Vec<Self::Node>;

	fn append_child(&mut self, parent: &Self::Node, child: &Self::Node) -> Result<(), Self::Error>;
	/// Inserts `child` before `reference`, or appends it if `reference` is [`None`].
	fn insert_before(&mut self, parent: &Self::Node, child: &Self::Node, reference: Option<&Self::Node>) -> Result<(), Self::Error>;
	fn remove_child(&mut self, parent: &Self::Node, child: &Self::Node) -> Result<(), Self::Error>;
	fn replace_child(&mut self, parent: &Self::Node, new_child: &Self::Node, old_child: &Self::Node) -> Result<(), Self::Error>;

	fn set_attribute(&mut self, node: &Self::Node, namespace: Option<&str>, name: &str, value: &str) -> Result<(), Self::Error>;
	fn remove_attribute(&mut self, node: &Self::Node, namespace: Option<&str>, name: &str) -> Result<(), Self::Error>;

	fn set_style(&mut self, node: &Self::Node, name: &str, value: &str) -> Result<(), Self::Error>;
	fn remove_style(&mut self, node: &Self::Node, name: &str) -> Result<(), Self::Error>;

	fn property(&self, node: &Self::Node, name: &str) -> Option<PropertyValue>;
	fn set_property(&mut self, node: &Self::Node, name: &str, value: &PropertyValue) -> Result<(), Self::Error>;
	fn remove_property(&mut self, node: &Self::Node, name: &str) -> Result<(), Self::Error>;

	fn add_event_listener(&mut self, node: &Self::Node, event: &str, listener: &Listener, options: ListenerOptions) -> Result<(), Self::Error>;
	fn remove_event_listener(&mut self, node: &Self::Node, event: &str, listener: &Listener) -> Result<(), Self::Error>;

	fn inspect(&self, node: &Self::Node) -> NodeInfo;
}
