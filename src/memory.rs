//! An arena-backed document for rendering without a browser.
//!
//! Mutations follow DOM semantics where the patcher relies on them:
//! inserting a node that already has a parent moves it, and removing a node only detaches it.

use crate::document::{Document, EventOutcome, Listener, ListenerOptions, NodeInfo, NodeKey, PropertyValue};
use core::{any::Any, fmt::Write as _};
use std::{collections::BTreeMap, rc::Rc};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
	#[error("{0:?} is not a text node")]
	NotText(NodeId),
	#[error("{0:?} is not an element")]
	NotElement(NodeId),
	#[error("{child:?} is not a child of {parent:?}")]
	NotAChild { parent: NodeId, child: NodeId },
	#[error("inserting {child:?} into {parent:?} would create a cycle")]
	Cycle { parent: NodeId, child: NodeId },
	#[error("no matching {event:?} listener on {node:?}")]
	NoSuchListener { node: NodeId, event: String },
}

struct Slot {
	parent: Option<NodeId>,
	data: Data,
}

enum Data {
	Text(String),
	Element(ElementData),
}

struct ElementData {
	tag: String,
	namespace: Option<String>,
	attributes: BTreeMap<(Option<String>, String), String>,
	styles: BTreeMap<String, String>,
	properties: BTreeMap<String, PropertyValue>,
	listeners: Vec<(String, Listener, ListenerOptions)>,
	children: Vec<NodeId>,
}

/// A document whose nodes live in a [`Vec`] and are never freed.
#[derive(Default)]
pub struct MemoryDocument {
	slots: Vec<Slot>,
}

impl MemoryDocument {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// How many nodes were ever created.
	#[must_use]
	pub fn len(&self) -> usize {
		self.slots.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.slots.is_empty()
	}

	fn element(&self, node: NodeId) -> Result<&ElementData, TreeError> {
		match &self.slots[node.0].data {
			Data::Element(element) => Ok(element),
			Data::Text(_) => Err(TreeError::NotElement(node)),
		}
	}

	fn element_mut(&mut self, node: NodeId) -> Result<&mut ElementData, TreeError> {
		match &mut self.slots[node.0].data {
			Data::Element(element) => Ok(element),
			Data::Text(_) => Err(TreeError::NotElement(node)),
		}
	}

	#[must_use]
	pub fn text(&self, node: NodeId) -> Option<&str> {
		match &self.slots[node.0].data {
			Data::Text(text) => Some(text),
			Data::Element(_) => None,
		}
	}

	#[must_use]
	pub fn tag(&self, node: NodeId) -> Option<&str> {
		self.element(node).ok().map(|element| element.tag.as_str())
	}

	#[must_use]
	pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
		self.element(node).ok()?.attributes.get(&(None, name.to_owned())).map(String::as_str)
	}

	#[must_use]
	pub fn attribute_ns(&self, node: NodeId, namespace: &str, name: &str) -> Option<&str> {
		self.element(node).ok()?.attributes.get(&(Some(namespace.to_owned()), name.to_owned())).map(String::as_str)
	}

	#[must_use]
	pub fn style(&self, node: NodeId, name: &str) -> Option<&str> {
		self.element(node).ok()?.styles.get(name).map(String::as_str)
	}

	/// The number of listeners for `event` on `node`.
	#[must_use]
	pub fn listener_count(&self, node: NodeId, event: &str) -> usize {
		self.element(node).map_or(0, |element| element.listeners.iter().filter(|(name, ..)| name == event).count())
	}

	/// The installed listeners for `event` on `node`, in installation order.
	#[must_use]
	pub fn listeners(&self, node: NodeId, event: &str) -> Vec<Listener> {
		self.element(node)
			.map(|element| element.listeners.iter().filter(|(name, ..)| name == event).map(|(_, listener, _)| Rc::clone(listener)).collect())
			.unwrap_or_default()
	}

	#[must_use]
	pub fn listener_options(&self, node: NodeId, event: &str) -> Option<ListenerOptions> {
		self.element(node).ok()?.listeners.iter().find(|(name, ..)| name == event).map(|(.., options)| *options)
	}

	/// Pre-order search below and including `root`.
	#[must_use]
	pub fn find(&self, root: NodeId, predicate: &dyn Fn(&Self, NodeId) -> bool) -> Option<NodeId> {
		if predicate(self, root) {
			return Some(root);
		}
		match &self.slots[root.0].data {
			Data::Element(element) => element.children.iter().find_map(|&child| self.find(child, predicate)),
			Data::Text(_) => None,
		}
	}

	/// Finds the first element below and including `root` whose `id` attribute is `id`.
	#[must_use]
	pub fn find_by_id(&self, root: NodeId, id: &str) -> Option<NodeId> {
		self.find(root, &|document: &Self, node: NodeId| document.attribute(node, "id") == Some(id))
	}

	/// Fires `event` at `target` and bubbles it to the top of its tree.
	///
	/// All listeners of a node run before propagation is stopped.
	pub fn dispatch(&self, target: NodeId, event: &str, payload: &dyn Any) -> EventOutcome {
		let mut outcome = EventOutcome::default();
		let mut current = Some(target);
		while let Some(node) = current {
			if let Ok(element) = self.element(node) {
				let listeners: Vec<Listener> = element.listeners.iter().filter(|(name, ..)| name == event).map(|(_, listener, _)| Rc::clone(listener)).collect();
				for listener in listeners {
					let result = listener(payload);
					outcome.stop_propagation |= result.stop_propagation;
					outcome.prevent_default |= result.prevent_default;
				}
			}
			if outcome.stop_propagation {
				trace!("Propagation of {:?} stopped at {:?}.", event, node);
				break;
			}
			current = self.slots[node.0].parent;
		}
		outcome
	}

	/// Serializes the subtree at `node` as HTML-like markup, deterministically.
	///
	/// Attributes and styles are sorted by name. Properties are written as `.name=value` after the attributes.
	#[must_use]
	pub fn markup(&self, node: NodeId) -> String {
		let mut markup = String::new();
		self.write_markup(node, &mut markup);
		markup
	}

	fn write_markup(&self, node: NodeId, markup: &mut String) {
		match &self.slots[node.0].data {
			Data::Text(text) => markup.push_str(text),
			Data::Element(element) => {
				markup.push('<');
				if let Some(namespace) = &element.namespace {
					let _ = write!(markup, "{{{}}}", namespace);
				}
				markup.push_str(&element.tag);
				for ((namespace, name), value) in &element.attributes {
					match namespace {
						Some(namespace) => {
							let _ = write!(markup, " {{{}}}{}={:?}", namespace, name, value);
						}
						None => {
							let _ = write!(markup, " {}={:?}", name, value);
						}
					}
				}
				if !element.styles.is_empty() {
					let style = element.styles.iter().map(|(name, value)| format!("{}: {}", name, value)).collect::<Vec<_>>().join("; ");
					let _ = write!(markup, " style={:?}", style);
				}
				for (name, value) in &element.properties {
					let _ = write!(markup, " .{}={:?}", name, value);
				}
				markup.push('>');
				for &child in &element.children {
					self.write_markup(child, markup);
				}
				let _ = write!(markup, "</{}>", element.tag);
			}
		}
	}

	fn is_ancestor_or_self(&self, ancestor: NodeId, mut node: NodeId) -> bool {
		loop {
			if node == ancestor {
				return true;
			}
			match self.slots[node.0].parent {
				Some(parent) => node = parent,
				None => return false,
			}
		}
	}

	fn detach(&mut self, node: NodeId) {
		if let Some(parent) = self.slots[node.0].parent.take() {
			if let Data::Element(element) = &mut self.slots[parent.0].data {
				element.children.retain(|&child| child != node);
			}
		}
	}

	fn position(&self, parent: NodeId, child: NodeId) -> Result<usize, TreeError> {
		self.element(parent)?.children.iter().position(|&c| c == child).ok_or(TreeError::NotAChild { parent, child })
	}

	fn push(&mut self, data: Data) -> NodeId {
		self.slots.push(Slot { parent: None, data });
		NodeId(self.slots.len() - 1)
	}
}

impl Document for MemoryDocument {
	type Node = NodeId;
	type Error = TreeError;

	fn node_key(&self, node: &NodeId) -> NodeKey {
		node.0 as NodeKey
	}

	fn create_element(&mut self, namespace: Option<&str>, tag: &str) -> Result<NodeId, TreeError> {
		Ok(self.push(Data::Element(ElementData {
			tag: tag.to_owned(),
			namespace: namespace.map(ToOwned::to_owned),
			attributes: BTreeMap::new(),
			styles: BTreeMap::new(),
			properties: BTreeMap::new(),
			listeners: Vec::new(),
			children: Vec::new(),
		})))
	}

	fn create_text_node(&mut self, text: &str) -> NodeId {
		self.push(Data::Text(text.to_owned()))
	}

	fn set_text(&mut self, node: &NodeId, text: &str) -> Result<(), TreeError> {
		match &mut self.slots[node.0].data {
			Data::Text(current) => {
				text.clone_into(current);
				Ok(())
			}
			Data::Element(_) => Err(TreeError::NotText(*node)),
		}
	}

	fn parent_node(&self, node: &NodeId) -> Option<NodeId> {
		self.slots[node.0].parent
	}

	fn child_nodes(&self, node: &NodeId) -> Vec<NodeId> {
		self.element(*node).map(|element| element.children.clone()).unwrap_or_default()
	}

	fn append_child(&mut self, parent: &NodeId, child: &NodeId) -> Result<(), TreeError> {
		self.insert_before(parent, child, None)
	}

	fn insert_before(&mut self, parent: &NodeId, child: &NodeId, reference: Option<&NodeId>) -> Result<(), TreeError> {
		let (parent, child) = (*parent, *child);
		self.element(parent)?;
		if self.is_ancestor_or_self(child, parent) {
			return Err(TreeError::Cycle { parent, child });
		}
		if let Some(&reference) = reference {
			if reference == child {
				return Ok(());
			}
			self.position(parent, reference)?;
		}

		self.detach(child);
		let position = match reference {
			Some(&reference) => self.position(parent, reference)?,
			None => self.element(parent)?.children.len(),
		};
		self.element_mut(parent)?.children.insert(position, child);
		self.slots[child.0].parent = Some(parent);
		Ok(())
	}

	fn remove_child(&mut self, parent: &NodeId, child: &NodeId) -> Result<(), TreeError> {
		self.position(*parent, *child)?;
		self.detach(*child);
		Ok(())
	}

	fn replace_child(&mut self, parent: &NodeId, new_child: &NodeId, old_child: &NodeId) -> Result<(), TreeError> {
		let (parent, new_child, old_child) = (*parent, *new_child, *old_child);
		self.position(parent, old_child)?;
		if new_child == old_child {
			return Ok(());
		}
		if self.is_ancestor_or_self(new_child, parent) {
			return Err(TreeError::Cycle { parent, child: new_child });
		}

		self.detach(new_child);
		let position = self.position(parent, old_child)?;
		self.element_mut(parent)?.children[position] = new_child;
		self.slots[old_child.0].parent = None;
		self.slots[new_child.0].parent = Some(parent);
		Ok(())
	}

	fn set_attribute(&mut self, node: &NodeId, namespace: Option<&str>, name: &str, value: &str) -> Result<(), TreeError> {
		self.element_mut(*node)?.attributes.insert((namespace.map(ToOwned::to_owned), name.to_owned()), value.to_owned());
		Ok(())
	}

	fn remove_attribute(&mut self, node: &NodeId, namespace: Option<&str>, name: &str) -> Result<(), TreeError> {
		self.element_mut(*node)?.attributes.remove(&(namespace.map(ToOwned::to_owned), name.to_owned()));
		Ok(())
	}

	fn set_style(&mut self, node: &NodeId, name: &str, value: &str) -> Result<(), TreeError> {
		self.element_mut(*node)?.styles.insert(name.to_owned(), value.to_owned());
		Ok(())
	}

	fn remove_style(&mut self, node: &NodeId, name: &str) -> Result<(), TreeError> {
		self.element_mut(*node)?.styles.remove(name);
		Ok(())
	}

	fn property(&self, node: &NodeId, name: &str) -> Option<PropertyValue> {
		self.element(*node).ok()?.properties.get(name).cloned()
	}

	fn set_property(&mut self, node: &NodeId, name: &str, value: &PropertyValue) -> Result<(), TreeError> {
		self.element_mut(*node)?.properties.insert(name.to_owned(), value.clone());
		Ok(())
	}

	fn remove_property(&mut self, node: &NodeId, name: &str) -> Result<(), TreeError> {
		self.element_mut(*node)?.properties.remove(name);
		Ok(())
	}

	fn add_event_listener(&mut self, node: &NodeId, event: &str, listener: &Listener, options: ListenerOptions) -> Result<(), TreeError> {
		self.element_mut(*node)?.listeners.push((event.to_owned(), Rc::clone(listener), options));
		Ok(())
	}

	fn remove_event_listener(&mut self, node: &NodeId, event: &str, listener: &Listener) -> Result<(), TreeError> {
		let listeners = &mut self.element_mut(*node)?.listeners;
		let position = listeners
			.iter()
			.position(|(name, installed, _)| name == event && Rc::ptr_eq(installed, listener))
			.ok_or_else(|| TreeError::NoSuchListener { node: *node, event: event.to_owned() })?;
		listeners.remove(position);
		Ok(())
	}

	fn inspect(&self, node: &NodeId) -> NodeInfo {
		match &self.slots[node.0].data {
			Data::Text(text) => NodeInfo::Text(text.clone()),
			Data::Element(element) => NodeInfo::Element {
				tag: element.tag.clone(),
				namespace: element.namespace.clone(),
				attributes: element
					.attributes
					.iter()
					.map(|((namespace, name), value)| (namespace.clone(), name.clone(), value.clone()))
					.collect(),
			},
		}
	}
}
