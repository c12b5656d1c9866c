//! Resolution of patch indices to live nodes.
//!
//! The old virtual tree and the live tree are walked side by side. Subtrees whose index range
//! (`low..=high`, computed from [`Node::descendants`]) contains no patch are skipped entirely,
//! so the cost is proportional to the depth of the patched nodes rather than the size of the tree.

use crate::{
	document::{Document, NodeKey},
	event::EventContext,
	node::{Node, VirtualNode},
	patch::{Move, Patch, PatchKind, Reorder},
};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{error, trace_span};

/// Live nodes and event contexts per [`Patch::slot`].
pub struct Located<Msg, D: Document> {
	nodes: Vec<Option<D::Node>>,
	contexts: Vec<Option<Rc<EventContext<Msg>>>>,
}

impl<Msg, D: Document> Located<Msg, D> {
	#[must_use]
	pub fn new(slot_count: usize) -> Self {
		Self {
			nodes: vec![None; slot_count],
			contexts: vec![None; slot_count],
		}
	}

	#[must_use]
	pub fn node(&self, slot: usize) -> Option<&D::Node> {
		self.nodes.get(slot).and_then(Option::as_ref)
	}

	#[must_use]
	pub fn context(&self, slot: usize) -> Option<&Rc<EventContext<Msg>>> {
		self.contexts.get(slot).and_then(Option::as_ref)
	}

	/// How many slots were resolved.
	#[must_use]
	pub fn resolved(&self) -> usize {
		self.nodes.iter().filter(|node| node.is_some()).count()
	}

	fn resolve(&mut self, slot: usize, node: D::Node, context: Rc<EventContext<Msg>>) {
		if slot >= self.nodes.len() {
			self.nodes.resize(slot + 1, None);
			self.contexts.resize(slot + 1, None);
		}
		self.nodes[slot] = Some(node);
		self.contexts[slot] = Some(context);
	}
}

struct Locator<'a, Msg, D: Document> {
	document: &'a D,
	/// Contexts of rendered tagger subtrees, keyed by their topmost live node.
	tagger_contexts: &'a HashMap<NodeKey, Rc<EventContext<Msg>>>,
	located: Located<Msg, D>,
}

/// Finds the live node and effective event context of every patch in `patches`, including nested ones.
///
/// `root` must be the live counterpart of `old`.
pub fn locate<Msg, D: Document>(
	document: &D,
	tagger_contexts: &HashMap<NodeKey, Rc<EventContext<Msg>>>,
	root: &D::Node,
	old: &Node<Msg, D>,
	patches: &[Patch<Msg, D>],
	slot_count: usize,
	context: &Rc<EventContext<Msg>>,
) -> Located<Msg, D> {
	let span = trace_span!("Locating patch targets", patches = patches.len());
	let _enter = span.enter();

	let mut locator = Locator {
		document,
		tagger_contexts,
		located: Located::new(slot_count),
	};
	locator.walk(root, old, patches, 0, 0, old.descendants(), context);
	locator.located
}

impl<'a, Msg, D: Document> Locator<'a, Msg, D> {
	/// Resolves `patches[i..]` within `vnode`'s index range and returns the position of the first patch past it.
	#[allow(clippy::too_many_arguments)]
	fn walk(&mut self, dom: &D::Node, vnode: &Node<Msg, D>, patches: &[Patch<Msg, D>], mut i: usize, mut low: usize, high: usize, context: &Rc<EventContext<Msg>>) -> usize {
		let Some(mut patch) = patches.get(i) else { return i };
		let mut index = patch.index;

		while index == low {
			self.located.resolve(patch.slot, dom.clone(), Rc::clone(context));
			match &patch.kind {
				PatchKind::Thunk(nested) => match vnode.kind() {
					VirtualNode::Lazy(lazy) => {
						let content = lazy.force();
						self.walk(dom, content, nested, 0, 0, content.descendants(), context);
					}
					_ => error!("sapling-dom bug: Thunk patch at index {} does not target a lazy node", index),
				},
				PatchKind::Reorder(Reorder { patches: nested, .. }) | PatchKind::Remove(Some(Move { patches: nested, .. })) => {
					if !nested.is_empty() {
						self.walk(dom, vnode, nested, 0, low, high, context);
					}
				}
				_ => (),
			}

			i += 1;
			match patches.get(i) {
				Some(next) if next.index <= high => {
					patch = next;
					index = next.index;
				}
				_ => return i,
			}
		}

		match vnode.kind() {
			VirtualNode::Tagger(tagged) => {
				let (_, child) = tagged.flatten();
				let context = self.tagger_contexts.get(&self.document.node_key(dom)).map_or_else(|| Rc::clone(context), Rc::clone);
				self.walk(dom, child, patches, i, low + 1, high, &context)
			}
			VirtualNode::Element(_) | VirtualNode::Keyed(_) => {
				let Some((_, children)) = vnode.element_parts() else { return i };
				let dom_children = self.document.child_nodes(dom);
				for j in 0..children.len() {
					low += 1;
					let child = children.get(j);
					let next_low = low + child.descendants();
					if low <= index && index <= next_low {
						let Some(dom_child) = dom_children.get(j) else {
							error!("Live tree is out of sync: expected a child at position {} but found only {}.", j, dom_children.len());
							return i;
						};
						i = self.walk(dom_child, child, patches, i, low, next_low, context);
						match patches.get(i) {
							Some(next) if next.index <= high => index = next.index,
							_ => return i,
						}
					}
					low = next_low;
				}
				i
			}
			VirtualNode::Text(_) | VirtualNode::Custom(_) | VirtualNode::Lazy(_) => i,
		}
	}
}
