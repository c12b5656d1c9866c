//! Rendering of virtual nodes and application of [`Diff`]s to a live tree.

use crate::{
	config::Config,
	document::{Document, ListenerOptions, NodeKey},
	event::{register, EventContext, Registration, Sink},
	facts::{diff_facts, Facts, FactsDiff, Handler, LIVE_PROPERTIES},
	loggable,
	locate::{locate, Located},
	node::{Node, VirtualNode},
	patch::{Diff, EntryState, Move, Patch, PatchKind, Reorder},
};
use core::fmt::Debug;
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{error, instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, warn, Level};

fn report<E: Debug>(result: Result<(), E>, action: &str) {
	if let Err(error) = result {
		error!("Failed to {}: {:?}", action, error);
	}
}

/// Owns a [`Document`] and everything needed to keep event handling in sync with it.
///
/// Besides the document itself, that is the listeners installed on live nodes and the event contexts of rendered tagger subtrees,
/// both keyed by [`Document::node_key`].
pub struct DomPatcher<Msg, D: Document> {
	document: D,
	config: Config,
	root_context: Rc<EventContext<Msg>>,
	tagger_contexts: HashMap<NodeKey, Rc<EventContext<Msg>>>,
	registrations: HashMap<NodeKey, HashMap<String, Registration<Msg>>>,
}

impl<Msg: 'static, D: Document> DomPatcher<Msg, D> {
	/// Creates a patcher that reports every message produced by event handlers to `sink`,
	/// along with whether the handler asked to stop propagation.
	pub fn new(document: D, sink: impl Fn(Msg, bool) + 'static) -> Self {
		Self::with_config(document, sink, Config::default())
	}

	pub fn with_config(document: D, sink: impl Fn(Msg, bool) + 'static, config: Config) -> Self {
		let sink: Sink<Msg> = Rc::new(sink);
		Self {
			document,
			config,
			root_context: EventContext::root(sink),
			tagger_contexts: HashMap::new(),
			registrations: HashMap::new(),
		}
	}

	#[must_use]
	pub fn document(&self) -> &D {
		&self.document
	}

	/// Direct access to the document.
	///
	/// Nodes removed through this bypass listener cleanup until they are patched away.
	pub fn document_mut(&mut self) -> &mut D {
		&mut self.document
	}

	#[must_use]
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// The number of installed listeners.
	#[must_use]
	pub fn listener_count(&self) -> usize {
		self.registrations.values().map(HashMap::len).sum()
	}

	/// Creates a detached live tree for `node`, with all facts applied and listeners installed.
	///
	/// # Errors
	///
	/// Iff creating the root node fails. Failures further down are logged and leave holes in the output.
	#[instrument(skip_all)]
	pub fn render(&mut self, node: &Node<Msg, D>) -> Result<D::Node, D::Error> {
		let context = Rc::clone(&self.root_context);
		self.render_in(node, &context)
	}

	fn render_in(&mut self, node: &Node<Msg, D>, context: &Rc<EventContext<Msg>>) -> Result<D::Node, D::Error> {
		match node.kind() {
			VirtualNode::Text(text) => Ok(self.document.create_text_node(text)),

			VirtualNode::Lazy(lazy) => self.render_in(lazy.force(), context),

			VirtualNode::Tagger(tagged) => {
				let (chain, child) = tagged.flatten();
				let sub_context = EventContext::child(context, chain);
				let dom = self.render_in(child, &sub_context)?;
				self.tagger_contexts.insert(self.document.node_key(&dom), sub_context);
				Ok(dom)
			}

			VirtualNode::Custom(custom) => {
				let dom = custom.render(&mut self.document)?;
				self.apply_facts(&dom, context, diff_facts(&Facts::default(), custom.facts()));
				Ok(dom)
			}

			VirtualNode::Element(_) | VirtualNode::Keyed(_) => {
				let (head, children) = node.element_parts().expect("sapling-dom bug: Element without element parts");
				let dom = self.document.create_element(head.namespace, head.tag)?;
				self.apply_facts(&dom, context, diff_facts(&Facts::default(), head.facts));
				for i in 0..children.len() {
					match self.render_in(children.get(i), context) {
						Ok(child) => report(self.document.append_child(&dom, &child), "append rendered child"),
						Err(error) => error!("Failed to render child {} of <{}>: {:?}", i, head.tag, error),
					}
				}
				Ok(dom)
			}
		}
	}

	/// Applies `diff` (computed from `old`) to `root`, the live counterpart of `old`.
	///
	/// Returns the new root, which differs from `root` iff the root itself was replaced.
	#[instrument(skip_all, fields(patches = diff.patches.len()))]
	pub fn apply(&mut self, root: D::Node, old: &Node<Msg, D>, diff: Diff<Msg, D>) -> D::Node {
		if diff.is_empty() {
			trace!("Nothing to patch.");
			return root;
		}

		let mut located = locate(&self.document, &self.tagger_contexts, &root, old, &diff.patches, diff.slot_count, &self.root_context);
		if STATIC_MAX_LEVEL >= Level::TRACE {
			trace!("Located {} of {} slot(s).", located.resolved(), diff.slot_count);
		}
		self.apply_patches(root, diff.patches, &mut located)
	}

	fn target(&self, patch: &Patch<Msg, D>, located: &Located<Msg, D>) -> Option<(D::Node, Rc<EventContext<Msg>>)> {
		match located.node(patch.slot) {
			Some(node) => Some((node.clone(), located.context(patch.slot).map_or_else(|| Rc::clone(&self.root_context), Rc::clone))),
			None => {
				error!("Live tree is out of sync: no node found for {} patch at index {}. Skipping it.", patch.kind_name(), patch.index);
				None
			}
		}
	}

	fn apply_patches(&mut self, mut root: D::Node, patches: Vec<Patch<Msg, D>>, located: &mut Located<Msg, D>) -> D::Node {
		for patch in patches {
			let Some((node, context)) = self.target(&patch, located) else { continue };
			let replaces_root = self.document.node_key(&node) == self.document.node_key(&root);
			let node = self.apply_patch(node, patch.kind, &context, located);
			if replaces_root {
				root = node;
			}
		}
		root
	}

	fn apply_patch(&mut self, node: D::Node, kind: PatchKind<Msg, D>, context: &Rc<EventContext<Msg>>, located: &mut Located<Msg, D>) -> D::Node {
		let span = trace_span!("Applying patch", kind = kind.name());
		let _enter = span.enter();

		match kind {
			PatchKind::Redraw(vnode) => self.redraw(node, &vnode, context),

			PatchKind::Facts(diff) => {
				self.apply_facts(&node, context, diff);
				node
			}

			PatchKind::Text(text) => {
				trace!("Setting text to {}.", loggable(&text));
				report(self.document.set_text(&node, &text), "set text");
				node
			}

			PatchKind::Thunk(patches) => self.apply_patches(node, patches, located),

			PatchKind::Tagger(chain) => {
				let key = self.document.node_key(&node);
				match self.tagger_contexts.get(&key) {
					Some(existing) => existing.set_taggers(chain),
					None => {
						self.tagger_contexts.insert(key, EventContext::child(context, chain));
					}
				}
				node
			}

			PatchKind::TrimChildren { keep, count } => {
				let children = self.document.child_nodes(&node);
				if children.len() != keep + count {
					warn!("Expected {} children to trim to {}, found {}.", keep + count, keep, children.len());
				}
				for child in children.iter().skip(keep) {
					report(self.document.remove_child(&node, child), "remove trimmed child");
					self.forget(child);
				}
				node
			}

			PatchKind::AppendChildren { from, children } => {
				let before = self.document.child_nodes(&node).get(from).cloned();
				for child in &children {
					match self.render_in(child, context) {
						Ok(dom) => report(self.document.insert_before(&node, &dom, before.as_ref()), "insert appended child"),
						Err(error) => error!("Failed to render appended child: {:?}", error),
					}
				}
				node
			}

			PatchKind::Remove(removal) => {
				if removal.is_some() {
					error!("sapling-dom bug: Move outside of a reorder. Removing the node instead.");
				}
				self.detach(&node);
				self.forget(&node);
				node
			}

			PatchKind::Reorder(reorder) => {
				self.apply_reorder(&node, reorder, context, located);
				node
			}

			PatchKind::Widget { patch, node: vnode } => match patch.apply(&mut self.document, node.clone()) {
				Ok(new_node) => {
					if self.document.node_key(&new_node) != self.document.node_key(&node) {
						trace!("Widget was replaced. Moving its facts over.");
						self.inherit_tagger_context(&node, &new_node);
						if let Some(parent) = self.document.parent_node(&node) {
							report(self.document.replace_child(&parent, &new_node, &node), "replace widget node");
						}
						self.forget(&node);
						match vnode.kind() {
							VirtualNode::Custom(custom) => self.apply_facts(&new_node, context, diff_facts(&Facts::default(), custom.facts())),
							_ => error!("sapling-dom bug: Widget patch without a custom node"),
						}
					}
					new_node
				}
				Err(error) => {
					error!("Widget patch failed: {:?}", error);
					node
				}
			},
		}
	}

	fn redraw(&mut self, node: D::Node, vnode: &Node<Msg, D>, context: &Rc<EventContext<Msg>>) -> D::Node {
		let new_node = match self.render_in(vnode, context) {
			Ok(new_node) => new_node,
			Err(error) => {
				error!("Failed to render replacement, keeping the old node: {:?}", error);
				return node;
			}
		};

		self.inherit_tagger_context(&node, &new_node);
		if let Some(parent) = self.document.parent_node(&node) {
			report(self.document.replace_child(&parent, &new_node, &node), "replace redrawn node");
		}
		self.forget(&node);
		new_node
	}

	/// Lets `new_node` stand in for `old_node` as the top of an enclosing tagger subtree, unless it is one itself.
	fn inherit_tagger_context(&mut self, old_node: &D::Node, new_node: &D::Node) {
		let (old_key, new_key) = (self.document.node_key(old_node), self.document.node_key(new_node));
		if !self.tagger_contexts.contains_key(&new_key) {
			if let Some(context) = self.tagger_contexts.get(&old_key).cloned() {
				self.tagger_contexts.insert(new_key, context);
			}
		}
	}

	fn detach(&mut self, node: &D::Node) {
		if let Some(parent) = self.document.parent_node(node) {
			report(self.document.remove_child(&parent, node), "remove node");
		}
	}

	/// Drops all side-table entries of a removed subtree and uninstalls its listeners.
	fn forget(&mut self, node: &D::Node) {
		let key = self.document.node_key(node);
		self.tagger_contexts.remove(&key);
		if let Some(registrations) = self.registrations.remove(&key) {
			trace!("Releasing {} listener(s).", registrations.len());
			for (event, registration) in registrations {
				report(self.document.remove_event_listener(node, &event, &registration.listener), "remove listener");
			}
		}
		for child in self.document.child_nodes(node) {
			self.forget(&child);
		}
	}

	fn apply_facts(&mut self, node: &D::Node, context: &Rc<EventContext<Msg>>, diff: FactsDiff<Msg>) {
		let FactsDiff {
			events,
			styles,
			properties,
			attributes,
			namespaced,
		} = diff;

		for (name, value) in styles {
			match value {
				Some(value) => report(self.document.set_style(node, &name, &value), "set style"),
				None => report(self.document.remove_style(node, &name), "remove style"),
			}
		}

		if !events.is_empty() {
			self.apply_events(node, context, events);
		}

		for (name, value) in attributes {
			match value {
				Some(value) => {
					trace!("Setting attribute {} to {}.", name, loggable(&value));
					report(self.document.set_attribute(node, None, &name, &value), "set attribute");
				}
				None => report(self.document.remove_attribute(node, None, &name), "remove attribute"),
			}
		}

		for (name, change) in namespaced {
			match change.value {
				Some(value) => report(self.document.set_attribute(node, Some(&change.namespace), &name, &value), "set namespaced attribute"),
				None => report(self.document.remove_attribute(node, Some(&change.namespace), &name), "remove namespaced attribute"),
			}
		}

		for (name, value) in properties {
			match value {
				Some(value) => {
					// Writing unchanged live values would reset carets and selections.
					if LIVE_PROPERTIES.contains(&name.as_str()) && self.document.property(node, &name).as_ref() == Some(&value) {
						continue;
					}
					report(self.document.set_property(node, &name, &value), "set property");
				}
				None => report(self.document.remove_property(node, &name), "remove property"),
			}
		}
	}

	fn apply_events(&mut self, node: &D::Node, context: &Rc<EventContext<Msg>>, events: HashMap<String, Option<Handler<Msg>>>) {
		let key = self.document.node_key(node);
		let mut registrations = self.registrations.remove(&key).unwrap_or_default();

		for (event, handler) in events {
			let Some(handler) = handler else {
				if let Some(old) = registrations.remove(&event) {
					report(self.document.remove_event_listener(node, &event, &old.listener), "remove listener");
				}
				continue;
			};

			if let Some(existing) = registrations.get(&event) {
				if existing.handler.borrow().tag() == handler.tag() {
					trace!("Swapping {:?} handler in place.", event);
					*existing.handler.borrow_mut() = handler;
					continue;
				}
			}

			if let Some(old) = registrations.remove(&event) {
				report(self.document.remove_event_listener(node, &event, &old.listener), "remove listener");
			}
			let options = ListenerOptions {
				passive: self.config.passive_listeners && handler.is_passive(),
			};
			let registration = register(Rc::clone(context), handler);
			report(self.document.add_event_listener(node, &event, &registration.listener, options), "add listener");
			registrations.insert(event, registration);
		}

		if !registrations.is_empty() {
			self.registrations.insert(key, registrations);
		}
	}

	fn apply_reorder(&mut self, parent: &D::Node, reorder: Reorder<Msg, D>, context: &Rc<EventContext<Msg>>, located: &mut Located<Msg, D>) {
		let Reorder {
			patches,
			entries,
			inserts,
			end_inserts,
		} = reorder;
		trace!("Reordering: {} local patch(es), {} insert(s), {} end insert(s).", patches.len(), inserts.len(), end_inserts.len());

		// Live nodes of moved entries, detached and patched, waiting to be reinserted.
		let mut moved: Vec<Option<D::Node>> = vec![None; entries.len()];

		for patch in patches {
			let Some((node, patch_context)) = self.target(&patch, located) else { continue };
			match patch.kind {
				PatchKind::Remove(None) => {
					report(self.document.remove_child(parent, &node), "remove keyed child");
					self.forget(&node);
				}
				PatchKind::Remove(Some(Move { entry, patches })) => {
					report(self.document.remove_child(parent, &node), "detach moved child");
					let node = self.apply_patches(node, patches, located);
					moved[entry] = Some(node);
				}
				kind => {
					self.apply_patch(node, kind, &patch_context, located);
				}
			}
		}

		let insert_ids = inserts.iter().map(|insert| (Some(insert.position), insert.entry));
		let end_ids = end_inserts.iter().map(|&entry| (None, entry));
		for (position, entry_id) in insert_ids.chain(end_ids) {
			let entry = &entries[entry_id];
			let reused = match entry.state {
				EntryState::Moved => {
					let node = moved[entry_id].take();
					if node.is_none() {
						warn!("Moved keyed child {:?} was never detached. Rendering it fresh.", entry.key);
					}
					node
				}
				EntryState::Inserted | EntryState::Removed => None,
			};
			let node = match reused {
				Some(node) => node,
				None => match self.render_in(&entry.node, context) {
					Ok(node) => node,
					Err(error) => {
						error!("Failed to render keyed child {:?}: {:?}", entry.key, error);
						continue;
					}
				},
			};
			let before = position.and_then(|position| self.document.child_nodes(parent).get(position).cloned());
			report(self.document.insert_before(parent, &node, before.as_ref()), "insert keyed child");
		}
	}
}
