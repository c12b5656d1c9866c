//! The differ: walks two virtual trees in lock-step and produces a flat, index-ordered patch list.

use crate::{
	document::Document,
	facts::diff_facts,
	node::{same_tagger, Children, Node, VirtualNode},
	patch::{Diff, Entry, EntryId, EntryState, Insert, Move, Patch, PatchKind, Reorder},
};
use hashbrown::HashMap;
use tracing::{error, level_filters::STATIC_MAX_LEVEL, trace, trace_span, warn, Level};

/// Appended to a key that occurs more than once among keyed siblings, so that each occurrence gets its own entry.
pub const DUPLICATE_KEY_SUFFIX: &str = "_sapling#dup";

/// Computes the patches that turn `old` into `new`.
///
/// Neither tree is modified, except that lazy nodes in `new` may cache their content (or adopt that of `old`'s matching node).
#[must_use]
pub fn diff<Msg, D: Document>(old: &Node<Msg, D>, new: &Node<Msg, D>) -> Diff<Msg, D> {
	let span = trace_span!("diff", "old.descendants()" = old.descendants(), "new.descendants()" = new.descendants());
	let _enter = span.enter();

	let mut differ = Differ { slots: 0 };
	let mut patches = Vec::new();
	differ.diff_help(old, new, &mut patches, 0);

	if STATIC_MAX_LEVEL >= Level::ERROR && !patches.windows(2).all(|pair| pair[0].index <= pair[1].index) {
		error!("sapling-dom bug: Patches out of order. Some of them may not be located.");
	}
	trace!("Produced {} top-level patch(es) with {} slot(s).", patches.len(), differ.slots);
	Diff { patches, slot_count: differ.slots }
}

struct Differ {
	slots: usize,
}

/// Keyed reconciliation state for one parent.
struct KeyedDiff<Msg, D: Document> {
	patches: Vec<Patch<Msg, D>>,
	entries: Vec<Entry<Msg, D>>,
	changes: HashMap<String, EntryId>,
	inserts: Vec<Insert>,
	end_inserts: Vec<EntryId>,
}

impl<Msg, D: Document> KeyedDiff<Msg, D> {
	fn new() -> Self {
		Self {
			patches: Vec::new(),
			entries: Vec::new(),
			changes: HashMap::new(),
			inserts: Vec::new(),
			end_inserts: Vec::new(),
		}
	}

	fn record_insert(&mut self, position: Option<usize>, entry: EntryId) {
		match position {
			Some(position) => self.inserts.push(Insert { position, entry }),
			None => self.end_inserts.push(entry),
		}
	}
}

impl Differ {
	fn push<Msg, D: Document>(&mut self, patches: &mut Vec<Patch<Msg, D>>, index: usize, kind: PatchKind<Msg, D>) -> usize {
		let slot = self.slots;
		self.slots += 1;
		patches.push(Patch { index, slot, kind });
		slot
	}

	#[allow(clippy::too_many_lines)]
	fn diff_help<Msg, D: Document>(&mut self, x: &Node<Msg, D>, y: &Node<Msg, D>, patches: &mut Vec<Patch<Msg, D>>, index: usize) {
		if x.ptr_eq(y) {
			return;
		}

		match (x.kind(), y.kind()) {
			(VirtualNode::Lazy(x_lazy), VirtualNode::Lazy(y_lazy)) => {
				let span = trace_span!("Diffing lazy", index);
				let _enter = span.enter();
				if x_lazy.same_refs(y_lazy) {
					trace!("References matched. Reusing content.");
					y_lazy.adopt(x_lazy);
					return;
				}

				let mut sub_patches = Vec::new();
				self.diff_help(x_lazy.force(), y_lazy.force(), &mut sub_patches, 0);
				if !sub_patches.is_empty() {
					self.push(patches, index, PatchKind::Thunk(sub_patches));
				}
			}

			(VirtualNode::Tagger(x_tagged), VirtualNode::Tagger(y_tagged)) => {
				let span = trace_span!("Diffing tagger", index);
				let _enter = span.enter();
				let (x_chain, x_child) = x_tagged.flatten();
				let (y_chain, y_child) = y_tagged.flatten();

				if x_chain.len() != y_chain.len() {
					trace!("Tagger nesting changed ({} -> {}). Redrawing.", x_chain.len(), y_chain.len());
					self.push(patches, index, PatchKind::Redraw(y.clone()));
					return;
				}

				if !x_chain.iter().zip(&y_chain).all(|(a, b)| same_tagger(a, b)) {
					self.push(patches, index, PatchKind::Tagger(y_chain));
				}

				self.diff_help(x_child, y_child, patches, index + 1);
			}

			(VirtualNode::Text(x_text), VirtualNode::Text(y_text)) => {
				if x_text != y_text {
					self.push(patches, index, PatchKind::Text(y_text.clone()));
				}
			}

			(VirtualNode::Element(_) | VirtualNode::Keyed(_), VirtualNode::Element(_) | VirtualNode::Keyed(_)) => {
				let (x_head, x_children) = x.element_parts().expect("sapling-dom bug: Element without element parts");
				let (y_head, y_children) = y.element_parts().expect("sapling-dom bug: Element without element parts");
				let span = trace_span!("Diffing element", index, tag = y_head.tag);
				let _enter = span.enter();

				if x_head.tag != y_head.tag || x_head.namespace != y_head.namespace {
					trace!("Tag or namespace changed ({:?} -> {:?}). Redrawing.", x_head.tag, y_head.tag);
					self.push(patches, index, PatchKind::Redraw(y.clone()));
					return;
				}

				let facts_diff = diff_facts(x_head.facts, y_head.facts);
				if !facts_diff.is_empty() {
					self.push(patches, index, PatchKind::Facts(facts_diff));
				}

				match (x_children, y_children) {
					(Children::Keyed(x_children), Children::Keyed(y_children)) => self.diff_keyed_children(x_children, y_children, patches, index),
					(x_children, y_children) => self.diff_children(&x_children, &y_children, patches, index),
				}
			}

			(VirtualNode::Custom(x_custom), VirtualNode::Custom(y_custom)) => {
				let span = trace_span!("Diffing custom", index);
				let _enter = span.enter();
				if !x_custom.same_widget(y_custom) {
					self.push(patches, index, PatchKind::Redraw(y.clone()));
					return;
				}

				let facts_diff = diff_facts(x_custom.facts(), y_custom.facts());
				if !facts_diff.is_empty() {
					self.push(patches, index, PatchKind::Facts(facts_diff));
				}

				if let Some(patch) = x_custom.diff(y_custom) {
					self.push(patches, index, PatchKind::Widget { patch, node: y.clone() });
				}
			}

			// Mismatching nodes: Destroy and rebuild.
			_ => {
				trace!(index, "Node kinds differ. Redrawing.");
				self.push(patches, index, PatchKind::Redraw(y.clone()));
			}
		}
	}

	fn diff_children<Msg, D: Document>(&mut self, x_children: &Children<'_, Msg, D>, y_children: &Children<'_, Msg, D>, patches: &mut Vec<Patch<Msg, D>>, mut index: usize) {
		let x_len = x_children.len();
		let y_len = y_children.len();

		if x_len > y_len {
			self.push(patches, index, PatchKind::TrimChildren { keep: y_len, count: x_len - y_len });
		} else if x_len < y_len {
			self.push(
				patches,
				index,
				PatchKind::AppendChildren {
					from: x_len,
					children: (x_len..y_len).map(|i| y_children.get(i).clone()).collect(),
				},
			);
		}

		for i in 0..x_len.min(y_len) {
			let x_child = x_children.get(i);
			index += 1;
			self.diff_help(x_child, y_children.get(i), patches, index);
			index += x_child.descendants();
		}
	}

	#[allow(clippy::similar_names)]
	fn diff_keyed_children<Msg, D: Document>(&mut self, x_children: &[(String, Node<Msg, D>)], y_children: &[(String, Node<Msg, D>)], patches: &mut Vec<Patch<Msg, D>>, root_index: usize) {
		let span = trace_span!("Diffing keyed", "x_children.len()" = x_children.len(), "y_children.len()" = y_children.len());
		let _enter = span.enter();

		let mut reorder = KeyedDiff::new();
		let mut x_index = 0;
		let mut y_index = 0;
		let mut index = root_index;

		while x_index < x_children.len() && y_index < y_children.len() {
			let (x_key, x_node) = &x_children[x_index];
			let (y_key, y_node) = &y_children[y_index];

			if x_key == y_key {
				index += 1;
				self.diff_help(x_node, y_node, &mut reorder.patches, index);
				index += x_node.descendants();
				x_index += 1;
				y_index += 1;
				continue;
			}

			// Look ahead one position on each side to detect insertions, removals and swaps.
			let x_next = x_children.get(x_index + 1);
			let y_next = y_children.get(y_index + 1);
			let old_match = x_next.filter(|(x_next_key, _)| x_next_key == y_key);
			let new_match = y_next.filter(|(y_next_key, _)| y_next_key == x_key);

			match (old_match, new_match) {
				(Some((_, x_next_node)), Some((_, y_next_node))) => {
					trace!(?x_key, ?y_key, "Swap");
					index += 1;
					self.diff_help(x_node, y_next_node, &mut reorder.patches, index);
					self.insert_node(&mut reorder, y_key.clone(), y_node, Some(y_index));
					index += x_node.descendants();

					index += 1;
					self.remove_node(&mut reorder, y_key.clone(), x_next_node, index);
					index += x_next_node.descendants();

					x_index += 2;
					y_index += 2;
				}

				(None, Some((_, y_next_node))) => {
					trace!(?y_key, "Insertion");
					index += 1;
					self.insert_node(&mut reorder, y_key.clone(), y_node, Some(y_index));
					self.diff_help(x_node, y_next_node, &mut reorder.patches, index);
					index += x_node.descendants();

					x_index += 1;
					y_index += 2;
				}

				(Some((_, x_next_node)), None) => {
					trace!(?x_key, "Removal");
					index += 1;
					self.remove_node(&mut reorder, x_key.clone(), x_node, index);
					index += x_node.descendants();

					index += 1;
					self.diff_help(x_next_node, y_node, &mut reorder.patches, index);
					index += x_next_node.descendants();

					x_index += 2;
					y_index += 1;
				}

				(None, None) => match (x_next, y_next) {
					(Some((x_next_key, x_next_node)), Some((y_next_key, y_next_node))) if x_next_key == y_next_key => {
						trace!(?x_key, ?y_key, "Replacement");
						index += 1;
						self.remove_node(&mut reorder, x_key.clone(), x_node, index);
						self.insert_node(&mut reorder, y_key.clone(), y_node, Some(y_index));
						index += x_node.descendants();

						index += 1;
						self.diff_help(x_next_node, y_next_node, &mut reorder.patches, index);
						index += x_next_node.descendants();

						x_index += 2;
						y_index += 2;
					}
					_ => break,
				},
			}
		}

		for (x_key, x_node) in &x_children[x_index..] {
			index += 1;
			self.remove_node(&mut reorder, x_key.clone(), x_node, index);
			index += x_node.descendants();
		}

		for (y_key, y_node) in &y_children[y_index..] {
			self.insert_node(&mut reorder, y_key.clone(), y_node, None);
		}

		let KeyedDiff { patches: local_patches, entries, inserts, end_inserts, .. } = reorder;
		if !local_patches.is_empty() || !inserts.is_empty() || !end_inserts.is_empty() {
			self.push(
				patches,
				root_index,
				PatchKind::Reorder(Reorder {
					patches: local_patches,
					entries,
					inserts,
					end_inserts,
				}),
			);
		}
	}

	/// Records that `node` (new) appears under `key`. `position` is [`None`] for end inserts.
	fn insert_node<Msg, D: Document>(&mut self, reorder: &mut KeyedDiff<Msg, D>, key: String, node: &Node<Msg, D>, position: Option<usize>) {
		match reorder.changes.get(&key).copied() {
			None => {
				let id = reorder.entries.len();
				reorder.entries.push(Entry {
					key: key.clone(),
					state: EntryState::Inserted,
					node: node.clone(),
					position,
					remove_slot: None,
					old_index: 0,
					remove_patch: None,
				});
				reorder.record_insert(position, id);
				reorder.changes.insert(key, id);
			}

			Some(id) if reorder.entries[id].state == EntryState::Removed => {
				trace!(?key, "Removed earlier. Moving.");
				reorder.record_insert(position, id);
				let entry = &mut reorder.entries[id];
				entry.state = EntryState::Moved;
				entry.position = position;
				let old_node = entry.node.clone();
				let old_index = entry.old_index;
				let remove_patch = entry.remove_patch;

				let mut sub_patches = Vec::new();
				self.diff_help(&old_node, node, &mut sub_patches, old_index);
				match remove_patch {
					Some(at) => reorder.patches[at].kind = PatchKind::Remove(Some(Move { entry: id, patches: sub_patches })),
					None => unreachable!("sapling-dom bug: Removed entry without removal patch"),
				}
			}

			Some(_) => {
				warn!(?key, "Duplicate key among inserted keyed children. Disambiguating.");
				self.insert_node(reorder, key + DUPLICATE_KEY_SUFFIX, node, position);
			}
		}
	}

	/// Records that `node` (old, at `index`) disappears from under `key`.
	fn remove_node<Msg, D: Document>(&mut self, reorder: &mut KeyedDiff<Msg, D>, key: String, node: &Node<Msg, D>, index: usize) {
		match reorder.changes.get(&key).copied() {
			None => {
				let id = reorder.entries.len();
				let at = reorder.patches.len();
				let slot = self.push(&mut reorder.patches, index, PatchKind::Remove(None));
				reorder.entries.push(Entry {
					key: key.clone(),
					state: EntryState::Removed,
					node: node.clone(),
					position: None,
					remove_slot: Some(slot),
					old_index: index,
					remove_patch: Some(at),
				});
				reorder.changes.insert(key, id);
			}

			Some(id) if reorder.entries[id].state == EntryState::Inserted => {
				trace!(?key, "Inserted earlier. Moving.");
				let new_node = reorder.entries[id].node.clone();
				let mut sub_patches = Vec::new();
				self.diff_help(node, &new_node, &mut sub_patches, index);

				let at = reorder.patches.len();
				let slot = self.push(&mut reorder.patches, index, PatchKind::Remove(Some(Move { entry: id, patches: sub_patches })));
				let entry = &mut reorder.entries[id];
				entry.state = EntryState::Moved;
				entry.remove_slot = Some(slot);
				entry.old_index = index;
				entry.remove_patch = Some(at);
			}

			Some(_) => {
				warn!(?key, "Duplicate key among removed keyed children. Disambiguating.");
				self.remove_node(reorder, key + DUPLICATE_KEY_SUFFIX, node, index);
			}
		}
	}
}
