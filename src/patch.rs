//! Patches: mutations computed by the differ, addressed by pre-order index into the *old* tree.
//!
//! Patches don't know which live node they apply to. That is resolved in a separate pass ([`crate::locate`]) into an
//! arena indexed by [`Patch::slot`], so neither side refers back to the other.

use crate::{
	document::Document,
	facts::FactsDiff,
	node::{Node, TaggerChain, WidgetPatch},
};
use core::fmt;

pub struct Patch<Msg, D: Document> {
	/// Position of the target node in a pre-order traversal of the old tree.
	pub index: usize,
	/// Where the locator stores this patch's live node and event context.
	pub slot: usize,
	pub kind: PatchKind<Msg, D>,
}

pub enum PatchKind<Msg, D: Document> {
	/// Replace the whole subtree with a freshly rendered one.
	Redraw(Node<Msg, D>),
	Facts(FactsDiff<Msg>),
	Text(String),
	/// Patches within a lazy node's content. Indices restart at 0.
	Thunk(Vec<Patch<Msg, D>>),
	Tagger(TaggerChain<Msg>),
	/// Keep the first `keep` children and remove the `count` following ones.
	TrimChildren { keep: usize, count: usize },
	/// Render `children` and insert them before the child at `from` (which is usually past the end).
	AppendChildren { from: usize, children: Vec<Node<Msg, D>> },
	/// Only appears inside [`Reorder::patches`].
	Remove(Option<Move<Msg, D>>),
	Reorder(Reorder<Msg, D>),
	/// `node` is the new custom node. If the patch hands back a different live node, that node gets `node`'s facts.
	Widget { patch: WidgetPatch<D>, node: Node<Msg, D> },
}

pub type EntryId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
	Inserted,
	Removed,
	/// Removed and inserted under the same key. The live node is reused.
	Moved,
}

/// Bookkeeping for a keyed child that was inserted, removed or moved.
pub struct Entry<Msg, D: Document> {
	pub key: String,
	pub state: EntryState,
	/// The new node for insertions, the old node for removals.
	pub node: Node<Msg, D>,
	/// Target position among the new children. [`None`] for end inserts and plain removals.
	pub position: Option<usize>,
	/// Slot of the [`PatchKind::Remove`] that locates the live node of a removed or moved entry.
	pub remove_slot: Option<usize>,
	pub(crate) old_index: usize,
	pub(crate) remove_patch: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insert {
	pub position: usize,
	pub entry: EntryId,
}

pub struct Move<Msg, D: Document> {
	pub entry: EntryId,
	/// Patches for the moved node itself, indexed like its removal.
	pub patches: Vec<Patch<Msg, D>>,
}

pub struct Reorder<Msg, D: Document> {
	/// Diffs of matched children and [`PatchKind::Remove`]s, in ascending index order.
	pub patches: Vec<Patch<Msg, D>>,
	pub entries: Vec<Entry<Msg, D>>,
	/// Ascending by position.
	pub inserts: Vec<Insert>,
	/// Appended after everything else.
	pub end_inserts: Vec<EntryId>,
}

/// The result of [`crate::diff::diff`].
pub struct Diff<Msg, D: Document> {
	pub patches: Vec<Patch<Msg, D>>,
	/// One more than the highest [`Patch::slot`] among all (nested) patches.
	pub slot_count: usize,
}

impl<Msg, D: Document> Diff<Msg, D> {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.patches.is_empty()
	}

	/// All patches, including nested ones, depth-first.
	#[must_use]
	pub fn flatten(&self) -> Vec<&Patch<Msg, D>> {
		let mut all = Vec::new();
		for patch in &self.patches {
			patch.collect_into(&mut all);
		}
		all
	}
}

impl<Msg, D: Document> Patch<Msg, D> {
	fn collect_into<'a>(&'a self, all: &mut Vec<&'a Patch<Msg, D>>) {
		all.push(self);
		let nested: &[Patch<Msg, D>] = match &self.kind {
			PatchKind::Thunk(patches) | PatchKind::Remove(Some(Move { patches, .. })) => patches,
			PatchKind::Reorder(reorder) => &reorder.patches,
			_ => &[],
		};
		for patch in nested {
			patch.collect_into(all);
		}
	}

	#[must_use]
	pub fn kind_name(&self) -> &'static str {
		self.kind.name()
	}
}

impl<Msg, D: Document> PatchKind<Msg, D> {
	#[must_use]
	pub fn name(&self) -> &'static str {
		match self {
			PatchKind::Redraw(_) => "Redraw",
			PatchKind::Facts(_) => "Facts",
			PatchKind::Text(_) => "Text",
			PatchKind::Thunk(_) => "Thunk",
			PatchKind::Tagger(_) => "Tagger",
			PatchKind::TrimChildren { .. } => "TrimChildren",
			PatchKind::AppendChildren { .. } => "AppendChildren",
			PatchKind::Remove(_) => "Remove",
			PatchKind::Reorder(_) => "Reorder",
			PatchKind::Widget { .. } => "Widget",
		}
	}
}

impl<Msg, D: Document> fmt::Debug for Patch<Msg, D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Patch").field("index", &self.index).field("slot", &self.slot).field("kind", &self.kind).finish()
	}
}

impl<Msg, D: Document> fmt::Debug for PatchKind<Msg, D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PatchKind::Redraw(node) => f.debug_tuple("Redraw").field(node).finish(),
			PatchKind::Facts(diff) => f.debug_tuple("Facts").field(diff).finish(),
			PatchKind::Text(text) => f.debug_tuple("Text").field(text).finish(),
			PatchKind::Thunk(patches) => f.debug_tuple("Thunk").field(patches).finish(),
			PatchKind::Tagger(chain) => f.debug_tuple("Tagger").field(&chain.len()).finish(),
			PatchKind::TrimChildren { keep, count } => f.debug_struct("TrimChildren").field("keep", keep).field("count", count).finish(),
			PatchKind::AppendChildren { from, children } => f.debug_struct("AppendChildren").field("from", from).field("children", children).finish(),
			PatchKind::Remove(None) => f.write_str("Remove"),
			PatchKind::Remove(Some(Move { entry, patches })) => f.debug_struct("Remove").field("entry", entry).field("patches", patches).finish(),
			PatchKind::Reorder(reorder) => f
				.debug_struct("Reorder")
				.field("patches", &reorder.patches)
				.field("entries", &reorder.entries)
				.field("inserts", &reorder.inserts)
				.field("end_inserts", &reorder.end_inserts)
				.finish(),
			PatchKind::Widget { patch, node } => f.debug_struct("Widget").field("patch", patch).field("node", node).finish(),
		}
	}
}

impl<Msg, D: Document> fmt::Debug for Entry<Msg, D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Entry")
			.field("key", &self.key)
			.field("state", &self.state)
			.field("position", &self.position)
			.field("remove_slot", &self.remove_slot)
			.finish()
	}
}

impl<Msg, D: Document> fmt::Debug for Diff<Msg, D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Diff").field("patches", &self.patches).field("slot_count", &self.slot_count).finish()
	}
}
