#![doc(html_root_url = "https://docs.rs/sapling-dom/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! A virtual tree differ.
//!
//! Views are described as immutable [`Node`] trees. [`diff`] compares two of them and produces a [`Diff`],
//! a list of patches addressed by pre-order index into the old tree.
//! A [`DomPatcher`] then locates the affected live nodes and mutates a [`Document`] in place.
//!
//! [`VirtualDom`] ties these together for the common render-update loop.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod apply;
pub mod config;
pub mod diff;
pub mod document;
pub mod event;
pub mod facts;
pub mod load;
pub mod locate;
pub mod memory;
pub mod node;
pub mod patch;
pub mod web;

pub use apply::DomPatcher;
pub use config::Config;
pub use diff::diff;
pub use document::{Document, EventOutcome, NodeKey, PropertyValue};
pub use facts::{CustomHandling, DecodeError, Decoder, Facts, Handler};
pub use node::{Node, Widget, WidgetPatch};
pub use patch::{Diff, Patch, PatchKind};

use std::borrow::Cow;
use tracing::{instrument, trace};

/// Text content and attribute values as they may appear in log output.
#[cfg(feature = "dangerous-logging")]
pub(crate) fn loggable(text: &str) -> Cow<'_, str> {
	Cow::Borrowed(text)
}

/// Text content and attribute values as they may appear in log output.
#[cfg(not(feature = "dangerous-logging"))]
pub(crate) fn loggable(text: &str) -> Cow<'_, str> {
	Cow::Owned(format!("<{} bytes>", text.len()))
}

/// A live tree kept in sync with the latest virtual tree.
pub struct VirtualDom<Msg, D: Document> {
	patcher: DomPatcher<Msg, D>,
	root: D::Node,
	tree: Node<Msg, D>,
}

impl<Msg: 'static, D: Document> VirtualDom<Msg, D> {
	/// Takes over pre-existing live content at `root`. The first [`VirtualDom::update`] patches it in place.
	pub fn mount(patcher: DomPatcher<Msg, D>, root: D::Node) -> Self {
		let tree = load::virtualize(patcher.document(), &root);
		Self { patcher, root, tree }
	}

	/// Renders `tree` and appends the result to `parent`.
	///
	/// # Errors
	///
	/// Iff the root node can't be created or appended.
	pub fn append_to(mut patcher: DomPatcher<Msg, D>, parent: &D::Node, tree: Node<Msg, D>) -> Result<Self, D::Error> {
		let root = patcher.render(&tree)?;
		patcher.document_mut().append_child(parent, &root)?;
		Ok(Self { patcher, root, tree })
	}

	/// Diffs `next` against the current tree, patches the live tree and returns its (possibly replaced) root.
	#[instrument(skip_all)]
	pub fn update(&mut self, next: Node<Msg, D>) -> &D::Node {
		let diff = diff(&self.tree, &next);
		trace!("{} top-level patch(es).", diff.patches.len());
		self.root = self.patcher.apply(self.root.clone(), &self.tree, diff);
		self.tree = next;
		&self.root
	}

	#[must_use]
	pub fn root(&self) -> &D::Node {
		&self.root
	}

	#[must_use]
	pub fn tree(&self) -> &Node<Msg, D> {
		&self.tree
	}

	#[must_use]
	pub fn patcher(&self) -> &DomPatcher<Msg, D> {
		&self.patcher
	}

	pub fn patcher_mut(&mut self) -> &mut DomPatcher<Msg, D> {
		&mut self.patcher
	}

	#[must_use]
	pub fn document(&self) -> &D {
		self.patcher.document()
	}
}
