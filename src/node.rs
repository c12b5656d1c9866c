//! The immutable virtual tree.
//!
//! [`Node`] is a reference-counted handle. Cloning it is cheap, and two handles to the same allocation are *identical*,
//! which the differ uses as its first and only short-circuit. Content equality is never checked.

use crate::{
	document::Document,
	facts::{no_script, Facts},
};
use core::{
	any::{type_name, Any, TypeId},
	cell::OnceCell,
	fmt,
};
use smallvec::SmallVec;
use std::rc::Rc;

/// Remaps messages produced within a subtree.
pub type Tagger<Msg> = Rc<dyn Fn(Msg) -> Msg>;

/// Flattened nested taggers, outermost first.
pub type TaggerChain<Msg> = SmallVec<[Tagger<Msg>; 2]>;

pub(crate) fn same_tagger<Msg>(a: &Tagger<Msg>, b: &Tagger<Msg>) -> bool {
	Rc::as_ptr(a).cast::<()>() == Rc::as_ptr(b).cast::<()>()
}

pub struct Node<Msg, D: Document>(Rc<VirtualNode<Msg, D>>);

pub enum VirtualNode<Msg, D: Document> {
	Text(String),
	Element(Element<Msg, D>),
	Keyed(KeyedElement<Msg, D>),
	Custom(Custom<Msg, D>),
	Tagger(Tagged<Msg, D>),
	Lazy(Lazy<Msg, D>),
}

pub struct Element<Msg, D: Document> {
	tag: String,
	namespace: Option<String>,
	facts: Facts<Msg>,
	children: Vec<Node<Msg, D>>,
	descendants: usize,
}

pub struct KeyedElement<Msg, D: Document> {
	tag: String,
	namespace: Option<String>,
	facts: Facts<Msg>,
	children: Vec<(String, Node<Msg, D>)>,
	descendants: usize,
}

pub struct Tagged<Msg, D: Document> {
	tagger: Tagger<Msg>,
	child: Node<Msg, D>,
	descendants: usize,
}

/// A memoized subtree.
///
/// The content is computed at most once per node. When the differ finds that the old and new lazy nodes were built from
/// identical references, the new node adopts the old node's content without running its thunk.
pub struct Lazy<Msg, D: Document> {
	refs: Vec<Rc<dyn Any>>,
	thunk: Rc<dyn Fn() -> Node<Msg, D>>,
	cache: OnceCell<Node<Msg, D>>,
}

/// An externally rendered subtree.
///
/// Implemented by a (usually zero-sized) marker type per kind of widget; the marker's [`TypeId`] is the widget's render identity.
pub trait Widget<D: Document>: 'static {
	type Model: 'static;

	fn render(model: &Self::Model, document: &mut D) -> Result<D::Node, D::Error>;

	/// Returns [`None`] if the rendered node needs no update.
	fn diff(old: &Self::Model, new: &Self::Model) -> Option<WidgetPatch<D>>;
}

/// An update for a rendered widget. Returns the node that represents the widget afterwards.
#[allow(clippy::type_complexity)]
pub struct WidgetPatch<D: Document>(Box<dyn FnOnce(&mut D, D::Node) -> Result<D::Node, D::Error>>);

impl<D: Document> WidgetPatch<D> {
	pub fn new(patch: impl FnOnce(&mut D, D::Node) -> Result<D::Node, D::Error> + 'static) -> Self {
		Self(Box::new(patch))
	}

	pub(crate) fn apply(self, document: &mut D, node: D::Node) -> Result<D::Node, D::Error> {
		(self.0)(document, node)
	}
}

impl<D: Document> fmt::Debug for WidgetPatch<D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("WidgetPatch(..)")
	}
}

#[allow(clippy::type_complexity)]
pub struct Custom<Msg, D: Document> {
	facts: Facts<Msg>,
	widget: TypeId,
	widget_name: &'static str,
	model: Rc<dyn Any>,
	render: fn(&dyn Any, &mut D) -> Result<D::Node, D::Error>,
	diff: fn(&dyn Any, &dyn Any) -> Option<WidgetPatch<D>>,
}

fn downcast_model<D: Document, W: Widget<D>>(model: &dyn Any) -> &W::Model {
	model
		.downcast_ref()
		.unwrap_or_else(|| panic!("sapling-dom bug: Widget model is not a `{}`", type_name::<W::Model>()))
}

fn render_widget<D: Document, W: Widget<D>>(model: &dyn Any, document: &mut D) -> Result<D::Node, D::Error> {
	W::render(downcast_model::<D, W>(model), document)
}

fn diff_widget<D: Document, W: Widget<D>>(old: &dyn Any, new: &dyn Any) -> Option<WidgetPatch<D>> {
	W::diff(downcast_model::<D, W>(old), downcast_model::<D, W>(new))
}

impl<Msg, D: Document> Custom<Msg, D> {
	#[must_use]
	pub fn facts(&self) -> &Facts<Msg> {
		&self.facts
	}

	#[must_use]
	pub fn same_widget(&self, other: &Self) -> bool {
		self.widget == other.widget
	}

	pub(crate) fn render(&self, document: &mut D) -> Result<D::Node, D::Error> {
		(self.render)(&*self.model, document)
	}

	/// Must only be called if [`Custom::same_widget`].
	pub(crate) fn diff(&self, new: &Self) -> Option<WidgetPatch<D>> {
		debug_assert!(self.same_widget(new));
		(self.diff)(&*self.model, &*new.model)
	}
}

impl<Msg, D: Document> Element<Msg, D> {
	#[must_use]
	pub fn tag(&self) -> &str {
		&self.tag
	}

	#[must_use]
	pub fn namespace(&self) -> Option<&str> {
		self.namespace.as_deref()
	}

	#[must_use]
	pub fn facts(&self) -> &Facts<Msg> {
		&self.facts
	}

	#[must_use]
	pub fn children(&self) -> &[Node<Msg, D>] {
		&self.children
	}
}

impl<Msg, D: Document> KeyedElement<Msg, D> {
	#[must_use]
	pub fn tag(&self) -> &str {
		&self.tag
	}

	#[must_use]
	pub fn namespace(&self) -> Option<&str> {
		self.namespace.as_deref()
	}

	#[must_use]
	pub fn facts(&self) -> &Facts<Msg> {
		&self.facts
	}

	#[must_use]
	pub fn children(&self) -> &[(String, Node<Msg, D>)] {
		&self.children
	}
}

impl<Msg, D: Document> Tagged<Msg, D> {
	#[must_use]
	pub fn tagger(&self) -> &Tagger<Msg> {
		&self.tagger
	}

	#[must_use]
	pub fn child(&self) -> &Node<Msg, D> {
		&self.child
	}

	/// Collects this and all directly nested taggers, and returns the first non-tagger node below them.
	#[must_use]
	pub fn flatten(&self) -> (TaggerChain<Msg>, &Node<Msg, D>) {
		let mut chain = TaggerChain::new();
		chain.push(Rc::clone(&self.tagger));
		let mut child = &self.child;
		while let VirtualNode::Tagger(tagged) = child.kind() {
			chain.push(Rc::clone(&tagged.tagger));
			child = &tagged.child;
		}
		(chain, child)
	}
}

impl<Msg, D: Document> Lazy<Msg, D> {
	/// Pairwise reference identity of the memoization keys.
	#[must_use]
	pub fn same_refs(&self, other: &Self) -> bool {
		self.refs.len() == other.refs.len()
			&& self
				.refs
				.iter()
				.zip(&other.refs)
				.all(|(a, b)| Rc::as_ptr(a).cast::<()>() == Rc::as_ptr(b).cast::<()>())
	}

	/// The content, computing it if necessary.
	#[must_use]
	pub fn force(&self) -> &Node<Msg, D> {
		self.cache.get_or_init(|| (self.thunk)())
	}

	#[must_use]
	pub fn cached(&self) -> Option<&Node<Msg, D>> {
		self.cache.get()
	}

	/// Takes over `previous`'s content, if any, without forcing either node.
	pub(crate) fn adopt(&self, previous: &Self) {
		if let Some(content) = previous.cache.get() {
			// Already-forced nodes keep their own content.
			let _ = self.cache.set(content.clone());
		}
	}
}

pub(crate) struct Head<'a, Msg> {
	pub(crate) tag: &'a str,
	pub(crate) namespace: Option<&'a str>,
	pub(crate) facts: &'a Facts<Msg>,
}

/// Children of either element kind. Keyed children are viewed without their keys.
pub(crate) enum Children<'a, Msg, D: Document> {
	Plain(&'a [Node<Msg, D>]),
	Keyed(&'a [(String, Node<Msg, D>)]),
}

impl<'a, Msg, D: Document> Children<'a, Msg, D> {
	pub(crate) fn len(&self) -> usize {
		match self {
			Children::Plain(children) => children.len(),
			Children::Keyed(children) => children.len(),
		}
	}

	pub(crate) fn get(&self, i: usize) -> &'a Node<Msg, D> {
		match *self {
			Children::Plain(children) => &children[i],
			Children::Keyed(children) => &children[i].1,
		}
	}
}

impl<Msg, D: Document> Node<Msg, D> {
	fn new(node: VirtualNode<Msg, D>) -> Self {
		Self(Rc::new(node))
	}

	pub fn text(text: impl Into<String>) -> Self {
		Self::new(VirtualNode::Text(text.into()))
	}

	#[must_use]
	pub fn element(tag: &str, facts: Facts<Msg>, children: Vec<Self>) -> Self {
		Self::element_in(None, tag, facts, children)
	}

	#[must_use]
	pub fn element_ns(namespace: &str, tag: &str, facts: Facts<Msg>, children: Vec<Self>) -> Self {
		Self::element_in(Some(namespace.to_owned()), tag, facts, children)
	}

	fn element_in(namespace: Option<String>, tag: &str, facts: Facts<Msg>, children: Vec<Self>) -> Self {
		let descendants = children.iter().map(|child| 1 + child.descendants()).sum();
		Self::new(VirtualNode::Element(Element {
			tag: no_script(tag).to_owned(),
			namespace,
			facts,
			children,
			descendants,
		}))
	}

	#[must_use]
	pub fn keyed(tag: &str, facts: Facts<Msg>, children: Vec<(String, Self)>) -> Self {
		Self::keyed_in(None, tag, facts, children)
	}

	#[must_use]
	pub fn keyed_ns(namespace: &str, tag: &str, facts: Facts<Msg>, children: Vec<(String, Self)>) -> Self {
		Self::keyed_in(Some(namespace.to_owned()), tag, facts, children)
	}

	fn keyed_in(namespace: Option<String>, tag: &str, facts: Facts<Msg>, children: Vec<(String, Self)>) -> Self {
		let descendants = children.iter().map(|(_, child)| 1 + child.descendants()).sum();
		Self::new(VirtualNode::Keyed(KeyedElement {
			tag: no_script(tag).to_owned(),
			namespace,
			facts,
			children,
			descendants,
		}))
	}

	#[must_use]
	pub fn custom<W: Widget<D>>(facts: Facts<Msg>, model: W::Model) -> Self {
		Self::new(VirtualNode::Custom(Custom {
			facts,
			widget: TypeId::of::<W>(),
			widget_name: type_name::<W>(),
			model: Rc::new(model),
			render: render_widget::<D, W>,
			diff: diff_widget::<D, W>,
		}))
	}

	/// Wraps this node in a tagger that remaps every message produced by events within it.
	#[must_use]
	pub fn map(self, tagger: impl Fn(Msg) -> Msg + 'static) -> Self {
		self.tagged(Rc::new(tagger))
	}

	/// Like [`Node::map`], but with a shared tagger.
	/// Passing the same [`Rc`] on every render lets the differ recognize the tagger as unchanged.
	#[must_use]
	pub fn tagged(self, tagger: Tagger<Msg>) -> Self {
		let descendants = 1 + self.descendants();
		Self::new(VirtualNode::Tagger(Tagged {
			tagger,
			child: self,
			descendants,
		}))
	}

	/// A memoized node. `refs` are compared by reference identity, never by value.
	pub fn lazy(refs: Vec<Rc<dyn Any>>, thunk: impl Fn() -> Self + 'static) -> Self {
		Self::new(VirtualNode::Lazy(Lazy {
			refs,
			thunk: Rc::new(thunk),
			cache: OnceCell::new(),
		}))
	}

	/// Tag, namespace, facts and children of (keyed) elements.
	pub(crate) fn element_parts(&self) -> Option<(Head<'_, Msg>, Children<'_, Msg, D>)> {
		match self.kind() {
			VirtualNode::Element(element) => Some((
				Head {
					tag: &element.tag,
					namespace: element.namespace(),
					facts: &element.facts,
				},
				Children::Plain(&element.children),
			)),
			VirtualNode::Keyed(keyed) => Some((
				Head {
					tag: &keyed.tag,
					namespace: keyed.namespace(),
					facts: &keyed.facts,
				},
				Children::Keyed(&keyed.children),
			)),
			_ => None,
		}
	}

	#[must_use]
	pub fn kind(&self) -> &VirtualNode<Msg, D> {
		&self.0
	}

	/// Whether both handles refer to the same node.
	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	/// The number of pre-order indices this node's subtree occupies below the node itself.
	#[must_use]
	pub fn descendants(&self) -> usize {
		match self.kind() {
			VirtualNode::Element(Element { descendants, .. }) | VirtualNode::Keyed(KeyedElement { descendants, .. }) | VirtualNode::Tagger(Tagged { descendants, .. }) => *descendants,
			VirtualNode::Text(_) | VirtualNode::Custom(_) | VirtualNode::Lazy(_) => 0,
		}
	}
}

impl<Msg, D: Document> Clone for Node<Msg, D> {
	fn clone(&self) -> Self {
		Self(Rc::clone(&self.0))
	}
}

impl<Msg, D: Document> fmt::Debug for Node<Msg, D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.kind() {
			VirtualNode::Text(text) => f.debug_tuple("Text").field(text).finish(),
			VirtualNode::Element(element) => f
				.debug_struct("Element")
				.field("tag", &element.tag)
				.field("namespace", &element.namespace)
				.field("facts", &element.facts)
				.field("children", &element.children)
				.finish(),
			VirtualNode::Keyed(keyed) => f
				.debug_struct("Keyed")
				.field("tag", &keyed.tag)
				.field("namespace", &keyed.namespace)
				.field("facts", &keyed.facts)
				.field("children", &keyed.children)
				.finish(),
			VirtualNode::Custom(custom) => f.debug_struct("Custom").field("widget", &custom.widget_name).field("facts", &custom.facts).finish(),
			VirtualNode::Tagger(tagged) => f.debug_struct("Tagger").field("child", &tagged.child).finish(),
			VirtualNode::Lazy(lazy) => f.debug_struct("Lazy").field("refs", &lazy.refs.len()).field("cached", &lazy.cache.get()).finish(),
		}
	}
}
