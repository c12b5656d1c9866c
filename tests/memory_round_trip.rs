use sapling_dom::{
	diff,
	load::virtualize,
	memory::{MemoryDocument, NodeId, TreeError},
	Document, DomPatcher, Facts, Handler, Node, VirtualDom, Widget, WidgetPatch,
};
use std::{any::Any, cell::RefCell, rc::Rc};

type Html = Node<u32, MemoryDocument>;

fn el(tag: &str, facts: Facts<u32>, children: Vec<Html>) -> Html {
	Node::element(tag, facts, children)
}

fn text(text: &str) -> Html {
	Node::text(text)
}

/// Renders `old`, patches it to `new` and compares the result with a fresh rendering of `new`.
fn assert_round_trip(old: &Html, new: &Html) -> (DomPatcher<u32, MemoryDocument>, NodeId) {
	let mut patcher = DomPatcher::new(MemoryDocument::new(), |_, _| ());
	let body = patcher.document_mut().create_element(None, "body").unwrap();
	let root = patcher.render(old).unwrap();
	patcher.document_mut().append_child(&body, &root).unwrap();

	let root = patcher.apply(root, old, diff(old, new));
	let fresh = patcher.render(new).unwrap();
	assert_eq!(patcher.document().markup(root), patcher.document().markup(fresh));
	assert_eq!(patcher.document().child_nodes(&body), vec![root]);
	(patcher, root)
}

#[test]
fn text_and_children() {
	assert_round_trip(
		&el("div", Facts::new(), vec![text("a"), el("p", Facts::new(), vec![text("b")]), text("c")]),
		&el("div", Facts::new(), vec![text("A"), el("p", Facts::new(), vec![text("b"), text("B")])]),
	);
}

#[test]
fn facts_of_every_category() {
	assert_round_trip(
		&el(
			"div",
			Facts::new().style("color", "red").style("width", "1px").attribute("title", "t").attribute_ns("urn:x", "x", "1").property("hidden", true),
			vec![],
		),
		&el(
			"div",
			Facts::new().style("color", "blue").attribute("lang", "en").attribute_ns("urn:x", "y", "2").class_name("a").class_name("b"),
			vec![],
		),
	);
}

#[test]
fn nested_redraws() {
	assert_round_trip(
		&el("div", Facts::new(), vec![el("span", Facts::new(), vec![text("a")]), el("i", Facts::new(), vec![])]),
		&el("div", Facts::new(), vec![el("b", Facts::new(), vec![text("a")]), text("i")]),
	);
}

#[test]
fn root_replacement() {
	let old = el("div", Facts::new(), vec![text("a")]);
	let new = el("section", Facts::new(), vec![text("a")]);
	let (patcher, root) = assert_round_trip(&old, &new);
	assert_eq!(patcher.document().tag(root), Some("section"));
}

#[test]
fn root_text_replacement() {
	let (patcher, root) = assert_round_trip(&text("a"), &el("div", Facts::new(), vec![]));
	assert_eq!(patcher.document().tag(root), Some("div"));
}

#[test]
fn taggers_added_and_removed() {
	assert_round_trip(
		&el("div", Facts::new(), vec![el("p", Facts::new(), vec![text("a")])]),
		&el("div", Facts::new(), vec![el("p", Facts::new(), vec![text("b")]).map(|m| m + 1)]),
	);
	assert_round_trip(
		&el("div", Facts::new(), vec![el("p", Facts::new(), vec![text("a")]).map(|m| m + 1), text("x")]),
		&el("div", Facts::new(), vec![el("p", Facts::new(), vec![text("b")]), text("y")]),
	);
}

#[test]
fn patches_below_taggers() {
	assert_round_trip(
		&el("div", Facts::new(), vec![el("p", Facts::new(), vec![text("a"), text("b")]).map(|m| m + 1)]),
		&el("div", Facts::new(), vec![el("p", Facts::new().attribute("id", "p"), vec![text("a"), text("c")]).map(|m| m + 2)]),
	);
}

#[test]
fn patches_inside_lazy_nodes() {
	let lazy = |value: u32| -> Html {
		let model: Rc<dyn Any> = Rc::new(value);
		Node::lazy(vec![model], move || el("ul", Facts::new(), (0..value).map(|i| el("li", Facts::new(), vec![text(&i.to_string())])).collect()))
	};
	assert_round_trip(&el("div", Facts::new(), vec![lazy(2), text("x")]), &el("div", Facts::new(), vec![lazy(4), text("y")]));
	assert_round_trip(&el("div", Facts::new(), vec![lazy(3)]), &el("div", Facts::new(), vec![lazy(1)]));
}

#[test]
fn keyed_children_deep_inside() {
	let row = |key: &str, label: &str| (key.to_owned(), el("tr", Facts::new().attribute("id", key), vec![el("td", Facts::new(), vec![text(label)])]));
	assert_round_trip(
		&el("table", Facts::new(), vec![Node::keyed("tbody", Facts::new(), vec![row("1", "one"), row("2", "two"), row("3", "three")]), text("end")]),
		&el("table", Facts::new(), vec![Node::keyed("tbody", Facts::new(), vec![row("3", "THREE"), row("1", "one"), row("4", "four")]), text("END")]),
	);
}

struct Counter;

impl Widget<MemoryDocument> for Counter {
	type Model = u32;

	fn render(model: &u32, document: &mut MemoryDocument) -> Result<NodeId, TreeError> {
		let element = document.create_element(None, "output")?;
		let text = document.create_text_node(&model.to_string());
		document.append_child(&element, &text)?;
		Ok(element)
	}

	fn diff(old: &u32, new: &u32) -> Option<WidgetPatch<MemoryDocument>> {
		(old != new).then(|| {
			let new = *new;
			WidgetPatch::new(move |document: &mut MemoryDocument, node| {
				let text = document.child_nodes(&node)[0];
				document.set_text(&text, &new.to_string())?;
				Ok(node)
			})
		})
	}
}

#[test]
fn widgets_patch_themselves() {
	let old = el("div", Facts::new(), vec![Node::custom::<Counter>(Facts::new(), 1)]);
	let new = el("div", Facts::new(), vec![Node::custom::<Counter>(Facts::new().attribute("id", "c"), 2)]);
	let patches = diff(&old, &new).patches;
	assert_eq!(patches.iter().map(|patch| patch.kind_name()).collect::<Vec<_>>(), ["Facts", "Widget"]);

	let (patcher, root) = assert_round_trip(&old, &new);
	assert_eq!(patcher.document().markup(root), r#"<div><output id="c">2</output></div>"#);
}

/// Renders a new `<output>` on every change instead of updating the old one.
struct Swapper;

impl Widget<MemoryDocument> for Swapper {
	type Model = u32;

	fn render(model: &u32, document: &mut MemoryDocument) -> Result<NodeId, TreeError> {
		Counter::render(model, document)
	}

	fn diff(old: &u32, new: &u32) -> Option<WidgetPatch<MemoryDocument>> {
		(old != new).then(|| {
			let new = *new;
			WidgetPatch::new(move |document: &mut MemoryDocument, _| Swapper::render(&new, document))
		})
	}
}

fn swapper_view(model: u32, offset: u32) -> Html {
	let facts = Facts::new().attribute("id", "w").style("color", "red").on("click", Handler::normal(|_| Ok(7)));
	el("div", Facts::new(), vec![Node::custom::<Swapper>(facts, model).map(move |m| m + offset)])
}

#[test]
fn replaced_widget_nodes_keep_facts_and_listeners() {
	assert_round_trip(&swapper_view(1, 0), &swapper_view(2, 100));

	let messages = Rc::new(RefCell::new(Vec::new()));
	let mut patcher = {
		let messages = Rc::clone(&messages);
		DomPatcher::new(MemoryDocument::new(), move |message, _| messages.borrow_mut().push(message))
	};
	let body = patcher.document_mut().create_element(None, "body").unwrap();
	let mut vdom = VirtualDom::append_to(patcher, &body, swapper_view(1, 0)).unwrap();
	let first = vdom.document().find_by_id(*vdom.root(), "w").unwrap();

	for (model, offset) in [(2, 100), (3, 1000)] {
		let root = *vdom.update(swapper_view(model, offset));
		let widget = vdom.document().find_by_id(root, "w").unwrap();
		assert_ne!(widget, first);
		assert_eq!(vdom.document().markup(root), format!(r#"<div><output id="w" style="color: red">{}</output></div>"#, model));

		vdom.document().dispatch(widget, "click", &());
		assert_eq!(messages.borrow_mut().drain(..).collect::<Vec<_>>(), [7 + offset]);
	}
	assert_eq!(vdom.patcher().listener_count(), 1);
}

#[test]
fn mounting_rewrites_unsafe_live_attributes() {
	let mut document = MemoryDocument::new();
	let link = document.create_element(None, "a").unwrap();
	document.set_attribute(&link, None, "href", "javascript:alert(1)").unwrap();
	document.set_attribute(&link, None, "onclick", "steal()").unwrap();

	let mounted: Html = virtualize(&document, &link);
	match mounted.kind() {
		sapling_dom::node::VirtualNode::Element(element) => {
			assert_eq!(element.facts().attributes["href"], "javascript:alert(1)");
			assert_eq!(element.facts().attributes["onclick"], "steal()");
		}
		_ => panic!("Unexpected node: {:?}", mounted),
	}

	let mut vdom = VirtualDom::mount(DomPatcher::new(document, |_: u32, _| ()), link);
	let next = el("a", Facts::new().attribute("href", ""), vec![]);
	let root = *vdom.update(next.clone());
	assert_eq!(root, link);
	assert_eq!(vdom.document().markup(root), r#"<a href=""></a>"#);

	let fresh = vdom.patcher_mut().render(&next).unwrap();
	assert_eq!(vdom.document().markup(root), vdom.document().markup(fresh));
}

#[test]
fn mounting_existing_content() {
	let mut document = MemoryDocument::new();
	let root = document.create_element(None, "main").unwrap();
	document.set_attribute(&root, None, "id", "app").unwrap();
	let greeting = document.create_text_node("server-rendered");
	document.append_child(&root, &greeting).unwrap();

	let tree: Html = virtualize(&document, &root);
	assert!(diff(&tree, &el("main", Facts::new().attribute("id", "app"), vec![text("server-rendered")])).is_empty());

	let mut vdom = VirtualDom::mount(DomPatcher::new(document, |_: u32, _| ()), root);
	let root = *vdom.update(el("main", Facts::new().attribute("id", "app"), vec![text("client-rendered")]));
	assert_eq!(vdom.document().child_nodes(&root), vec![greeting]);
	assert_eq!(vdom.document().markup(root), r#"<main id="app">client-rendered</main>"#);
}

#[test]
fn virtual_dom_update_sequence() {
	let view = |n: u32| el("ol", Facts::new(), (0..n).map(|i| el("li", Facts::new(), vec![text(&i.to_string())])).collect());

	let mut patcher = DomPatcher::new(MemoryDocument::new(), |_, _| ());
	let body = patcher.document_mut().create_element(None, "body").unwrap();
	let mut vdom = VirtualDom::append_to(patcher, &body, view(0)).unwrap();
	for n in [3, 1, 4, 1, 5, 0, 2] {
		let root = *vdom.update(view(n));
		assert_eq!(vdom.document().child_nodes(&root).len(), n as usize);
	}
	assert_eq!(vdom.document().markup(*vdom.root()), "<ol><li>0</li><li>1</li></ol>");
}
