#![cfg(target_arch = "wasm32")]

use sapling_dom::{web::WebDocument, DecodeError, DomPatcher, Facts, Handler, Node, VirtualDom};
use std::{any::Any, cell::RefCell, rc::Rc, sync::Once};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, HtmlElement};

wasm_bindgen_test_configure!(run_in_browser);

type Html = Node<String, WebDocument>;

static LOG_INITIALIZED: Once = Once::new();

fn event_type(event: &dyn Any) -> Result<String, DecodeError> {
	event
		.downcast_ref::<web_sys::Event>()
		.map(web_sys::Event::type_)
		.ok_or_else(|| DecodeError("Expected Event but received something else.".to_owned()))
}

fn mount(tree: Html) -> (VirtualDom<String, WebDocument>, Rc<RefCell<Vec<String>>>) {
	LOG_INITIALIZED.call_once(tracing_wasm::set_as_global_default);

	let messages = Rc::new(RefCell::new(Vec::new()));
	let document = window().unwrap().document().unwrap();
	let body: web_sys::Node = document.body().unwrap().into();
	let patcher = {
		let messages = Rc::clone(&messages);
		DomPatcher::new(WebDocument::new(document), move |message, _| messages.borrow_mut().push(message))
	};
	(VirtualDom::append_to(patcher, &body, tree).unwrap(), messages)
}

fn button(id: &str) -> HtmlElement {
	window().unwrap().document().unwrap().get_element_by_id(id).unwrap().dyn_into().unwrap()
}

fn unmount(vdom: &VirtualDom<String, WebDocument>) {
	let root = vdom.root();
	root.parent_node().unwrap().remove_child(root).unwrap();
}

#[wasm_bindgen_test]
fn click() {
	let tree = Node::element("button", Facts::new().attribute("id", "test-button").on("click", Handler::normal(event_type)), vec![]);
	let (vdom, messages) = mount(tree);
	assert!(messages.borrow().is_empty());

	button("test-button").click();
	assert_eq!(*messages.borrow(), ["click"]);

	button("test-button").click();
	assert_eq!(messages.borrow().len(), 2);
	unmount(&vdom);
}

#[wasm_bindgen_test]
fn tagged_click() {
	let tree = Node::element("div", Facts::new(), vec![Node::element("button", Facts::new().attribute("id", "tagged-button").on("click", Handler::normal(event_type)), vec![]).map(|message| format!("inner {}", message))])
		.map(|message| format!("outer({})", message));
	let (vdom, messages) = mount(tree);

	button("tagged-button").click();
	assert_eq!(*messages.borrow(), ["outer(inner click)"]);
	unmount(&vdom);
}

#[wasm_bindgen_test]
fn removed_listener_is_silent() {
	let with_handler = Node::element("button", Facts::new().attribute("id", "removed-button").on("click", Handler::normal(event_type)), vec![]);
	let (mut vdom, messages) = mount(with_handler);

	vdom.update(Node::element("button", Facts::new().attribute("id", "removed-button"), vec![]));
	button("removed-button").click();
	assert!(messages.borrow().is_empty());
	assert_eq!(vdom.patcher().listener_count(), 0);
	unmount(&vdom);
}
