//! The browser DOM as a [`Document`].

use crate::document::{Document, EventOutcome, Listener, ListenerOptions, NodeInfo, NodeKey, PropertyValue};
use core::{any::Any, cell::Cell};
use hashbrown::HashMap;
use js_sys::{Function, Reflect};
use std::rc::Rc;
use tracing::{error, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{AddEventListenerOptions, CharacterData, CssStyleDeclaration, Element, Event, Text};

const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Expando property that carries each visited node's [`NodeKey`].
const KEY_PROPERTY: &str = "__saplingNodeKey";

struct InstalledListener {
	listener: Listener,
	closure: Closure<dyn FnMut(Event)>,
}

/// Renders into a [`web_sys::Document`].
///
/// Listeners are called with the dispatched [`web_sys::Event`] as payload, so decoders should downcast to that.
/// Style names are CSS property names (`background-color`, not `backgroundColor`).
pub struct WebDocument {
	document: web_sys::Document,
	next_key: Cell<NodeKey>,
	listeners: HashMap<(NodeKey, String), InstalledListener>,
}

impl WebDocument {
	#[must_use]
	pub fn new(document: web_sys::Document) -> Self {
		Self {
			document,
			next_key: Cell::new(0),
			listeners: HashMap::new(),
		}
	}

	#[must_use]
	pub fn document(&self) -> &web_sys::Document {
		&self.document
	}

	fn element(node: &web_sys::Node) -> Result<&Element, JsValue> {
		node.dyn_ref::<Element>().ok_or_else(|| JsValue::from_str("not an element"))
	}

	fn style(node: &web_sys::Node) -> Result<CssStyleDeclaration, JsValue> {
		Reflect::get(node, &JsValue::from_str("style"))?.dyn_into::<CssStyleDeclaration>()
	}
}

fn to_js(value: &PropertyValue) -> JsValue {
	match value {
		PropertyValue::Null => JsValue::NULL,
		PropertyValue::Bool(value) => JsValue::from_bool(*value),
		PropertyValue::Number(value) => JsValue::from_f64(*value),
		PropertyValue::String(value) => JsValue::from_str(value),
	}
}

fn from_js(value: &JsValue) -> Option<PropertyValue> {
	if value.is_null() {
		Some(PropertyValue::Null)
	} else if let Some(value) = value.as_bool() {
		Some(PropertyValue::Bool(value))
	} else if let Some(value) = value.as_f64() {
		Some(PropertyValue::Number(value))
	} else {
		value.as_string().map(PropertyValue::String)
	}
}

impl Document for WebDocument {
	type Node = web_sys::Node;
	type Error = JsValue;

	#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
	fn node_key(&self, node: &web_sys::Node) -> NodeKey {
		let property = JsValue::from_str(KEY_PROPERTY);
		if let Some(key) = Reflect::get(node, &property).ok().and_then(|key| key.as_f64()) {
			return key as NodeKey;
		}

		let key = self.next_key.get();
		self.next_key.set(key + 1);
		if let Err(error) = Reflect::set(node, &property, &JsValue::from_f64(key as f64)) {
			error!("Failed to tag node {:?} with its key: {:?}", node, error);
		}
		key
	}

	fn create_element(&mut self, namespace: Option<&str>, tag: &str) -> Result<web_sys::Node, JsValue> {
		match namespace {
			Some(namespace) => self.document.create_element_ns(Some(namespace), tag),
			None => self.document.create_element(tag),
		}
		.map(web_sys::Node::from)
	}

	fn create_text_node(&mut self, text: &str) -> web_sys::Node {
		self.document.create_text_node(text).into()
	}

	fn set_text(&mut self, node: &web_sys::Node, text: &str) -> Result<(), JsValue> {
		let data = node.dyn_ref::<CharacterData>().ok_or_else(|| JsValue::from_str("not character data"))?;
		data.set_data(text);
		Ok(())
	}

	fn parent_node(&self, node: &web_sys::Node) -> Option<web_sys::Node> {
		node.parent_node()
	}

	fn child_nodes(&self, node: &web_sys::Node) -> Vec<web_sys::Node> {
		let children = node.child_nodes();
		(0..children.length()).filter_map(|i| children.item(i)).collect()
	}

	fn append_child(&mut self, parent: &web_sys::Node, child: &web_sys::Node) -> Result<(), JsValue> {
		parent.append_child(child).map(drop)
	}

	fn insert_before(&mut self, parent: &web_sys::Node, child: &web_sys::Node, reference: Option<&web_sys::Node>) -> Result<(), JsValue> {
		parent.insert_before(child, reference).map(drop)
	}

	fn remove_child(&mut self, parent: &web_sys::Node, child: &web_sys::Node) -> Result<(), JsValue> {
		parent.remove_child(child).map(drop)
	}

	fn replace_child(&mut self, parent: &web_sys::Node, new_child: &web_sys::Node, old_child: &web_sys::Node) -> Result<(), JsValue> {
		parent.replace_child(new_child, old_child).map(drop)
	}

	fn set_attribute(&mut self, node: &web_sys::Node, namespace: Option<&str>, name: &str, value: &str) -> Result<(), JsValue> {
		let element = Self::element(node)?;
		match namespace {
			Some(namespace) => element.set_attribute_ns(Some(namespace), name, value),
			None => element.set_attribute(name, value),
		}
	}

	fn remove_attribute(&mut self, node: &web_sys::Node, namespace: Option<&str>, name: &str) -> Result<(), JsValue> {
		let element = Self::element(node)?;
		match namespace {
			Some(namespace) => element.remove_attribute_ns(Some(namespace), name),
			None => element.remove_attribute(name),
		}
	}

	fn set_style(&mut self, node: &web_sys::Node, name: &str, value: &str) -> Result<(), JsValue> {
		Self::style(node)?.set_property(name, value)
	}

	fn remove_style(&mut self, node: &web_sys::Node, name: &str) -> Result<(), JsValue> {
		Self::style(node)?.remove_property(name).map(drop)
	}

	fn property(&self, node: &web_sys::Node, name: &str) -> Option<PropertyValue> {
		Reflect::get(node, &JsValue::from_str(name)).ok().as_ref().and_then(from_js)
	}

	fn set_property(&mut self, node: &web_sys::Node, name: &str, value: &PropertyValue) -> Result<(), JsValue> {
		Reflect::set(node, &JsValue::from_str(name), &to_js(value)).map(drop)
	}

	/// String properties are cleared to `""`, since many of them stringify `null`.
	fn remove_property(&mut self, node: &web_sys::Node, name: &str) -> Result<(), JsValue> {
		let key = JsValue::from_str(name);
		let cleared = if Reflect::get(node, &key)?.is_string() { JsValue::from_str("") } else { JsValue::NULL };
		Reflect::set(node, &key, &cleared).map(drop)
	}

	fn add_event_listener(&mut self, node: &web_sys::Node, event: &str, listener: &Listener, options: ListenerOptions) -> Result<(), JsValue> {
		let closure = {
			let listener = Rc::clone(listener);
			Closure::wrap(Box::new(move |event: Event| {
				let span = trace_span!("Handling DOM event", event = %event.type_());
				let _enter = span.enter();

				let EventOutcome { stop_propagation, prevent_default } = listener(&event as &dyn Any);
				if stop_propagation {
					event.stop_propagation();
				}
				if prevent_default {
					event.prevent_default();
				}
			}) as Box<dyn FnMut(Event)>)
		};

		let web_options = AddEventListenerOptions::new();
		web_options.set_passive(options.passive);
		node.add_event_listener_with_callback_and_add_event_listener_options(event, closure.as_ref().unchecked_ref::<Function>(), &web_options)?;

		let installed = InstalledListener {
			listener: Rc::clone(listener),
			closure,
		};
		let key = (self.node_key(node), event.to_owned());
		if let Some(previous) = self.listeners.insert(key, installed) {
			warn!("A second {:?} listener was installed on {:?}. Removing the first one.", event, node);
			node.remove_event_listener_with_callback(event, previous.closure.as_ref().unchecked_ref::<Function>())?;
		}
		Ok(())
	}

	fn remove_event_listener(&mut self, node: &web_sys::Node, event: &str, listener: &Listener) -> Result<(), JsValue> {
		let key = (self.node_key(node), event.to_owned());
		match self.listeners.get(&key) {
			Some(installed) if Rc::ptr_eq(&installed.listener, listener) => (),
			_ => return Err(JsValue::from_str("no such listener")),
		}
		let Some(installed) = self.listeners.remove(&key) else { return Ok(()) };
		node.remove_event_listener_with_callback(event, installed.closure.as_ref().unchecked_ref::<Function>())
	}

	fn inspect(&self, node: &web_sys::Node) -> NodeInfo {
		if let Some(text) = node.dyn_ref::<Text>() {
			NodeInfo::Text(text.data())
		} else if let Some(element) = node.dyn_ref::<Element>() {
			let attributes = element.attributes();
			NodeInfo::Element {
				tag: element.local_name(),
				namespace: element.namespace_uri().filter(|namespace| namespace != XHTML_NAMESPACE),
				attributes: (0..attributes.length())
					.filter_map(|i| attributes.item(i))
					.map(|attribute| match attribute.namespace_uri() {
						Some(namespace) => (Some(namespace), attribute.local_name(), attribute.value()),
						None => (None, attribute.name(), attribute.value()),
					})
					.collect(),
			}
		} else {
			NodeInfo::Other
		}
	}
}
