use sapling_dom::{
	diff,
	memory::{MemoryDocument, NodeId},
	CustomHandling, DecodeError, Decoder, Document, DomPatcher, Facts, Handler, Node,
};
use std::{any::Any, cell::RefCell, rc::Rc};

type Html = Node<u32, MemoryDocument>;

/// Payload dispatched in these tests.
struct Click(u32);

fn decode_click(event: &dyn Any) -> Result<u32, DecodeError> {
	event.downcast_ref::<Click>().map(|click| click.0).ok_or_else(|| DecodeError("expected a Click".to_owned()))
}

fn button(id: &str, handler: Handler<u32>) -> Html {
	Node::element("button", Facts::new().attribute("id", id).on("click", handler), vec![])
}

struct App {
	patcher: DomPatcher<u32, MemoryDocument>,
	root: NodeId,
	tree: Html,
	messages: Rc<RefCell<Vec<(u32, bool)>>>,
}

impl App {
	fn new(tree: Html) -> Self {
		let messages = Rc::new(RefCell::new(Vec::new()));
		let mut patcher = {
			let messages = Rc::clone(&messages);
			DomPatcher::new(MemoryDocument::new(), move |message, stop_propagation| messages.borrow_mut().push((message, stop_propagation)))
		};
		let body = patcher.document_mut().create_element(None, "body").unwrap();
		let root = patcher.render(&tree).unwrap();
		patcher.document_mut().append_child(&body, &root).unwrap();
		Self { patcher, root, tree, messages }
	}

	fn update(&mut self, next: Html) {
		self.root = self.patcher.apply(self.root, &self.tree, diff(&self.tree, &next));
		self.tree = next;
	}

	fn find(&self, id: &str) -> NodeId {
		self.patcher.document().find_by_id(self.root, id).unwrap()
	}

	fn click(&self, id: &str, value: u32) -> sapling_dom::EventOutcome {
		self.patcher.document().dispatch(self.find(id), "click", &Click(value))
	}

	fn take_messages(&self) -> Vec<(u32, bool)> {
		self.messages.borrow_mut().drain(..).collect()
	}
}

#[test]
fn messages_reach_the_sink() {
	let app = App::new(button("b", Handler::normal(decode_click)));
	app.click("b", 7);
	assert_eq!(app.take_messages(), [(7, false)]);
}

#[test]
fn undecodable_events_are_dropped() {
	let app = App::new(button("b", Handler::normal(decode_click)));
	let outcome = app.patcher.document().dispatch(app.find("b"), "click", &"not a click");
	assert_eq!(outcome, sapling_dom::EventOutcome::default());
	assert!(app.take_messages().is_empty());
}

#[test]
fn taggers_apply_innermost_first() {
	let tree = Node::element("div", Facts::new(), vec![button("b", Handler::normal(decode_click)).map(|m| m + 1).map(|m| m * 10)]);
	let app = App::new(tree);
	app.click("b", 1);
	assert_eq!(app.take_messages(), [(20, false)]);
}

#[test]
fn separate_tagger_levels_compose() {
	let inner = Node::element("section", Facts::new(), vec![button("b", Handler::normal(decode_click)).map(|m| m + 1)]);
	let app = App::new(Node::element("div", Facts::new(), vec![inner.map(|m| m * 10)]));
	app.click("b", 1);
	assert_eq!(app.take_messages(), [(20, false)]);
}

#[test]
fn tagger_updates_keep_listeners() {
	let handler = Handler::normal(decode_click);
	let view = |offset: u32| Node::element("div", Facts::new(), vec![button("b", handler.clone()).map(move |m| m + offset)]);

	let mut app = App::new(view(1));
	let listeners = app.patcher.document().listeners(app.find("b"), "click");
	app.update(view(100));
	let after = app.patcher.document().listeners(app.find("b"), "click");
	assert_eq!(after.len(), 1);
	assert!(Rc::ptr_eq(&listeners[0], &after[0]));

	app.click("b", 1);
	assert_eq!(app.take_messages(), [(101, false)]);
}

#[test]
fn handler_swaps_in_place() {
	let mut app = App::new(button("b", Handler::normal(decode_click)));
	let listeners = app.patcher.document().listeners(app.find("b"), "click");

	app.update(button("b", Handler::normal(|event| decode_click(event).map(|value| value + 1000))));
	let after = app.patcher.document().listeners(app.find("b"), "click");
	assert_eq!(after.len(), 1);
	assert!(Rc::ptr_eq(&listeners[0], &after[0]));
	assert_eq!(app.patcher.listener_count(), 1);

	app.click("b", 1);
	assert_eq!(app.take_messages(), [(1001, false)]);
}

#[test]
fn handling_mode_change_reinstalls() {
	let mut app = App::new(button("b", Handler::normal(decode_click)));
	let listeners = app.patcher.document().listeners(app.find("b"), "click");
	assert_eq!(app.patcher.document().listener_options(app.find("b"), "click").map(|options| options.passive), Some(true));

	app.update(button("b", Handler::MayPreventDefault(Decoder::new(|event| Ok((decode_click(event)?, true))))));
	let after = app.patcher.document().listeners(app.find("b"), "click");
	assert_eq!(after.len(), 1);
	assert!(!Rc::ptr_eq(&listeners[0], &after[0]));
	assert_eq!(app.patcher.document().listener_options(app.find("b"), "click").map(|options| options.passive), Some(false));

	let outcome = app.click("b", 3);
	assert!(outcome.prevent_default);
	assert_eq!(app.take_messages(), [(3, false)]);
}

#[test]
fn passive_listeners_can_be_disabled() {
	use sapling_dom::Config;

	let mut patcher = DomPatcher::with_config(MemoryDocument::new(), |_: u32, _| (), Config::new().with_passive_listeners(false));
	let root = patcher.render(&button("b", Handler::normal(decode_click))).unwrap();
	assert_eq!(patcher.document().listener_options(root, "click").map(|options| options.passive), Some(false));
}

#[test]
fn stop_propagation_is_honoured() {
	let outer = Handler::normal(|event| decode_click(event).map(|value| value + 50));
	let inner = Handler::MayStopPropagation(Decoder::new(|event| {
		let value = decode_click(event)?;
		Ok((value, value % 2 == 0))
	}));
	let app = App::new(Node::element("div", Facts::new().attribute("id", "outer").on("click", outer), vec![button("b", inner)]));

	app.click("b", 1);
	assert_eq!(app.take_messages(), [(1, false), (51, false)]);

	let outcome = app.click("b", 2);
	assert!(outcome.stop_propagation);
	assert_eq!(app.take_messages(), [(2, true)]);
}

#[test]
fn custom_handling() {
	let handler = Handler::Custom(Decoder::new(|event| {
		Ok(CustomHandling {
			message: decode_click(event)?,
			stop_propagation: true,
			prevent_default: true,
		})
	}));
	let app = App::new(button("b", handler));
	let outcome = app.click("b", 9);
	assert!(outcome.stop_propagation && outcome.prevent_default);
	assert_eq!(app.take_messages(), [(9, true)]);
}

#[test]
fn removed_handlers_are_uninstalled() {
	let mut app = App::new(Node::element(
		"div",
		Facts::new(),
		vec![button("a", Handler::normal(decode_click)), button("b", Handler::normal(decode_click))],
	));
	assert_eq!(app.patcher.listener_count(), 2);

	app.update(Node::element("div", Facts::new(), vec![Node::element("button", Facts::new().attribute("id", "a"), vec![])]));
	assert_eq!(app.patcher.listener_count(), 0);
	assert_eq!(app.patcher.document().listener_count(app.find("a"), "click"), 0);
	app.click("a", 1);
	assert!(app.take_messages().is_empty());
}

#[test]
fn moved_keyed_children_keep_working() {
	let view = |keys: &[&str]| -> Html {
		Node::keyed(
			"ul",
			Facts::new(),
			keys.iter()
				.enumerate()
				.map(|(i, key)| {
					let offset = u32::try_from(i).unwrap() * 100;
					((*key).to_owned(), button(key, Handler::normal(move |event| decode_click(event).map(|value| value + offset))))
				})
				.collect(),
		)
	};

	let mut app = App::new(view(&["a", "b", "c"]));
	app.update(view(&["c", "a", "b"]));
	assert_eq!(app.patcher.listener_count(), 3);

	app.click("c", 1);
	app.click("b", 1);
	assert_eq!(app.take_messages(), [(1, false), (201, false)]);
}

#[test]
fn redrawn_tagger_children_keep_their_context() {
	let view = |tag: &str| Node::element("div", Facts::new(), vec![Node::element(tag, Facts::new().attribute("id", "x").on("click", Handler::normal(decode_click)), vec![]).map(|m| m + 1)]);

	let mut app = App::new(view("span"));
	app.update(view("em"));
	app.click("x", 1);
	assert_eq!(app.take_messages(), [(2, false)]);
}
