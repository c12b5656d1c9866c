//! Routing of decoded event messages through tagger chains to the application sink.
//!
//! Each rendered tagger subtree gets an [`EventContext`] that points at the context it was rendered in,
//! so a message is remapped innermost-first on its way up and reaches the sink exactly once.

use crate::{
	document::{EventOutcome, Listener},
	facts::Handler,
	node::TaggerChain,
};
use core::{any::Any, cell::RefCell, fmt};
use std::rc::Rc;
use tracing::{debug, trace_span};

/// Receives every message produced by an event handler, together with whether the handler asked to stop propagation.
pub type Sink<Msg> = Rc<dyn Fn(Msg, bool)>;

enum Upstream<Msg> {
	Sink(Sink<Msg>),
	Parent(Rc<EventContext<Msg>>),
}

pub struct EventContext<Msg> {
	/// Outermost first, like [`crate::node::Tagged::flatten`] returns them.
	taggers: RefCell<TaggerChain<Msg>>,
	upstream: Upstream<Msg>,
}

impl<Msg> EventContext<Msg> {
	/// The context of a whole rendered tree.
	#[must_use]
	pub fn root(sink: Sink<Msg>) -> Rc<Self> {
		Rc::new(Self {
			taggers: RefCell::new(TaggerChain::new()),
			upstream: Upstream::Sink(sink),
		})
	}

	/// The context of a tagger subtree rendered within `parent`.
	#[must_use]
	pub fn child(parent: &Rc<Self>, taggers: TaggerChain<Msg>) -> Rc<Self> {
		Rc::new(Self {
			taggers: RefCell::new(taggers),
			upstream: Upstream::Parent(Rc::clone(parent)),
		})
	}

	/// Swaps the chain in place. Listeners registered below this context pick up the change without being touched.
	pub fn set_taggers(&self, taggers: TaggerChain<Msg>) {
		*self.taggers.borrow_mut() = taggers;
	}

	#[must_use]
	pub fn tagger_count(&self) -> usize {
		self.taggers.borrow().len()
	}

	/// Remaps `message` through this and every enclosing chain, then hands it to the sink.
	pub fn deliver(&self, mut message: Msg, stop_propagation: bool) {
		let mut context = self;
		loop {
			// Cloned so that taggers may re-enter the patcher.
			let chain = context.taggers.borrow().clone();
			for tagger in chain.iter().rev() {
				message = tagger(message);
			}
			match &context.upstream {
				Upstream::Parent(parent) => context = parent,
				Upstream::Sink(sink) => return sink(message, stop_propagation),
			}
		}
	}
}

impl<Msg> fmt::Debug for EventContext<Msg> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventContext")
			.field("taggers", &self.tagger_count())
			.field("root", &matches!(self.upstream, Upstream::Sink(_)))
			.finish()
	}
}

/// A handler installed on a live node.
///
/// The listener only holds the shared handler cell and its context,
/// so replacing the handler in place changes what the already-installed listener does.
pub(crate) struct Registration<Msg> {
	pub(crate) handler: Rc<RefCell<Handler<Msg>>>,
	pub(crate) listener: Listener,
}

pub(crate) fn register<Msg: 'static>(context: Rc<EventContext<Msg>>, handler: Handler<Msg>) -> Registration<Msg> {
	let handler = Rc::new(RefCell::new(handler));
	let listener: Listener = {
		let handler = Rc::clone(&handler);
		Rc::new(move |event: &dyn Any| {
			let current = handler.borrow().clone();
			dispatch(&context, &current, event)
		})
	};
	Registration { handler, listener }
}

/// Decodes `event` with `handler` and delivers the result through `context`.
///
/// Undecodable events are dropped without any side effect.
pub fn dispatch<Msg>(context: &EventContext<Msg>, handler: &Handler<Msg>, event: &dyn Any) -> EventOutcome {
	let span = trace_span!("Dispatching event");
	let _enter = span.enter();

	match handler.decode(event) {
		Ok((message, outcome)) => {
			context.deliver(message, outcome.stop_propagation);
			outcome
		}
		Err(error) => {
			debug!("Dropping undecodable event: {}", error);
			EventOutcome::default()
		}
	}
}
