//! Categorized presentation data attached to element and custom nodes, and the per-category diff between two bundles.

use crate::document::{EventOutcome, PropertyValue};
use core::{any::Any, fmt, hash::Hash};
use hashbrown::HashMap;
use std::{borrow::Cow, rc::Rc};
use thiserror::Error;

/// Properties whose live value can be changed by the user and must be re-asserted on every diff.
pub const LIVE_PROPERTIES: [&str; 2] = ["value", "checked"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to decode event: {0}")]
pub struct DecodeError(pub String);

/// Decodes a raw event payload.
pub struct Decoder<T>(Rc<dyn Fn(&dyn Any) -> Result<T, DecodeError>>);

impl<T> Decoder<T> {
	pub fn new(decode: impl Fn(&dyn Any) -> Result<T, DecodeError> + 'static) -> Self {
		Self(Rc::new(decode))
	}

	pub fn decode(&self, event: &dyn Any) -> Result<T, DecodeError> {
		(self.0)(event)
	}

	/// Reference identity. Decoders are opaque, so this is the only equality available.
	#[must_use]
	pub fn same(&self, other: &Self) -> bool {
		Rc::as_ptr(&self.0).cast::<()>() == Rc::as_ptr(&other.0).cast::<()>()
	}
}

impl<T> Clone for Decoder<T> {
	fn clone(&self) -> Self {
		Self(Rc::clone(&self.0))
	}
}

impl<T> fmt::Debug for Decoder<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Decoder({:p})", Rc::as_ptr(&self.0).cast::<()>())
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomHandling<Msg> {
	pub message: Msg,
	pub stop_propagation: bool,
	pub prevent_default: bool,
}

/// An event handler: a decoder plus the handling mode that says how to interpret the decoded value.
pub enum Handler<Msg> {
	Normal(Decoder<Msg>),
	MayStopPropagation(Decoder<(Msg, bool)>),
	MayPreventDefault(Decoder<(Msg, bool)>),
	Custom(Decoder<CustomHandling<Msg>>),
}

impl<Msg> Handler<Msg> {
	pub fn normal(decode: impl Fn(&dyn Any) -> Result<Msg, DecodeError> + 'static) -> Self {
		Self::Normal(Decoder::new(decode))
	}

	/// The handling mode, as a small integer. Modes below 2 never prevent the default action.
	#[must_use]
	pub fn tag(&self) -> u8 {
		match self {
			Handler::Normal(_) => 0,
			Handler::MayStopPropagation(_) => 1,
			Handler::MayPreventDefault(_) => 2,
			Handler::Custom(_) => 3,
		}
	}

	#[must_use]
	pub fn is_passive(&self) -> bool {
		self.tag() < 2
	}

	/// Same mode and same decoder reference.
	#[must_use]
	pub fn same(&self, other: &Self) -> bool {
		match (self, other) {
			(Handler::Normal(a), Handler::Normal(b)) => a.same(b),
			(Handler::MayStopPropagation(a), Handler::MayStopPropagation(b)) | (Handler::MayPreventDefault(a), Handler::MayPreventDefault(b)) => a.same(b),
			(Handler::Custom(a), Handler::Custom(b)) => a.same(b),
			_ => false,
		}
	}

	pub fn decode(&self, event: &dyn Any) -> Result<(Msg, EventOutcome), DecodeError> {
		Ok(match self {
			Handler::Normal(decoder) => (decoder.decode(event)?, EventOutcome::default()),
			Handler::MayStopPropagation(decoder) => {
				let (message, stop_propagation) = decoder.decode(event)?;
				(message, EventOutcome { stop_propagation, prevent_default: false })
			}
			Handler::MayPreventDefault(decoder) => {
				let (message, prevent_default) = decoder.decode(event)?;
				(message, EventOutcome { stop_propagation: false, prevent_default })
			}
			Handler::Custom(decoder) => {
				let CustomHandling { message, stop_propagation, prevent_default } = decoder.decode(event)?;
				(message, EventOutcome { stop_propagation, prevent_default })
			}
		})
	}
}

impl<Msg> Clone for Handler<Msg> {
	fn clone(&self) -> Self {
		match self {
			Handler::Normal(decoder) => Handler::Normal(decoder.clone()),
			Handler::MayStopPropagation(decoder) => Handler::MayStopPropagation(decoder.clone()),
			Handler::MayPreventDefault(decoder) => Handler::MayPreventDefault(decoder.clone()),
			Handler::Custom(decoder) => Handler::Custom(decoder.clone()),
		}
	}
}

impl<Msg> fmt::Debug for Handler<Msg> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Handler::Normal(decoder) => f.debug_tuple("Normal").field(decoder).finish(),
			Handler::MayStopPropagation(decoder) => f.debug_tuple("MayStopPropagation").field(decoder).finish(),
			Handler::MayPreventDefault(decoder) => f.debug_tuple("MayPreventDefault").field(decoder).finish(),
			Handler::Custom(decoder) => f.debug_tuple("Custom").field(decoder).finish(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacedAttribute {
	pub namespace: String,
	pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacedChange {
	pub namespace: String,
	/// [`None`] removes the attribute.
	pub value: Option<String>,
}

/// The facts of a single node, by category.
///
/// Building facts through the methods below sanitizes keys and values:
/// event-handler-like attribute names and `formAction` are prefixed with `data-`,
/// and `javascript:` or `data:text/html` URIs are blanked.
pub struct Facts<Msg> {
	pub events: HashMap<String, Handler<Msg>>,
	pub styles: HashMap<String, String>,
	pub properties: HashMap<String, PropertyValue>,
	pub attributes: HashMap<String, String>,
	pub namespaced: HashMap<String, NamespacedAttribute>,
}

impl<Msg> Default for Facts<Msg> {
	fn default() -> Self {
		Self {
			events: HashMap::new(),
			styles: HashMap::new(),
			properties: HashMap::new(),
			attributes: HashMap::new(),
			namespaced: HashMap::new(),
		}
	}
}

impl<Msg> Clone for Facts<Msg> {
	fn clone(&self) -> Self {
		Self {
			events: self.events.clone(),
			styles: self.styles.clone(),
			properties: self.properties.clone(),
			attributes: self.attributes.clone(),
			namespaced: self.namespaced.clone(),
		}
	}
}

impl<Msg> fmt::Debug for Facts<Msg> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Facts")
			.field("events", &self.events)
			.field("styles", &self.styles)
			.field("properties", &self.properties)
			.field("attributes", &self.attributes)
			.field("namespaced", &self.namespaced)
			.finish()
	}
}

impl<Msg> Facts<Msg> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.events.is_empty() && self.styles.is_empty() && self.properties.is_empty() && self.attributes.is_empty() && self.namespaced.is_empty()
	}

	#[must_use]
	pub fn attribute(mut self, name: &str, value: &str) -> Self {
		self.attributes.insert(no_on_or_form_action(name).into_owned(), no_javascript_or_html_uri(value).into_owned());
		self
	}

	#[must_use]
	pub fn attribute_ns(mut self, namespace: &str, name: &str, value: &str) -> Self {
		self.namespaced.insert(
			no_on_or_form_action(name).into_owned(),
			NamespacedAttribute {
				namespace: namespace.to_owned(),
				value: no_javascript_or_html_uri(value).into_owned(),
			},
		);
		self
	}

	#[must_use]
	pub fn style(mut self, name: &str, value: &str) -> Self {
		self.styles.insert(name.to_owned(), value.to_owned());
		self
	}

	/// Sets a plain property. Repeated `className`s are joined with a space instead of overriding each other.
	#[must_use]
	pub fn property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
		let key = no_inner_html_or_form_action(name).into_owned();
		let value = match value.into() {
			PropertyValue::String(value) => PropertyValue::String(no_javascript_or_html_uri(&value).into_owned()),
			other => other,
		};
		let merged = match (self.properties.get_mut(&key), &value) {
			(Some(PropertyValue::String(classes)), PropertyValue::String(extra)) if key == "className" => {
				classes.push(' ');
				classes.push_str(extra);
				true
			}
			_ => false,
		};
		if !merged {
			self.properties.insert(key, value);
		}
		self
	}

	#[must_use]
	pub fn class_name(self, classes: &str) -> Self {
		self.property("className", classes)
	}

	#[must_use]
	pub fn on(mut self, event: &str, handler: Handler<Msg>) -> Self {
		self.events.insert(event.to_owned(), handler);
		self
	}
}

/// Changes per category. [`None`] values mean removal.
pub struct FactsDiff<Msg> {
	pub events: HashMap<String, Option<Handler<Msg>>>,
	pub styles: HashMap<String, Option<String>>,
	pub properties: HashMap<String, Option<PropertyValue>>,
	pub attributes: HashMap<String, Option<String>>,
	pub namespaced: HashMap<String, NamespacedChange>,
}

impl<Msg> FactsDiff<Msg> {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.events.is_empty() && self.styles.is_empty() && self.properties.is_empty() && self.attributes.is_empty() && self.namespaced.is_empty()
	}
}

impl<Msg> fmt::Debug for FactsDiff<Msg> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FactsDiff")
			.field("events", &self.events)
			.field("styles", &self.styles)
			.field("properties", &self.properties)
			.field("attributes", &self.attributes)
			.field("namespaced", &self.namespaced)
			.finish()
	}
}

/// Diffs two fact bundles category by category.
///
/// Diffing against [`Facts::default`] yields every fact of `new`, which is how fresh nodes get their facts applied.
#[must_use]
pub fn diff_facts<Msg>(old: &Facts<Msg>, new: &Facts<Msg>) -> FactsDiff<Msg> {
	let namespaced = diff_category(&old.namespaced, &new.namespaced, |_, a, b| a == b)
		.into_iter()
		.filter_map(|(key, change)| {
			let change = match change {
				Some(NamespacedAttribute { namespace, value }) => NamespacedChange { namespace, value: Some(value) },
				None => NamespacedChange {
					namespace: old.namespaced.get(&key)?.namespace.clone(),
					value: None,
				},
			};
			Some((key, change))
		})
		.collect();

	FactsDiff {
		events: diff_category(&old.events, &new.events, |_, a, b| a.same(b)),
		styles: diff_category(&old.styles, &new.styles, |_, a, b| a == b),
		properties: diff_category(&old.properties, &new.properties, |key, a, b| a == b && !LIVE_PROPERTIES.contains(&key)),
		attributes: diff_category(&old.attributes, &new.attributes, |_, a, b| a == b),
		namespaced,
	}
}

fn diff_category<K, V>(old: &HashMap<K, V>, new: &HashMap<K, V>, unchanged: impl Fn(&str, &V, &V) -> bool) -> HashMap<K, Option<V>>
where
	K: AsRef<str> + Clone + Eq + Hash,
	V: Clone,
{
	let mut diff = HashMap::new();
	for (key, old_value) in old {
		match new.get(key) {
			None => {
				diff.insert(key.clone(), None);
			}
			Some(new_value) if !unchanged(key.as_ref(), old_value, new_value) => {
				diff.insert(key.clone(), Some(new_value.clone()));
			}
			Some(_) => (),
		}
	}
	for (key, new_value) in new {
		if !old.contains_key(key) {
			diff.insert(key.clone(), Some(new_value.clone()));
		}
	}
	diff
}

pub(crate) fn no_script(tag: &str) -> &str {
	if tag == "script" {
		"p"
	} else {
		tag
	}
}

fn no_on_or_form_action(key: &str) -> Cow<'_, str> {
	if key.get(..2).map_or(false, |prefix| prefix.eq_ignore_ascii_case("on")) || key.eq_ignore_ascii_case("formAction") {
		Cow::Owned(format!("data-{}", key))
	} else {
		Cow::Borrowed(key)
	}
}

fn no_inner_html_or_form_action(key: &str) -> Cow<'_, str> {
	if key == "innerHTML" || key == "formAction" {
		Cow::Owned(format!("data-{}", key))
	} else {
		Cow::Borrowed(key)
	}
}

fn no_javascript_or_html_uri(value: &str) -> Cow<'_, str> {
	let trimmed = value.trim_start();
	let starts_with = |prefix: &str| trimmed.get(..prefix.len()).map_or(false, |head| head.eq_ignore_ascii_case(prefix));
	if starts_with("javascript:") || starts_with("data:text/html") {
		Cow::Borrowed("")
	} else {
		Cow::Borrowed(value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn single_style_change_touches_only_that_style() {
		let old = Facts::<()>::new().style("color", "red").style("margin", "0").attribute("id", "a");
		let new = Facts::<()>::new().style("color", "blue").style("margin", "0").attribute("id", "a");
		let diff = diff_facts(&old, &new);
		assert_eq!(diff.styles.len(), 1);
		assert_eq!(diff.styles["color"], Some("blue".to_owned()));
		assert!(diff.events.is_empty() && diff.properties.is_empty() && diff.attributes.is_empty() && diff.namespaced.is_empty());
	}

	#[test]
	fn removals_are_none() {
		let old = Facts::<()>::new().attribute("title", "x").attribute_ns("http://www.w3.org/1999/xlink", "href", "#a");
		let diff = diff_facts(&old, &Facts::new());
		assert_eq!(diff.attributes["title"], None);
		assert_eq!(
			diff.namespaced["href"],
			NamespacedChange {
				namespace: "http://www.w3.org/1999/xlink".to_owned(),
				value: None
			}
		);
	}

	#[test]
	fn live_properties_are_always_reasserted() {
		let old = Facts::<()>::new().property("value", "abc").property("title", "t");
		let new = Facts::<()>::new().property("value", "abc").property("title", "t");
		let diff = diff_facts(&old, &new);
		assert_eq!(diff.properties.len(), 1);
		assert!(diff.properties.contains_key("value"));
	}

	#[test]
	fn handlers_compare_by_decoder_identity() {
		let handler = Handler::<u8>::normal(|_| Ok(1));
		let old = Facts::new().on("click", handler.clone());
		let same = Facts::new().on("click", handler);
		assert!(diff_facts(&old, &same).is_empty());

		let other = Facts::new().on("click", Handler::normal(|_| Ok(1)));
		assert_eq!(diff_facts(&old, &other).events.len(), 1);
	}

	#[test]
	fn class_names_accumulate() {
		let facts = Facts::<()>::new().class_name("a").class_name("b");
		assert_eq!(facts.properties["className"], PropertyValue::String("a b".to_owned()));
	}

	#[test]
	fn sanitizes_scripting_vectors() {
		let facts = Facts::<()>::new()
			.attribute("onclick", "alert(1)")
			.attribute("href", "  JavaScript:alert(1)")
			.property("innerHTML", "<b>x</b>")
			.property("src", "data:text/html,<script>");
		assert!(facts.attributes.contains_key("data-onclick"));
		assert_eq!(facts.attributes["href"], "");
		assert!(facts.properties.contains_key("data-innerHTML"));
		assert_eq!(facts.properties["src"], PropertyValue::String(String::new()));
		assert_eq!(no_script("script"), "p");
	}
}
