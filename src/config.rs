/// Patcher settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
	/// Whether handlers that can't prevent the default action are installed as passive listeners.
	///
	/// Defaults to `true`. Turn this off for backends that don't support passive listeners.
	pub passive_listeners: bool,
}

impl Default for Config {
	fn default() -> Self {
		Self { passive_listeners: true }
	}
}

impl Config {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with_passive_listeners(mut self, passive_listeners: bool) -> Self {
		self.passive_listeners = passive_listeners;
		self
	}
}
