//! Listener configuration.

/// Default number of ready sessions held for `accept`.
pub const DEFAULT_ACCEPT_BACKLOG: usize = 16;

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Sessions that completed their handshake and wait for `accept`.
    ///
    /// Clamped to at least one. When full, the transport's handshake tasks
    /// wait for a slot instead of dropping sessions.
    pub accept_backlog: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self { accept_backlog: DEFAULT_ACCEPT_BACKLOG }
    }
}
