//! Unit configuration.

/// When a session flushes on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Flush on explicit request, before every direct query and at commit.
    #[default]
    Auto,
    /// Flush on explicit request and at commit only. Direct queries then
    /// read the last flushed state.
    Commit,
}

/// Configuration for a persistence unit.
#[derive(Debug, Clone)]
pub struct Config {
    /// When sessions flush implicitly.
    pub flush_mode: FlushMode,

    /// Log executed statements at `info` instead of `trace`.
    pub show_statements: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flush_mode: FlushMode::Auto,
            show_statements: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flush mode.
    #[must_use]
    pub const fn flush_mode(mut self, mode: FlushMode) -> Self {
        self.flush_mode = mode;
        self
    }

    /// Sets whether executed statements are logged at `info`.
    #[must_use]
    pub const fn show_statements(mut self, value: bool) -> Self {
        self.show_statements = value;
        self
    }
}
