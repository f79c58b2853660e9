//! Context-passed logging.
//!
//! The original dataplane uses a global mutable logger (Design Notes §9
//! flags this as a pattern needing re-architecture). Here a [`DpLogger`]
//! handle is constructed once by the process entry point and threaded
//! through control-plane calls explicitly; nothing after process start
//! mutates global logging state, matching the "process-wide default
//! initialized once at start and never mutated after workers start"
//! strategy. The actual `tracing` subscriber is installed once by the
//! `fwdp` binary's entry point, not by this library.

use tracing::Level;

/// A cheap, cloneable handle identifying the owner emitting a log line.
///
/// Workers and the control-plane agent each hold one, scoped to their
/// component name, so log lines are attributable without a global logger
/// singleton.
#[derive(Debug, Clone, Copy)]
pub struct DpLogger {
    component: &'static str,
}

impl DpLogger {
    pub const fn new(component: &'static str) -> Self {
        Self { component }
    }

    pub fn component(&self) -> &'static str {
        self.component
    }

    pub fn event(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(component = self.component, "{message}"),
            Level::WARN => tracing::warn!(component = self.component, "{message}"),
            Level::DEBUG => tracing::debug!(component = self.component, "{message}"),
            Level::TRACE => tracing::trace!(component = self.component, "{message}"),
            Level::INFO => tracing::info!(component = self.component, "{message}"),
        }
    }
}
