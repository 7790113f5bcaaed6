//! Timing helpers for build and search logging.

use std::time::Instant;

/// RAII timer that logs the elapsed time of a phase when dropped.
///
/// ```ignore
/// let _t = Timed::debug("kd-tree build");
/// // ... build ...
/// // logs "kd-tree build: 1.234ms" when _t is dropped
/// ```
pub(crate) struct Timed {
    name: &'static str,
    // `Instant::now` panics on wasm32-unknown-unknown, so timing is skipped there.
    start: Option<Instant>,
    level: log::Level,
}

impl Timed {
    /// Timer that reports at DEBUG level.
    pub(crate) fn debug(name: &'static str) -> Self {
        log::trace!("{}...", name);
        Self {
            name,
            start: (!cfg!(target_arch = "wasm32")).then(Instant::now),
            level: log::Level::Debug,
        }
    }
}

impl Drop for Timed {
    fn drop(&mut self) {
        if let Some(start) = self.start {
            log::log!(self.level, "{}: {:.3?}", self.name, start.elapsed());
        }
    }
}
