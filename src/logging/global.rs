//! Process-wide default logger.
//!
//! Nothing in the pipeline reads this implicitly. It only forwards to a
//! logger that was installed explicitly with [`init_global`].

use std::sync::{Arc, OnceLock};

use super::logger::{Logger, NoopLogger};

static GLOBAL_LOGGER: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Install the process-wide logger. Returns `false` if one was already set.
pub fn init_global(logger: Arc<dyn Logger>) -> bool {
    GLOBAL_LOGGER.set(logger).is_ok()
}

/// The installed logger, or a [`NoopLogger`] if none was installed.
pub fn global() -> Arc<dyn Logger> {
    GLOBAL_LOGGER
        .get()
        .cloned()
        .unwrap_or_else(NoopLogger::shared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::TracingLogger;

    #[test]
    fn test_global_is_set_once() {
        let _ = init_global(Arc::new(TracingLogger::new()));
        assert!(!init_global(Arc::new(NoopLogger)));
        let _ = global();
    }
}
