//! Tracing subscriber setup.

/// Install a formatting subscriber. Safe to call more than once.
pub fn init() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();
}
