mod interpreter_tests;

use crate::config::InterpreterConfig;
use crate::interpreter::{Event, Interpreter, Outcome};
use crate::store::MemoryStore;
use fake_page::FakePage;
use std::sync::Arc;

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_test_writer()
        .try_init();
}

/// Short deadlines so failing resolutions finish quickly.
pub fn fast_config(interactive: bool) -> InterpreterConfig {
    InterpreterConfig {
        default_within_ms: 150,
        poll_interval_ms: 10,
        interactive,
        ..InterpreterConfig::default()
    }
}

pub fn session(
    page: FakePage,
    store: MemoryStore,
    interactive: bool,
) -> (Interpreter, Arc<FakePage>, Arc<MemoryStore>) {
    init_tracing();
    let page = Arc::new(page);
    let store = Arc::new(store);
    let interpreter = Interpreter::new(page.clone(), store.clone(), fast_config(interactive));
    (interpreter, page, store)
}

pub fn outcomes(events: &[Event]) -> Vec<Outcome> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Outcome(o) => Some(o.clone()),
            _ => None,
        })
        .collect()
}
