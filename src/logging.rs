// Logging - env_logger setup for the control side
//
// The audio thread never logs; its problems arrive as EngineEvents and are
// logged by the controller.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install the global logger once
///
/// `level` is a filter string such as `"info"` or `"daw_transport=debug"`.
/// `RUST_LOG`, when set, takes precedence. Later calls are ignored.
pub fn init_logger(level: &str) {
    INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or(level);
        let result = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .try_init();
        if let Err(err) = result {
            // Another logger was installed first (e.g. by a test harness)
            eprintln!("Logger already initialized: {}", err);
        }
    });
}

/// True once `init_logger` has run
pub fn is_initialized() -> bool {
    INIT.is_completed()
}
