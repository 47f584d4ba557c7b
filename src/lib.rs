pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use shared::{AppConfig, AppError, Result};
pub use state::AppState;

/// `RUST_LOG` が無ければ `rsvp_sync=debug,info` で初期化する
pub fn init_logging() {
    init_logging_with(None);
}

pub fn init_logging_with(level: Option<&str>) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = match level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "rsvp_sync=debug,info".into()),
    };

    // テストなどで二重に初期化されても無視する
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
