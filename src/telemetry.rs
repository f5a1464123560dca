// Global tracing setup, read once from `main` (and from integration
// tests behind `std::sync::Once`). Mirrors the teacher's
// `tracing_subscriber::registry()` + `EnvFilter` + `fmt` layer setup in
// its own `main.rs`.

use std::sync::Once;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

pub fn init() {
    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "auth_core=debug,tower_http=info".into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
