use sctp_mux::{AssociationRegistry, MuxConfig};
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

#[allow(dead_code)]
pub fn registry() -> Arc<AssociationRegistry> {
    registry_with(MuxConfig {
        source_poll_interval_ms: 10,
        ..Default::default()
    })
}

pub fn registry_with(config: MuxConfig) -> Arc<AssociationRegistry> {
    init_logging();
    Arc::new(AssociationRegistry::new(config).expect("valid mux config"))
}
