//! Tracing setup for binaries and tests that embed the engine.
//!
//! The library itself only emits `tracing` events; installing a
//! subscriber is the embedder's choice. This helper wires up the common
//! case: a compact fmt layer filtered by `RUST_LOG`, falling back to
//! engine-level info.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global fmt subscriber honoring `RUST_LOG`.
///
/// Does nothing if a subscriber is already installed, so embedders that
/// bring their own telemetry stack can call this safely anyway.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,stategraph=info"));
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
