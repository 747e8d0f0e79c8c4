//! Tracing setup, adapted from the teacher's `crates/log` `LogPlugin`: the
//! same `EnvFilter` + `fmt` layer pipeline, just installed as a plain
//! function since there is no bevy `App` to hang a `Plugin` off here.

use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// Installs a global `tracing` subscriber reading `RUST_LOG`, defaulting to
/// `info`. Call once at host startup before `RenderContext::start`.
pub fn install() {
    let subscriber = Registry::default();

    let fmt_filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    let fmt_layer = tracing_subscriber::fmt::Layer::default()
        .with_writer(std::io::stderr)
        .with_filter(fmt_filter_layer);

    let _ = subscriber.with(fmt_layer).try_init();
}
