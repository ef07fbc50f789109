// SPDX-License-Identifier: Apache-2.0
use tracing::subscriber::set_global_default;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Registry, fmt::MakeWriter, layer::SubscriberExt};

/// Filters applied when RUST_LOG is unset.
const DEFAULT_FILTER: &str = "learngate=info,actix_web=info";
const DEV_FILTER: &str = "learngate=debug,actix_web=info";

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Bunyan-formatted JSON logs, one object per line.
pub fn init_tracing<Sink>(name: &str, sink: Sink)
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    // LogTracer may already be installed; that is fine
    let _ = LogTracer::init();

    let subscriber = Registry::default()
        .with(env_filter(DEFAULT_FILTER))
        .with(JsonStorageLayer)
        .with(BunyanFormattingLayer::new(name.into(), sink));

    set_global_default(subscriber).expect("Failed to set tracing subscriber");
    tracing::info!("json tracing initialized");
}

/// Human-readable console output for development.
pub fn init_console_tracing() {
    let _ = LogTracer::init();

    let subscriber = tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(env_filter(DEV_FILTER))
        .finish();

    set_global_default(subscriber).expect("Failed to set tracing subscriber");
    tracing::info!("console tracing initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_filters_parse() {
        // EnvFilter::new swallows bad directives; try_new surfaces them
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
        assert!(EnvFilter::try_new(DEV_FILTER).is_ok());
    }
}
