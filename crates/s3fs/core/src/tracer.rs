use std::{env, ffi::OsStr};

use tracing::{dispatcher, Subscriber};
use tracing_subscriber::{
    layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, Layer, Registry,
};

const KEY: &str = "RUST_LOG";

fn init_once_with_export(export: bool) {
    // Skip init if has been set
    if dispatcher::has_been_set() {
        return;
    }

    // Set default service name
    {
        const SERVICE_NAME_KEY: &str = "OTEL_SERVICE_NAME";
        const SERVICE_NAME_VALUE: &str = "s3fs-provisioner";

        if env::var_os(SERVICE_NAME_KEY).is_none() {
            env::set_var(SERVICE_NAME_KEY, SERVICE_NAME_VALUE);
        }
    }

    fn init_layer_env_filter<S>() -> impl Layer<S>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        ::tracing_subscriber::EnvFilter::from_default_env()
    }

    fn init_layer_stdfmt<S>() -> impl Layer<S>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        ::tracing_subscriber::fmt::layer()
    }

    #[cfg(feature = "otlp")]
    fn init_layer_otlp_tracer<S>() -> Option<impl Layer<S>>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        use opentelemetry_otlp as otlp;
        use opentelemetry_sdk::runtime::Tokio as Runtime;

        match otlp::new_pipeline()
            .tracing()
            .with_exporter(otlp::new_exporter().tonic())
            .install_batch(Runtime)
        {
            Ok(tracer) => Some(::tracing_opentelemetry::OpenTelemetryLayer::new(tracer)),
            Err(error) => {
                eprintln!("failed to init an otlp tracer: {error}");
                None
            }
        }
    }

    let layer = Registry::default()
        .with(init_layer_env_filter())
        .with(init_layer_stdfmt());

    #[cfg(feature = "otlp")]
    if export {
        return layer.with(init_layer_otlp_tracer()).init();
    }
    #[cfg(not(feature = "otlp"))]
    let _ = export;

    layer.init()
}

pub fn init_once_with(level: impl AsRef<OsStr>, export: bool) {
    // Skip init if has been set
    if dispatcher::has_been_set() {
        return;
    }

    // set custom tracing level
    env::set_var(KEY, level);

    init_once_with_export(export)
}

/// Maps a `-d` occurrence count onto a tracing level.
pub fn init_once_with_level_int(level: u8, export: bool) {
    let debug_level = match level {
        0 => "WARN",
        1 => "INFO",
        2 => "DEBUG",
        _ => "TRACE",
    };
    init_once_with(debug_level, export)
}
