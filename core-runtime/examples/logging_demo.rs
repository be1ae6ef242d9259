//! Logging system demonstration
//!
//! Shows the output formats and filtering the runtime crate provides.
//!
//! Run with:
//! ```bash
//! # Pretty format (default in debug)
//! cargo run --example logging_demo
//!
//! # JSON format
//! cargo run --example logging_demo -- json
//!
//! # Compact format with a custom filter
//! cargo run --example logging_demo -- compact "core_runtime=trace"
//! ```

use core_runtime::events::{CoreEvent, EngineEvent, EventBus};
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use std::env;
use tracing::{debug, info, span, trace, warn, Level};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::default(),
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Trace)
        .with_spans(true);
    if let Some(filter) = args.get(2) {
        config = config.with_filter(filter.clone());
    }

    init_logging(config).expect("Failed to initialize logging");

    info!(format = ?format, "logging initialized");

    demo_log_levels();
    demo_structured_logging();
    demo_event_bus().await;

    info!("demo complete");
}

fn demo_log_levels() {
    let span = span!(Level::INFO, "log_levels");
    let _enter = span.enter();

    trace!("trace level");
    debug!("debug level");
    info!("info level");
    warn!("warn level");
}

fn demo_structured_logging() {
    let span = span!(Level::INFO, "structured_logging");
    let _enter = span.enter();

    info!(
        track_id = "track-42",
        title = "Evening Song",
        duration_secs = 245.0,
        "track information"
    );
    info!(iteration = 3, total_iterations = 20, "progress sample");
}

async fn demo_event_bus() {
    let span = span!(Level::INFO, "event_bus");
    let _enter = span.enter();

    let bus = EventBus::default();
    let mut subscriber = bus.subscribe();

    bus.emit(CoreEvent::Engine(EngineEvent::IterationCompleted {
        session_id: "session-demo".to_string(),
        iteration: 1,
        total_iterations: 3,
    }))
    .expect("subscriber is attached");

    let event = subscriber.recv().await.expect("event delivered");
    info!(
        description = event.description(),
        severity = ?event.severity(),
        "received event"
    );
}
