//! Tracing setup.
//!
//! Output is plain text or JSON lines, switchable at runtime through a
//! [`LogFormat`] handle so a config reload can change it without rebuilding
//! the subscriber. Filtering follows `RUST_LOG`, defaulting to `info` with
//! HTTP client internals held at `warn`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{self, Format, Full, Json, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,hyper=warn,h2=warn,reqwest=warn,rustls=warn";

/// Shared toggle between text and JSON output.
#[derive(Debug, Clone, Default)]
pub struct LogFormat {
    json: Arc<AtomicBool>,
}

impl LogFormat {
    pub fn new(json: bool) -> Self {
        Self {
            json: Arc::new(AtomicBool::new(json)),
        }
    }

    pub fn set_json(&self, json: bool) {
        self.json.store(json, Ordering::Relaxed);
    }

    pub fn is_json(&self) -> bool {
        self.json.load(Ordering::Relaxed)
    }
}

/// Event formatter that consults a [`LogFormat`] on every event.
pub struct SwitchableFormat {
    handle: LogFormat,
    text: Format<Full>,
    json: Format<Json>,
}

impl SwitchableFormat {
    pub fn new(handle: LogFormat) -> Self {
        Self {
            handle,
            text: format::format(),
            // Span fields are rendered by the text field formatter, which is
            // not valid JSON, so JSON lines carry event fields only.
            json: format::format()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        }
    }
}

impl<S, N> FormatEvent<S, N> for SwitchableFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        if self.handle.is_json() {
            self.json.format_event(ctx, writer, event)
        } else {
            self.text.format_event(ctx, writer, event)
        }
    }
}

/// Install the global subscriber. Returns the handle that switches formats.
pub fn init(json: bool) -> LogFormat {
    let handle = LogFormat::new(json);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().event_format(SwitchableFormat::new(handle.clone())))
        .init();

    handle
}
