//! Custom tracing layers for SAF routers

use tracing::{Subscriber, span};
use tracing_subscriber::fmt::format::{Format, Json, JsonFields};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::config::{JsonlConfig, SpanDetail};
use crate::context::{RouterContextData, RouterContextGuard};

/// Layer that tags spans with the active router context
///
/// When a [`RouterContextGuard`] is alive on the thread that opens a span, the
/// span gets a [`RouterContextExtension`] carrying the router name and
/// instance id.
#[derive(Debug, Default)]
pub struct RouterContextLayer;

impl RouterContextLayer {
    pub fn new() -> Self {
        Self
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct RouterContextExtension {
    pub data: RouterContextData,
}

impl<S> Layer<S> for RouterContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        if let Some(router_ctx) = RouterContextGuard::current() {
            span.extensions_mut()
                .insert(RouterContextExtension { data: router_ctx });
        }
    }
}

/// JSONL formatting layer writing to `writer`
pub fn jsonl_layer<S, W>(config: &JsonlConfig, writer: W) -> fmt::Layer<S, JsonFields, Format<Json>, W>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fmt::layer()
        .json()
        .with_current_span(config.spans != SpanDetail::None)
        .with_span_list(config.spans == SpanDetail::Full)
        .flatten_event(config.flatten_events)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_thread_ids(config.thread_info)
        .with_thread_names(config.thread_info)
        .with_writer(writer)
}
