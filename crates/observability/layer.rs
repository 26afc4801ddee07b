use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
    span::{Attributes, Id, Record},
};
use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

use super::{
    config::ServiceContext,
    notifier::{AlertEvent, AlertQueue, SpanSummary},
};

/// Forwards events at or above the configured level to the admin alert queue.
/// Level gating is done by the `LevelFilter` wrapped around this layer.
#[derive(Clone)]
pub(crate) struct ErrorAlertLayer {
    queue: AlertQueue,
    service_context: ServiceContext,
}

impl ErrorAlertLayer {
    pub(crate) fn new(queue: AlertQueue, service_context: ServiceContext) -> Self {
        Self {
            queue,
            service_context,
        }
    }
}

#[derive(Default)]
struct RedactingVisitor {
    values: BTreeMap<String, String>,
}

impl RedactingVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        let name = field.name();
        let value = if is_sensitive_key(name) {
            "[REDACTED]".to_string()
        } else {
            value
        };
        self.values.insert(name.to_string(), value);
    }
}

impl Visit for RedactingVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.to_string());
    }
}

/// Span fields stashed in the span's extensions for later events.
#[derive(Default)]
struct RecordedSpanFields(BTreeMap<String, String>);

impl<S> Layer<S> for ErrorAlertLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = RedactingVisitor::default();
        attrs.record(&mut visitor);

        if let (false, Some(span)) = (visitor.values.is_empty(), ctx.span(id)) {
            span.extensions_mut().insert(RecordedSpanFields(visitor.values));
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = RedactingVisitor::default();
        values.record(&mut visitor);
        if visitor.values.is_empty() {
            return;
        }

        let mut extensions = span.extensions_mut();
        if let Some(existing) = extensions.get_mut::<RecordedSpanFields>() {
            existing.0.extend(visitor.values);
            return;
        }
        extensions.insert(RecordedSpanFields(visitor.values));
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut visitor = RedactingVisitor::default();
        event.record(&mut visitor);
        let message = visitor.values.remove("message").map(|raw| unquote(&raw));

        let spans = ctx
            .event_span(event)
            .map(|span| {
                span.scope()
                    .from_root()
                    .map(|s| SpanSummary {
                        name: s.metadata().name().to_string(),
                        fields: s
                            .extensions()
                            .get::<RecordedSpanFields>()
                            .map(|recorded| recorded.0.clone())
                            .unwrap_or_default(),
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        self.queue.push(AlertEvent {
            level: *metadata.level(),
            timestamp: Utc::now(),
            service_name: self.service_context.service_name.clone(),
            environment: self.service_context.environment.clone(),
            component: self.service_context.component.clone(),
            target: metadata.target().to_string(),
            location: match (metadata.file(), metadata.line()) {
                (Some(file), Some(line)) => Some(format!("{file}:{line}")),
                _ => None,
            },
            message,
            fields: visitor.values,
            spans,
        });
    }
}

fn unquote(input: &str) -> String {
    let trimmed = input.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_string()
}

fn is_sensitive_key(field_name: &str) -> bool {
    const MARKERS: &[&str] = &[
        "secret",
        "password",
        "token",
        "authorization",
        "credentials",
        "api_key",
        "auth_key",
    ];
    let field = field_name.to_ascii_lowercase();
    MARKERS.iter().any(|marker| field.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_looking_fields_are_redacted() {
        assert!(is_sensitive_key("yookassa_secret_key"));
        assert!(is_sensitive_key("BOT_TOKEN"));
        assert!(is_sensitive_key("gigachat_credentials"));
        assert!(!is_sensitive_key("provider_payment_id"));
        assert!(!is_sensitive_key("telegram_id"));
    }

    #[test]
    fn debug_strings_are_unquoted() {
        assert_eq!(unquote("\"reconciler: failed\""), "reconciler: failed");
        assert_eq!(unquote("plain"), "plain");
        assert_eq!(unquote("\""), "\"");
    }
}
