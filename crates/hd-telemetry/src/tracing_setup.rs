use uuid::Uuid;

/// Generate a trace ID (32 hex characters).
pub fn generate_trace_id() -> String {
    Uuid::new_v4().as_simple().to_string()
}

/// Generate a span ID (16 hex characters).
pub fn generate_span_id() -> String {
    Uuid::new_v4().as_simple().to_string()[..16].to_string()
}

/// Create the span a CLI verb runs in, returning it with its trace ID.
///
/// `actor` is the resolved agent identity, or `-` when not yet known.
pub fn create_operation_span(operation: &str, actor: &str) -> (tracing::Span, String) {
    let trace_id = generate_trace_id();
    let span_id = generate_span_id();
    let span = tracing::info_span!(
        "operation",
        trace_id = %trace_id,
        span_id = %span_id,
        operation = %operation,
        actor = %actor,
    );
    (span, trace_id)
}

/// Create a child span under an existing trace ID.
pub fn create_child_span(trace_id: &str, operation: &str) -> tracing::Span {
    let span_id = generate_span_id();
    tracing::info_span!(
        "operation",
        trace_id = %trace_id,
        span_id = %span_id,
        operation = %operation,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_format() {
        let id = generate_trace_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn span_id_format() {
        let id = generate_span_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn operation_spans_have_distinct_traces() {
        let (_a, t1) = create_operation_span("charge", "warchief/");
        let (_b, t2) = create_operation_span("charge", "warchief/");
        assert_ne!(t1, t2);
        let _child = create_child_span(&t1, "spawn");
    }

    #[tokio::test]
    async fn spans_can_instrument_futures() {
        use tracing::Instrument;
        let (span, _) = create_operation_span("raid check", "-");
        let out = async { 7 }.instrument(span).await;
        assert_eq!(out, 7);
    }
}
