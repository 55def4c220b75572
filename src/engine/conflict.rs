use ulid::Ulid;

use crate::model::*;
use crate::observability::SLOT_CONFLICTS_TOTAL;

use super::index::AvailabilityIndex;
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Shape and bounds checks for a span supplied by a caller.
pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    let duration = span.duration()?;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if duration > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("appointment too long"));
    }
    Ok(())
}

pub(crate) fn validate_window(window: &Span) -> Result<(), EngineError> {
    if window.duration()? > crate::limits::MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

/// Fail with `SlotConflict` if `span` overlaps any indexed appointment other than `exclude`.
pub(crate) fn check_no_conflict(
    index: &AvailabilityIndex,
    span: &Span,
    exclude: Option<&Ulid>,
    stage: &'static str,
) -> Result<(), EngineError> {
    let conflicts = match exclude {
        Some(id) => index.query_overlap_excluding(span, id),
        None => index.query_overlap(span),
    };
    if conflicts.is_empty() {
        return Ok(());
    }
    metrics::counter!(SLOT_CONFLICTS_TOTAL, "stage" => stage).increment(1);
    tracing::debug!(
        "[{}, {}) conflicts with {} appointment(s) at {stage}",
        span.start,
        span.end,
        conflicts.len()
    );
    Err(EngineError::SlotConflict(conflicts))
}
