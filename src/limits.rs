use crate::model::{DAY, HOUR, MINUTE, Ms};

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

/// Longest single appointment.
pub const MAX_SPAN_DURATION_MS: Ms = 12 * HOUR;
pub const MIN_SLOT_DURATION_MS: Ms = MINUTE;
/// Widest window accepted by availability and listing queries.
pub const MAX_QUERY_WINDOW_MS: Ms = 92 * DAY;
pub const MAX_SLOTS_PER_QUERY: usize = 10_000;

pub const MAX_REASON_LEN: usize = 2_000;
pub const MAX_APPOINTMENTS_PER_DOCTOR: usize = 200_000;
