use crate::error::{Result, TrimError};
use crate::video::types::TimeRange;

/// Check a requested trim window against the asset duration.
///
/// Accepts iff `0 <= start_ms < end_ms <= duration_ms`. Runs before any
/// render resources are allocated.
pub fn validate(start_ms: i64, end_ms: i64, duration_ms: i64) -> Result<TimeRange> {
    if start_ms < 0 || end_ms <= start_ms || end_ms > duration_ms {
        return Err(TrimError::InvalidTimeRange {
            start_ms,
            end_ms,
            duration_ms,
        });
    }

    Ok(TimeRange { start_ms, end_ms })
}
