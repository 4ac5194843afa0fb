//! Local wall clock rendering for log timestamps.

use std::sync::OnceLock;

use time::{macros::format_description, OffsetDateTime, UtcOffset};

static LOCAL_OFFSET: OnceLock<Option<UtcOffset>> = OnceLock::new();

/// Determines the local UTC offset and caches it. Must be called before the program spawns
/// threads, afterwards [`UtcOffset::current_local_offset`] may refuse to answer and timestamps are
/// shown in UTC.
pub fn init() {
    LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().ok());
}

fn local_offset() -> UtcOffset {
    LOCAL_OFFSET
        .get_or_init(|| UtcOffset::current_local_offset().ok())
        .unwrap_or(UtcOffset::UTC)
}

/// Formats the time of day of `timestamp` in the local time zone, e.g. `14:03:59`.
pub fn wall_clock(timestamp: OffsetDateTime) -> String {
    timestamp
        .to_offset(local_offset())
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}
