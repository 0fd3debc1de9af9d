//! Human-friendly formatting for log lines and summaries.

use byte_unit::{Byte, UnitType};

/// 1234567 -> "1.18 MiB"
pub fn nice_size(bytes: u64) -> String {
    format!(
        "{:.2}",
        Byte::from_u64(bytes).get_appropriate_unit(UnitType::Binary)
    )
}
