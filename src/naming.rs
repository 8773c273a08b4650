//! Download file names.

use crate::models::{DateRange, DeviceId};

/// `<device_id>_<YYYY-MM-DD>_to_<YYYY-MM-DD>.<ext>`
///
/// The id is already restricted to `[A-Za-z0-9_]`, so the result needs no
/// further escaping and distinct ranges never collide.
pub fn download_name(device_id: &DeviceId, range: &DateRange, extension: &str) -> String {
    format!(
        "{}_{}_to_{}.{}",
        device_id,
        range.start.format("%Y-%m-%d"),
        range.end.format("%Y-%m-%d"),
        extension
    )
}
