//! ISO-8601 timestamp formatting in the gateway's configured timezone.

use chrono::Utc;
use chrono_tz::Tz;

const ISO8601: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Render the current instant as `%Y-%m-%dT%H:%M:%S%z` in `tz_name`,
/// falling back to UTC if the name doesn't resolve to a known zone.
pub fn now_iso8601(tz_name: &str) -> String {
    match tz_name.parse::<Tz>() {
        Ok(tz) => Utc::now().with_timezone(&tz).format(ISO8601).to_string(),
        Err(_) => Utc::now().format(ISO8601).to_string(),
    }
}
