// SPDX-License-Identifier: Apache-2.0, MIT

//! `get_time_str` (§6): formats a GENERAL_INFO `creation_time` as the ISO
//! `YYYY-MM-DD HH:MM:SS` string the session API exposes to callers.

use chrono::{DateTime, Utc};

pub fn format_time(creation_time_unix: i64) -> String {
    let dt = DateTime::<Utc>::from_timestamp(creation_time_unix, 0).unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap());
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}
