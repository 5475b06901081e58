// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Timestamp helpers (ISO 8601 formatting).

use chrono::{SecondsFormat, Utc};

/// Current wall time as ISO 8601 UTC with microsecond precision.
///
/// Used when an adapter omits the timestamp field and for response headers.
#[must_use]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
