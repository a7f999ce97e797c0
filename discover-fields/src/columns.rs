//! The catalog of queryable columns.
//!
//! Public field names, as used in search queries, are translated to the columns of the
//! analytical backend. Measurements (`measurements.*`), span operation breakdowns (`spans.*`)
//! and tags (`tags[...]`) are open-ended and validated by pattern instead.

use std::sync::LazyLock;

use regex::Regex;

/// The public name of the transaction duration field.
pub const TRANSACTION_DURATION: &str = "transaction.duration";

/// Array columns of floats that are expanded with `arrayJoin` when aggregated.
pub const NUMERIC_ARRAY_COLUMNS: &[&str] = &[
    "measurements_value",
    "span_op_breakdowns_value",
    "spans_exclusive_time",
];

/// Array columns of floats that can be used wherever a numeric column is expected.
pub const ARRAY_VALUE_COLUMNS: &[&str] = &["measurements_value", "span_op_breakdowns_value"];

/// Array columns of strings.
pub const STRING_ARRAY_COLUMNS: &[&str] = &[
    "tags.key",
    "tags.value",
    "measurements_key",
    "span_op_breakdowns_key",
];

/// Public fields backed by arrays, which only support equality conditions.
pub const ARRAY_FIELDS: &[&str] = &[
    "error.mechanism",
    "error.type",
    "error.value",
    "stack.abs_path",
    "stack.colno",
    "stack.filename",
    "stack.function",
    "stack.in_app",
    "stack.lineno",
    "stack.module",
    "stack.package",
    "stack.stack_level",
];

/// Backend columns holding numeric values.
const NUMERIC_COLUMNS: &[&str] = &["time", "timestamp", "duration"];

/// Translation of public field names to backend columns, sorted by field name.
const SEARCH_MAP: &[(&str, &str)] = &[
    ("browser.name", "contexts[browser.name]"),
    ("device", "contexts[device.model]"),
    ("dist", "dist"),
    ("environment", "environment"),
    ("error.handled", "exception_stacks.mechanism_handled"),
    ("error.mechanism", "exception_stacks.mechanism_type"),
    ("error.type", "exception_stacks.type"),
    ("error.value", "exception_stacks.value"),
    ("event.type", "type"),
    ("geo.city", "geo_city"),
    ("geo.country_code", "geo_country_code"),
    ("geo.region", "geo_region"),
    ("http.method", "http_method"),
    ("http.referer", "http_referer"),
    ("http.url", "tags[url]"),
    ("id", "event_id"),
    ("issue.id", "group_id"),
    ("location", "location"),
    ("message", "message"),
    ("os.name", "contexts[os.name]"),
    ("platform", "platform"),
    ("platform.name", "platform"),
    ("project.id", "project_id"),
    ("release", "release"),
    ("sdk.name", "sdk_name"),
    ("sdk.version", "sdk_version"),
    ("stack.abs_path", "exception_frames.abs_path"),
    ("stack.colno", "exception_frames.colno"),
    ("stack.filename", "exception_frames.filename"),
    ("stack.function", "exception_frames.function"),
    ("stack.in_app", "exception_frames.in_app"),
    ("stack.lineno", "exception_frames.lineno"),
    ("stack.module", "exception_frames.module"),
    ("stack.package", "exception_frames.package"),
    ("stack.stack_level", "exception_frames.stack_level"),
    ("time", "time"),
    ("timestamp", "timestamp"),
    ("title", "title"),
    ("trace", "trace_id"),
    ("trace.parent_span", "trace.parent_span_id"),
    ("trace.span", "trace.span_id"),
    ("transaction", "transaction_name"),
    ("transaction.duration", "duration"),
    ("transaction.op", "transaction_op"),
    ("transaction.status", "transaction_status"),
    ("user", "user"),
    ("user.email", "email"),
    ("user.id", "user_id"),
    ("user.ip", "ip_address"),
    ("user.username", "username"),
];

/// Measurements whose values are durations in milliseconds.
const DURATION_MEASUREMENTS: &[&str] = &[
    "measurements.app_start_cold",
    "measurements.app_start_warm",
    "measurements.fcp",
    "measurements.fid",
    "measurements.fp",
    "measurements.lcp",
    "measurements.time_to_full_display",
    "measurements.time_to_initial_display",
    "measurements.ttfb",
    "measurements.ttfb.requesttime",
];

/// Span status names and their numeric codes in the backend.
const SPAN_STATUS_CODES: &[(&str, i64)] = &[
    ("ok", 0),
    ("cancelled", 1),
    ("unknown", 2),
    ("invalid_argument", 3),
    ("deadline_exceeded", 4),
    ("not_found", 5),
    ("already_exists", 6),
    ("permission_denied", 7),
    ("resource_exhausted", 8),
    ("failed_precondition", 9),
    ("aborted", 10),
    ("out_of_range", 11),
    ("unimplemented", 12),
    ("internal_error", 13),
    ("unavailable", 14),
    ("data_loss", 15),
    ("unauthenticated", 16),
];

static MEASUREMENTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^measurements\.([a-zA-Z0-9_.-]+)$").unwrap());
static SPAN_OP_BREAKDOWN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^spans\.([a-zA-Z0-9_.-]+)$").unwrap());
static CUSTOM_MEASUREMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^measurements\..+$").unwrap());
static TAG_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^tags\[(?P<tag>.*)\]$").unwrap());
static TYPED_TAG_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^tags\[(?P<tag>.*),\s*(?P<type>string|number)\]$").unwrap());
static VALID_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_.:-]*$").unwrap());

/// Returns the backend column for a public field name.
///
/// Measurements and span operation breakdowns are not part of the translation map.
pub fn resolve_column(field: &str) -> Option<&'static str> {
    SEARCH_MAP
        .binary_search_by_key(&field, |&(name, _)| name)
        .ok()
        .map(|index| SEARCH_MAP[index].1)
}

/// Returns `true` if the backend column holds numeric values.
pub fn is_numeric_column(column: &str) -> bool {
    NUMERIC_COLUMNS.contains(&column)
}

/// Returns `true` if the field names a measurement, such as `measurements.lcp`.
pub fn is_measurement(field: &str) -> bool {
    MEASUREMENTS_RE.is_match(field)
}

/// Returns `true` if the field names a measurement with a duration value.
pub fn is_duration_measurement(field: &str) -> bool {
    DURATION_MEASUREMENTS.contains(&field)
}

/// Returns `true` if the field names any measurement, including custom ones.
pub fn is_custom_measurement(field: &str) -> bool {
    CUSTOM_MEASUREMENT_RE.is_match(field)
}

/// Returns `true` if the field names a span operation breakdown, such as `spans.http`.
pub fn is_span_op_breakdown(field: &str) -> bool {
    SPAN_OP_BREAKDOWN_RE.is_match(field)
}

/// Returns `true` if the field is a duration, a duration measurement or a breakdown.
pub fn is_duration_field(field: &str) -> bool {
    field == TRANSACTION_DURATION || is_duration_measurement(field) || is_span_op_breakdown(field)
}

/// Returns the tag key of a `tags[key]` reference.
pub fn tag_key(field: &str) -> Option<&str> {
    TAG_KEY_RE
        .captures(field)
        .and_then(|captures| captures.name("tag"))
        .map(|m| m.as_str())
}

/// Returns the tag key of a typed `tags[key, type]` reference.
pub fn typed_tag_key(field: &str) -> Option<&str> {
    TYPED_TAG_KEY_RE
        .captures(field)
        .and_then(|captures| captures.name("tag"))
        .map(|m| m.as_str())
}

/// Returns `true` if the field is a typed tag reference, such as `tags[foo, number]`.
pub fn is_typed_tag(field: &str) -> bool {
    TYPED_TAG_KEY_RE.is_match(field)
}

/// Returns `true` if the field only contains characters allowed in column names.
pub fn is_valid_field(field: &str) -> bool {
    VALID_FIELD_RE.is_match(field)
}

/// Returns the numeric code of a span status name.
pub fn span_status_code(name: &str) -> Option<i64> {
    SPAN_STATUS_CODES
        .iter()
        .find(|&&(status, _)| status == name)
        .map(|&(_, code)| code)
}
