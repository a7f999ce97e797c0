//! Argument descriptors for function signatures.
//!
//! Every positional parameter of a function is described by a [`FunctionArg`], which pairs the
//! parameter name with an [`ArgType`]. The argument type normalizes the raw text of the argument
//! into an [`Expr`] and may supply a default when the argument is omitted.

use std::fmt;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::columns;
use crate::combinator::Combinator;
use crate::error::ArgumentError;
use crate::expr::Expr;
use crate::format::format_general;
use crate::function::ResultType;
use crate::mri;
use crate::params::Params;
use crate::pseudo;

/// Conditions accepted by [`ConditionArg`], in the order they are reported.
pub const VALID_CONDITIONS: &[&str] = &[
    "equals",
    "notEquals",
    "lessOrEquals",
    "greaterOrEquals",
    "less",
    "greater",
];

/// Format accepted by [`DateArg`].
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

static FUNCTION_ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_.]+$").unwrap());

/// Normalization and defaults of a single kind of argument.
///
/// Implementations are stateless and shared between function signatures.
pub trait ArgType: fmt::Debug + Send + Sync {
    /// Validates the raw argument and converts it into an expression.
    ///
    /// The value is `None` if the argument was omitted and its default is the null value. The
    /// combinator, if any, was matched from the called function name.
    fn normalize(
        &self,
        value: Option<&str>,
        params: &Params,
        combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError>;

    /// Returns `true` if this argument can be omitted.
    fn has_default(&self) -> bool {
        false
    }

    /// Returns the raw default value of this argument.
    ///
    /// Only called if [`has_default`](Self::has_default) returns `true`. `None` stands for the null
    /// value.
    fn default_value(&self, _params: &Params) -> Result<Option<String>, ArgumentError> {
        Ok(None)
    }

    /// Infers the result type of a function from the normalized value of this argument.
    fn result_type(&self, _value: &Expr) -> Option<ResultType> {
        None
    }

    /// Returns `true` if normalized numeric array columns must be expanded with `arrayJoin`.
    fn expands_arrays(&self) -> bool {
        false
    }
}

/// A named positional parameter of a function.
#[derive(Clone, Debug)]
pub struct FunctionArg {
    /// The name of the argument, unique within its function.
    pub name: &'static str,
    ty: Arc<dyn ArgType>,
    default: Option<Option<String>>,
}

impl FunctionArg {
    /// Creates an argument of the given type.
    pub fn new(name: &'static str, ty: impl ArgType + 'static) -> Self {
        Self {
            name,
            ty: Arc::new(ty),
            default: None,
        }
    }

    /// Overrides the default value of this argument with a raw value.
    ///
    /// The default is normalized like an explicitly passed argument.
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(Some(value.into()));
        self
    }

    /// Returns `true` if this argument can be omitted.
    pub fn has_default(&self) -> bool {
        self.default.is_some() || self.ty.has_default()
    }

    /// Returns the raw default value of this argument.
    pub fn default_value(&self, params: &Params) -> Result<Option<String>, ArgumentError> {
        match self.default {
            Some(ref value) => Ok(value.clone()),
            None => self.ty.default_value(params),
        }
    }

    /// Normalizes the raw value of this argument.
    pub fn normalize(
        &self,
        value: Option<&str>,
        params: &Params,
        combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        self.ty.normalize(value, params, combinator)
    }

    /// Infers a result type from the normalized value of this argument.
    pub fn result_type(&self, value: &Expr) -> Option<ResultType> {
        self.ty.result_type(value)
    }

    /// Returns `true` if normalized numeric array columns must be expanded.
    pub fn expands_arrays(&self) -> bool {
        self.ty.expands_arrays()
    }
}

fn required(value: Option<&str>) -> Result<&str, ArgumentError> {
    value.ok_or_else(|| ArgumentError::invalid("a value is required"))
}

fn quoted(value: &str) -> Expr {
    Expr::String(format!("'{value}'"))
}

fn quoted_list(values: &[&str]) -> String {
    let items: Vec<_> = values.iter().map(|value| format!("'{value}'")).collect();
    format!("[{}]", items.join(", "))
}

/// A string literal.
#[derive(Clone, Debug, Default)]
pub struct StringArg {
    unquote: bool,
    unescape_quotes: bool,
    optional_unquote: bool,
    allowed_strings: Option<&'static [&'static str]>,
    raw: bool,
}

impl StringArg {
    /// Creates a string argument that accepts any text.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the value to be wrapped in double quotes and removes them.
    pub fn unquote(mut self) -> Self {
        self.unquote = true;
        self
    }

    /// Like [`unquote`](Self::unquote), but also accepts values without quotes.
    pub fn optional_unquote(mut self) -> Self {
        self.unquote = true;
        self.optional_unquote = true;
        self
    }

    /// Replaces escaped double quotes with plain double quotes.
    pub fn unescape_quotes(mut self) -> Self {
        self.unescape_quotes = true;
        self
    }

    /// Restricts the value to a fixed set of strings.
    pub fn allowed(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed_strings = Some(allowed);
        self
    }

    /// Returns the value without wrapping it in single quotes.
    ///
    /// Used for values that are substituted into string templates.
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }
}

impl ArgType for StringArg {
    fn normalize(
        &self,
        value: Option<&str>,
        _params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        let mut value = required(value)?;

        if self.unquote {
            let is_quoted = value.len() >= 2 && value.starts_with('"') && value.ends_with('"');
            if is_quoted {
                value = &value[1..value.len() - 1];
            } else if !self.optional_unquote {
                return Err(ArgumentError::invalid("string should be quoted"));
            }
        }

        let value = if self.unescape_quotes {
            value.replace("\\\"", "\"")
        } else {
            value.to_owned()
        };

        if let Some(allowed) = self.allowed_strings {
            if !allowed.contains(&value.as_str()) {
                return Err(ArgumentError::invalid(format!(
                    "string must be one of {}",
                    quoted_list(allowed)
                )));
            }
        }

        Ok(if self.raw {
            Expr::String(value)
        } else {
            quoted(&value)
        })
    }
}

/// A date and time of the form `2020-03-14T15:14:15`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DateArg;

impl ArgType for DateArg {
    fn normalize(
        &self,
        value: Option<&str>,
        _params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        let value = required(value)?;
        NaiveDateTime::parse_from_str(value, DATE_FORMAT).map_err(|_| {
            ArgumentError::invalid(format!(
                "{value} is in the wrong format, expected a date like 2020-03-14T15:14:15"
            ))
        })?;
        Ok(quoted(value))
    }
}

/// One of the comparison functions in [`VALID_CONDITIONS`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ConditionArg;

impl ArgType for ConditionArg {
    fn normalize(
        &self,
        value: Option<&str>,
        _params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        let value = required(value)?;
        if !VALID_CONDITIONS.contains(&value) {
            return Err(ArgumentError::invalid(format!(
                "{value} is not a valid condition, the only supported conditions are: {}",
                VALID_CONDITIONS.join(",")
            )));
        }
        Ok(Expr::string(value))
    }
}

/// Validates a public column name and resolves it to the backend column.
///
/// Returns `None` for measurements and span operation breakdowns, which are valid but not part of
/// the translation map.
fn lookup_column(value: &str) -> Result<Option<&'static str>, ArgumentError> {
    match columns::resolve_column(value) {
        Some(column) => Ok(Some(column)),
        None if columns::is_measurement(value) || columns::is_span_op_breakdown(value) => Ok(None),
        None => Err(ArgumentError::invalid(format!(
            "{value} is not a valid column"
        ))),
    }
}

/// A reference to a known column.
#[derive(Clone, Debug)]
pub struct ColumnArg {
    allowed_columns: Option<&'static [&'static str]>,
    validate_only: bool,
}

impl ColumnArg {
    /// Creates a column argument that accepts any known column and keeps the public name.
    pub fn new() -> Self {
        Self {
            allowed_columns: None,
            validate_only: true,
        }
    }

    /// Restricts the argument to the given public or backend column names.
    pub fn allowed(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed_columns = Some(allowed);
        self
    }

    /// Returns the backend column instead of the public name.
    pub fn lookup(mut self) -> Self {
        self.validate_only = false;
        self
    }
}

impl Default for ColumnArg {
    fn default() -> Self {
        Self::new()
    }
}

impl ArgType for ColumnArg {
    fn normalize(
        &self,
        value: Option<&str>,
        _params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        let value = required(value)?;
        let column = columns::resolve_column(value);

        if let Some(allowed) = self.allowed_columns {
            let is_allowed = allowed.contains(&value) || column.is_some_and(|c| allowed.contains(&c));
            if !is_allowed {
                return Err(ArgumentError::invalid(format!(
                    "{value} is not an allowed column"
                )));
            }
        } else {
            lookup_column(value)?;
        }

        Ok(match (self.validate_only, column) {
            (false, Some(column)) => Expr::string(column),
            _ => Expr::string(value),
        })
    }
}

/// A reference to a known column, a tag or any field with valid characters.
///
/// Tags may carry a value type, as in `tags[foo, number]`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ColumnTagArg;

impl ArgType for ColumnTagArg {
    fn normalize(
        &self,
        value: Option<&str>,
        params: &Params,
        combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        let raw = required(value)?;
        ColumnArg::new()
            .normalize(value, params, combinator)
            .or_else(|error| {
                let is_tag = columns::is_typed_tag(raw) || columns::tag_key(raw).is_some();
                if is_tag || columns::is_valid_field(raw) {
                    Ok(Expr::string(raw))
                } else {
                    Err(error)
                }
            })
    }
}

fn numeric_result_type(value: &Expr) -> ResultType {
    match value.as_str() {
        Some(column) if columns::is_duration_field(column) || column == "duration" => {
            ResultType::Duration
        }
        Some("timestamp") => ResultType::Date,
        _ => ResultType::Number,
    }
}

/// A reference to a column with numeric values.
///
/// Accepts durations, timestamps, measurements and span operation breakdowns. When enabled, the
/// numeric array columns are accepted as well and later expanded with `arrayJoin`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NumericColumn {
    allow_array_value: bool,
    lookup: bool,
}

impl NumericColumn {
    /// Creates a numeric column argument that keeps the public name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Additionally accepts the numeric array columns.
    pub fn allow_array_value(mut self) -> Self {
        self.allow_array_value = true;
        self
    }

    /// Returns the backend column instead of the public name.
    pub fn lookup(mut self) -> Self {
        self.lookup = true;
        self
    }
}

impl ArgType for NumericColumn {
    fn normalize(
        &self,
        value: Option<&str>,
        _params: &Params,
        combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        let value = required(value)?;

        if combinator.is_some_and(|c| c.validate_argument(value)) {
            return Ok(Expr::string(value));
        }

        if self.allow_array_value && columns::ARRAY_VALUE_COLUMNS.contains(&value) {
            return Ok(Expr::string(value));
        }

        let column = lookup_column(value)?;
        if column.is_some_and(|c| !columns::is_numeric_column(c)) {
            return Err(ArgumentError::invalid(format!(
                "{value} is not a numeric column"
            )));
        }

        Ok(match (self.lookup, column) {
            (true, Some(column)) => Expr::string(column),
            _ => Expr::string(value),
        })
    }

    fn result_type(&self, value: &Expr) -> Option<ResultType> {
        Some(numeric_result_type(value))
    }

    fn expands_arrays(&self) -> bool {
        true
    }
}

/// A reference to a column with duration values.
#[derive(Clone, Copy, Debug, Default)]
pub struct DurationColumn {
    lookup: bool,
}

impl DurationColumn {
    /// Creates a duration column argument that keeps the public name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the backend column instead of the public name.
    pub fn lookup(mut self) -> Self {
        self.lookup = true;
        self
    }
}

impl ArgType for DurationColumn {
    fn normalize(
        &self,
        value: Option<&str>,
        _params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        let value = required(value)?;

        let column = lookup_column(value)?;
        let is_duration = match column {
            Some(column) => column == "duration",
            None => columns::is_duration_measurement(value) || columns::is_span_op_breakdown(value),
        };

        if !is_duration {
            return Err(ArgumentError::invalid(format!(
                "{value} is not a duration column"
            )));
        }

        Ok(match (self.lookup, column) {
            (true, Some(column)) => Expr::string(column),
            _ => Expr::string(value),
        })
    }

    fn result_type(&self, _value: &Expr) -> Option<ResultType> {
        Some(ResultType::Duration)
    }
}

/// A reference to an array column of strings.
#[derive(Clone, Copy, Debug, Default)]
pub struct StringArrayColumn;

impl ArgType for StringArrayColumn {
    fn normalize(
        &self,
        value: Option<&str>,
        _params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        let value = required(value)?;
        if !columns::STRING_ARRAY_COLUMNS.contains(&value) {
            return Err(ArgumentError::invalid(format!(
                "{value} is not a valid string array column"
            )));
        }
        Ok(Expr::string(value))
    }
}

/// Substitutes the expression of a pseudo field, or passes the column through.
///
/// Expressions computed from the parameters, like `team_key_transaction`, are computed here.
fn count_column(value: Option<&str>, params: &Params) -> Result<Expr, ArgumentError> {
    let Some(value) = value else {
        return Err(ArgumentError::invalid("a column is required"));
    };

    match pseudo::pseudo_field(value) {
        Some(field) => Ok(match field.get_expression(params)? {
            Some(call) => Expr::Call(call),
            None => Expr::string(field.alias),
        }),
        None => Ok(Expr::string(value)),
    }
}

/// A column to count, such as the argument of `count_unique`.
///
/// Pseudo fields with an expression are replaced by that expression, so fields like
/// `user.display` work within aggregates.
#[derive(Clone, Copy, Debug, Default)]
pub struct CountColumn;

impl ArgType for CountColumn {
    fn normalize(
        &self,
        value: Option<&str>,
        params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        count_column(value, params)
    }
}

/// Any field column of any type.
#[derive(Clone, Copy, Debug, Default)]
pub struct FieldColumn;

impl ArgType for FieldColumn {
    fn normalize(
        &self,
        value: Option<&str>,
        params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        count_column(value, params)
    }

    fn result_type(&self, value: &Expr) -> Option<ResultType> {
        Some(match value.as_str() {
            Some(column) if columns::is_duration_field(column) => ResultType::Duration,
            Some("timestamp") => ResultType::Date,
            _ => ResultType::String,
        })
    }
}

/// A column that is accepted and dropped.
///
/// Defaults to the null value, so the function can be called without arguments.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullColumn;

impl ArgType for NullColumn {
    fn normalize(
        &self,
        _value: Option<&str>,
        _params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        Ok(Expr::Null)
    }

    fn has_default(&self) -> bool {
        true
    }
}

/// Any value, passed through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawArg;

impl ArgType for RawArg {
    fn normalize(
        &self,
        value: Option<&str>,
        _params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        Ok(value.map_or(Expr::Null, Expr::string))
    }
}

/// The alias of another function in the same query.
#[derive(Clone, Copy, Debug, Default)]
pub struct FunctionAliasArg;

impl ArgType for FunctionAliasArg {
    fn normalize(
        &self,
        value: Option<&str>,
        _params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        let value = required(value)?;
        if !FUNCTION_ALIAS_RE.is_match(value) {
            return Err(ArgumentError::invalid(format!(
                "{value} is not a valid function alias"
            )));
        }
        Ok(Expr::string(value))
    }
}

/// A number within an optional range.
///
/// The lower bound is inclusive, the upper bound is exclusive.
#[derive(Clone, Copy, Debug, Default)]
pub struct NumberRange {
    start: Option<f64>,
    end: Option<f64>,
}

impl NumberRange {
    /// Creates a number argument with the given bounds.
    pub fn new(start: Option<f64>, end: Option<f64>) -> Self {
        Self { start, end }
    }

    fn check(&self, value: &str) -> Result<f64, ArgumentError> {
        let number: f64 = value
            .trim()
            .parse()
            .map_err(|_| ArgumentError::invalid(format!("{value} is not a number")))?;

        if let Some(start) = self.start {
            if number < start {
                return Err(ArgumentError::invalid(format!(
                    "{} must be greater than or equal to {}",
                    format_general(number, 6),
                    format_general(start, 6)
                )));
            }
        }

        if let Some(end) = self.end {
            if number >= end {
                return Err(ArgumentError::invalid(format!(
                    "{} must be less than {}",
                    format_general(number, 6),
                    format_general(end, 6)
                )));
            }
        }

        Ok(number)
    }
}

impl ArgType for NumberRange {
    fn normalize(
        &self,
        value: Option<&str>,
        _params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        self.check(required(value)?).map(Expr::Float)
    }
}

/// A number within an optional range that defaults to the null value.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullableNumberRange(pub NumberRange);

impl NullableNumberRange {
    /// Creates a nullable number argument with the given bounds.
    pub fn new(start: Option<f64>, end: Option<f64>) -> Self {
        Self(NumberRange::new(start, end))
    }
}

impl ArgType for NullableNumberRange {
    fn normalize(
        &self,
        value: Option<&str>,
        _params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        match value {
            Some(value) => self.0.check(value).map(Expr::Float),
            None => Ok(Expr::Null),
        }
    }

    fn has_default(&self) -> bool {
        true
    }
}

/// An interval in seconds that defaults to the length of the queried time range.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntervalDefault(pub NumberRange);

impl IntervalDefault {
    /// Creates an interval argument with the given bounds.
    pub fn new(start: Option<f64>, end: Option<f64>) -> Self {
        Self(NumberRange::new(start, end))
    }
}

impl ArgType for IntervalDefault {
    fn normalize(
        &self,
        value: Option<&str>,
        params: &Params,
        combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        self.0.normalize(value, params, combinator)
    }

    fn has_default(&self) -> bool {
        true
    }

    fn default_value(&self, params: &Params) -> Result<Option<String>, ArgumentError> {
        let (Some(start), Some(end)) = (params.start, params.end) else {
            return Err(ArgumentError::invalid("function called without default"));
        };
        Ok(Some((end - start).num_seconds().to_string()))
    }
}

/// A unix timestamp in seconds within the queried time range.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimestampArg;

impl ArgType for TimestampArg {
    fn normalize(
        &self,
        value: Option<&str>,
        params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        let value = required(value)?;
        let (Some(start), Some(end)) = (params.start, params.end) else {
            return Err(ArgumentError::invalid("function called without date range"));
        };

        let timestamp = value
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .ok_or_else(|| ArgumentError::invalid(format!("{value} is not a timestamp")))?;

        if timestamp < start || timestamp > end {
            return Err(ArgumentError::invalid("timestamp outside date range"));
        }

        Ok(Expr::Timestamp(timestamp))
    }
}

/// An integer within an optional range.
///
/// The lower bound is inclusive, the upper bound is exclusive.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntArg {
    start: Option<i64>,
    end: Option<i64>,
}

impl IntArg {
    /// Creates an integer argument with the given bounds.
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }
}

impl ArgType for IntArg {
    fn normalize(
        &self,
        value: Option<&str>,
        _params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        let value = required(value)?;
        let number: i64 = value
            .trim()
            .parse()
            .map_err(|_| ArgumentError::invalid(format!("{value} is not an integer")))?;

        if let Some(start) = self.start.filter(|&start| number < start) {
            return Err(ArgumentError::invalid(format!(
                "{number} must be greater than or equal to {start}"
            )));
        }

        if let Some(end) = self.end.filter(|&end| number >= end) {
            return Err(ArgumentError::invalid(format!(
                "{number} must be less than {end}"
            )));
        }

        Ok(Expr::Int(number))
    }
}

/// A column of the metrics dataset.
///
/// Accepts the union of an explicit list of public names, custom measurements and metric resource
/// identifiers. Rejected values raise an incompatible metrics query, which callers use to fall
/// back to the events dataset.
#[derive(Clone, Debug)]
pub struct MetricArg {
    allowed_columns: Option<&'static [&'static str]>,
    allow_custom_measurements: bool,
    allow_mri: bool,
    validate_only: bool,
}

impl MetricArg {
    /// Creates a metric argument that accepts custom measurements and MRIs.
    pub fn new() -> Self {
        Self {
            allowed_columns: None,
            allow_custom_measurements: true,
            allow_mri: true,
            validate_only: true,
        }
    }

    /// Restricts public names to the given columns.
    pub fn allowed(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed_columns = Some(allowed);
        self
    }

    /// Rejects custom measurements that are not explicitly allowed.
    pub fn without_custom_measurements(mut self) -> Self {
        self.allow_custom_measurements = false;
        self
    }

    /// Rejects metric resource identifiers.
    pub fn without_mri(mut self) -> Self {
        self.allow_mri = false;
        self
    }

    /// Translates public names into the MRI of the metric they are extracted into.
    pub fn resolve_mri(mut self) -> Self {
        self.validate_only = false;
        self
    }
}

impl Default for MetricArg {
    fn default() -> Self {
        Self::new()
    }
}

impl ArgType for MetricArg {
    fn normalize(
        &self,
        value: Option<&str>,
        _params: &Params,
        _combinator: Option<&Combinator>,
    ) -> Result<Expr, ArgumentError> {
        let value = required(value)?;

        let allowed_column = match self.allowed_columns {
            Some(allowed) => {
                allowed.contains(&value)
                    || (self.allow_custom_measurements && columns::is_custom_measurement(value))
            }
            None => true,
        };
        let allowed_mri = self.allow_mri && mri::is_mri(value);

        if !allowed_column && !allowed_mri {
            return Err(ArgumentError::IncompatibleMetricsQuery(format!(
                "{value} is not an allowed column"
            )));
        }

        if self.validate_only || allowed_mri {
            return Ok(Expr::string(value));
        }

        Ok(Expr::String(
            mri::transaction_metric_mri(value).unwrap_or_else(|| value.to_owned()),
        ))
    }

    fn result_type(&self, value: &Expr) -> Option<ResultType> {
        let value = value.as_str()?;
        let unit = mri::MetricResourceIdentifier::parse(value)
            .map(|mri| mri.unit)
            .ok();

        Some(match unit {
            Some("millisecond") => ResultType::Duration,
            _ if columns::is_duration_field(value) => ResultType::Duration,
            _ => ResultType::Number,
        })
    }
}
