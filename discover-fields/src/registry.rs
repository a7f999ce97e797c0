//! Registries of function signatures.
//!
//! The [Discover registry](FunctionRegistry::discover) holds the functions available in event
//! queries. The [metrics registry](FunctionRegistry::metrics) holds the subset available on the
//! metrics dataset, whose column arguments resolve to metric resource identifiers.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::args::{
    ColumnArg, ColumnTagArg, ConditionArg, CountColumn, DateArg, DurationColumn, FieldColumn,
    FunctionAliasArg, FunctionArg, IntArg, IntervalDefault, MetricArg, NullColumn,
    NullableNumberRange, NumberRange, NumericColumn, RawArg, StringArg, StringArrayColumn,
    TimestampArg,
};
use crate::columns::{self, NUMERIC_ARRAY_COLUMNS, TRANSACTION_DURATION};
use crate::combinator::{Combinator, CombinatorKind};
use crate::error::{SearchError, SignatureError};
use crate::expr::{Arguments, Call, Expr};
use crate::function::{Function, FunctionBuilder, ResultType};
use crate::pseudo;

/// Default weight of satisfied users in the user misery score.
pub const MISERY_ALPHA: f64 = 5.8875;
/// Default weight of all users in the user misery score.
pub const MISERY_BETA: f64 = 111.8625;

/// Web vitals and the thresholds at which they become `meh` and `poor`.
const VITAL_THRESHOLDS: &[(&str, f64, f64)] = &[
    ("measurements.cls", 0.1, 0.25),
    ("measurements.fcp", 1000.0, 3000.0),
    ("measurements.fid", 100.0, 300.0),
    ("measurements.fp", 1000.0, 3000.0),
    ("measurements.lcp", 2500.0, 4000.0),
];

/// Columns of the metrics dataset backed by distributions.
const METRIC_DISTRIBUTION_COLUMNS: &[&str] = &[
    "transaction.duration",
    "measurements.app_start_cold",
    "measurements.app_start_warm",
    "measurements.cls",
    "measurements.fcp",
    "measurements.fid",
    "measurements.fp",
    "measurements.frames_frozen",
    "measurements.frames_slow",
    "measurements.frames_total",
    "measurements.lcp",
    "measurements.stall_count",
    "measurements.stall_longest_time",
    "measurements.stall_total_time",
    "measurements.ttfb",
    "measurements.ttfb.requesttime",
    "spans.browser",
    "spans.db",
    "spans.http",
    "spans.resource",
];

/// Columns of the metrics dataset backed by sets.
const METRIC_SET_COLUMNS: &[&str] = &["user"];

/// Columns that may be bucketed by `to_other`.
const TO_OTHER_COLUMNS: &[&str] = &["release", "trace.parent_span", "id", "trace.span"];

/// Returns the threshold expression of a row as used by apdex and misery functions.
const THRESHOLD_METRIC: &str = "multiIf(equals(tupleElement(project_threshold_config, 1), 'lcp'), \
    if(has(measurements.key, 'lcp'), arrayElement(measurements.value, indexOf(measurements.key, \
    'lcp')), NULL), duration)";

/// A value with units, such as `300ms` or `2min`. Trailing text is part of the unit.
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+\.?\d?)(\D{1,3})").unwrap());

static DISCOVER_REGISTRY: LazyLock<FunctionRegistry> = LazyLock::new(|| {
    FunctionRegistry::build_discover().expect("discover functions are valid")
});

static METRICS_REGISTRY: LazyLock<FunctionRegistry> = LazyLock::new(|| {
    FunctionRegistry::build_metrics().expect("metrics functions are valid")
});

/// A lookup table of function signatures by name.
#[derive(Clone, Debug, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Arc<Function>>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a function, replacing any function of the same name.
    pub fn register(&mut self, function: Function) {
        self.functions
            .insert(function.name().to_owned(), Arc::new(function));
    }

    /// Returns the function with exactly the given name.
    pub fn get(&self, name: &str) -> Option<&Arc<Function>> {
        self.functions.get(name)
    }

    /// Returns `true` if the registry contains a function with exactly the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Iterates all functions ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Function>> {
        self.functions.values()
    }

    /// Returns the number of registered functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns `true` if no functions are registered.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Looks up a called function name, resolving combinator suffixes.
    ///
    /// Exact names take precedence over combinators. A combined name resolves to the base
    /// function if the base function supports the combinator.
    pub fn lookup(&self, name: &str) -> Result<(&Arc<Function>, Option<&Combinator>), SearchError> {
        if let Some(function) = self.get(name) {
            return Ok((function, None));
        }

        if let Some((base, kind)) = CombinatorKind::split(name) {
            if let Some(function) = self.get(base) {
                let combinator = function.find_combinator(kind).ok_or_else(|| {
                    SearchError::invalid(format!("{base}: no support for the -{kind} combinator"))
                })?;
                return Ok((function, Some(combinator)));
            }
        }

        Err(SearchError::invalid(format!("{name} is not a valid function")))
    }

    /// Builds the registry of functions available in event queries.
    pub fn build_discover() -> Result<Self, SignatureError> {
        let mut registry = Self::new();
        for function in discover_functions()? {
            registry.register(function);
        }

        for (alias, target) in [("tpm", "epm"), ("tps", "eps")] {
            if let Some(function) = registry.get(target) {
                let function = function.alias_as(alias);
                registry.register(function);
            }
        }

        Ok(registry)
    }

    /// Builds the registry of functions available on the metrics dataset.
    pub fn build_metrics() -> Result<Self, SignatureError> {
        let mut registry = Self::new();
        for function in metrics_functions()? {
            registry.register(function);
        }
        Ok(registry)
    }

    /// Returns the shared registry of functions available in event queries.
    pub fn discover() -> &'static Self {
        &DISCOVER_REGISTRY
    }

    /// Returns the shared registry of functions available on the metrics dataset.
    pub fn metrics() -> &'static Self {
        &METRICS_REGISTRY
    }
}

fn arg(name: &str) -> Expr {
    Expr::arg(name)
}

fn column(name: &str) -> Expr {
    Expr::string(name)
}

fn call(function: &str, args: Vec<Expr>) -> Expr {
    Expr::call(function, args)
}

fn array_combinator() -> Combinator {
    Combinator::array("column", NUMERIC_ARRAY_COLUMNS)
}

fn numeric_column() -> FunctionArg {
    FunctionArg::new("column", NumericColumn::new())
}

/// A function aggregating a single numeric column.
fn numeric_aggregate(name: &str, aggregate: &str, result_type: ResultType) -> FunctionBuilder {
    Function::builder(name)
        .required(numeric_column())
        .aggregate(aggregate, arg("column"), None)
        .reflective_result_type(0)
        .result_type(result_type)
        .combinator(array_combinator())
}

/// A fixed percentile of a numeric column that defaults to the transaction duration.
fn fixed_percentile(name: &str, aggregate: &str) -> FunctionBuilder {
    Function::builder(name)
        .optional(numeric_column().with_default(TRANSACTION_DURATION))
        .aggregate(aggregate, arg("column"), None)
        .reflective_result_type(0)
        .result_type(ResultType::Duration)
        .redundant_grouping()
        .combinator(array_combinator())
}

/// Compares the timestamp against the `middle` argument with the `condition` argument.
fn range_condition() -> Expr {
    call(
        "{condition}",
        vec![call("toDateTime", vec![arg("middle")]), column("timestamp")],
    )
}

/// A conditional aggregate of a numeric column over a time range.
fn range_aggregate(name: &str, aggregate: &str, result_type: ResultType) -> FunctionBuilder {
    Function::builder(name)
        .required(numeric_column())
        .required(FunctionArg::new(
            "percentile",
            NumberRange::new(Some(0.0), Some(1.0)),
        ))
        .required(FunctionArg::new("condition", ConditionArg))
        .required(FunctionArg::new("middle", DateArg))
        .aggregate(
            aggregate,
            Expr::List(vec![arg("column"), range_condition()]),
            None,
        )
        .result_type(result_type)
}

/// Multiplies the satisfaction threshold to the tolerated threshold.
fn tolerated(arguments: &Arguments) -> Result<Expr, SearchError> {
    Ok(match arguments.get("satisfaction").and_then(Expr::as_f64) {
        Some(satisfaction) => Expr::Float(satisfaction * 4.0),
        None => Expr::Null,
    })
}

fn parameter_sum(arguments: &Arguments) -> Result<Expr, SearchError> {
    let alpha = arguments.get("alpha").and_then(Expr::as_f64).unwrap_or(MISERY_ALPHA);
    let beta = arguments.get("beta").and_then(Expr::as_f64).unwrap_or(MISERY_BETA);
    Ok(Expr::Float(alpha + beta))
}

fn raw_string(arguments: &Arguments, name: &str) -> String {
    match arguments.get(name) {
        Some(Expr::String(value)) => value.trim_matches('\'').to_owned(),
        _ => String::new(),
    }
}

/// Converts a duration like `300ms` or `2min` into milliseconds.
fn parse_duration(value: &str, unit: &str) -> Result<f64, SearchError> {
    let value: f64 = value
        .parse()
        .map_err(|_| SearchError::invalid(format!("{value} is not a valid duration value")))?;

    let factor = match unit {
        "ms" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        "w" | "wk" | "wks" | "week" | "weeks" => 604_800_000.0,
        _ => {
            return Err(SearchError::invalid(format!(
                "{unit} is not a valid duration type, must be ms, s, min, m, hr, h, day, d, wk or w"
            )));
        }
    };

    Ok(value * factor)
}

/// Casts the value of `count_if` to the type of the compared column.
fn typed_count_if_value(arguments: &Arguments) -> Result<Expr, SearchError> {
    let column = raw_string(arguments, "column");
    let quoted = arguments.get("value").cloned().unwrap_or(Expr::Null);
    let value = raw_string(arguments, "value");

    let is_numeric =
        column == TRANSACTION_DURATION || columns::is_measurement(&column) || columns::is_span_op_breakdown(&column);

    if is_numeric {
        if let Some(captures) = DURATION_RE.captures(&value) {
            return parse_duration(&captures[1], &captures[2]).map(Expr::Float);
        }

        return value.trim().parse().map(Expr::Float).map_err(|_| {
            SearchError::invalid(format!(
                "'{value}' is not a valid value to compare with {column}"
            ))
        });
    }

    if column == "transaction.status" {
        return columns::span_status_code(&value)
            .map(Expr::Int)
            .ok_or_else(|| {
                SearchError::invalid(format!(
                    "'{value}' is not a valid value for transaction.status"
                ))
            });
    }

    if pseudo::pseudo_field(&column).is_some() {
        return Err(SearchError::invalid(format!(
            "{column} is not supported by count_if"
        )));
    }

    Ok(quoted)
}

/// Restricts array fields to equality conditions.
fn count_if_condition(arguments: &Arguments) -> Result<Expr, SearchError> {
    let column = raw_string(arguments, "column");
    let condition = raw_string(arguments, "condition");

    if columns::ARRAY_FIELDS.contains(&column.as_str())
        && !matches!(condition.as_str(), "equals" | "notEquals")
    {
        return Err(SearchError::invalid(format!(
            "{condition} is not a valid condition for {column}"
        )));
    }

    Ok(Expr::String(condition))
}

/// Builds the condition of a web vital falling into the requested quality bucket.
fn web_vital_condition(arguments: &Arguments) -> Result<Expr, SearchError> {
    let vital = raw_string(arguments, "column");
    let quality = raw_string(arguments, "quality").to_lowercase();

    let Some(&(_, meh, poor)) = VITAL_THRESHOLDS.iter().find(|(name, _, _)| *name == vital)
    else {
        return Err(SearchError::invalid(
            "count_web_vitals only supports measurements",
        ));
    };

    let column = arguments.get("column").cloned().unwrap_or(Expr::Null);
    let compare = |condition: &str, threshold: f64| {
        call(condition, vec![column.clone(), Expr::Float(threshold)])
    };

    Ok(match quality.as_str() {
        "good" => compare("less", meh),
        "meh" => call(
            "and",
            vec![compare("greaterOrEquals", meh), compare("less", poor)],
        ),
        "poor" => compare("greaterOrEquals", poor),
        _ => compare("greaterOrEquals", 0.0),
    })
}

fn regression_half(condition: &str) -> Expr {
    let in_range = || call(condition, vec![column("timestamp"), arg("timestamp")]);
    call(
        "multiply",
        vec![
            call("avgIf", vec![arg("column"), in_range()]),
            call("countIf", vec![in_range()]),
        ],
    )
}

/// Declares all functions available in event queries.
fn discover_functions() -> Result<Vec<Function>, SignatureError> {
    let mut functions = vec![
        Function::builder("percentile")
            .required(numeric_column())
            .required(FunctionArg::new(
                "percentile",
                NumberRange::new(Some(0.0), Some(1.0)),
            ))
            .aggregate("quantile({percentile:g})", arg("column"), None)
            .reflective_result_type(0)
            .result_type(ResultType::Duration)
            .redundant_grouping()
            .combinator(array_combinator())
            .build()?,
        fixed_percentile("p50", "quantile(0.5)").build()?,
        fixed_percentile("p75", "quantile(0.75)").build()?,
        fixed_percentile("p90", "quantile(0.90)").build()?,
        fixed_percentile("p95", "quantile(0.95)").build()?,
        fixed_percentile("p99", "quantile(0.99)").build()?,
        fixed_percentile("p100", "max").build()?,
        Function::builder("eps")
            .optional(FunctionArg::new(
                "interval",
                IntervalDefault::new(Some(1.0), None),
            ))
            .transform("divide(count(), {interval:g})")
            .result_type(ResultType::Number)
            .build()?,
        Function::builder("epm")
            .optional(FunctionArg::new(
                "interval",
                IntervalDefault::new(Some(1.0), None),
            ))
            .transform("divide(count(), divide({interval:g}, 60))")
            .result_type(ResultType::Number)
            .build()?,
        Function::builder("last_seen")
            .aggregate("max", column("timestamp"), Some("last_seen"))
            .result_type(ResultType::Date)
            .redundant_grouping()
            .build()?,
        Function::builder("latest_event")
            .aggregate(
                "argMax",
                Expr::List(vec![column("id"), column("timestamp")]),
                Some("latest_event"),
            )
            .result_type(ResultType::String)
            .build()?,
        Function::builder("apdex")
            .optional(FunctionArg::new(
                "satisfaction",
                NullableNumberRange::new(Some(0.0), None),
            ))
            .conditional_transform(
                "satisfaction",
                "apdex(duration, {satisfaction:g})",
                format!("apdex({THRESHOLD_METRIC}, tupleElement(project_threshold_config, 2))"),
            )
            .result_type(ResultType::Number)
            .build()?,
        Function::builder("count_miserable")
            .required(FunctionArg::new("column", CountColumn))
            .optional(FunctionArg::new(
                "satisfaction",
                NullableNumberRange::new(Some(0.0), None),
            ))
            .calculated("tolerated", tolerated)
            .conditional_transform(
                "satisfaction",
                "uniqIf({column}, greater(duration, {tolerated:g}))",
                format!(
                    "uniqIf({{column}}, greater({THRESHOLD_METRIC}, \
                     multiply(tupleElement(project_threshold_config, 2), 4)))"
                ),
            )
            .result_type(ResultType::Integer)
            .build()?,
        Function::builder("user_misery")
            .optional(FunctionArg::new(
                "satisfaction",
                NullableNumberRange::new(Some(0.0), None),
            ))
            .optional(
                FunctionArg::new("alpha", NumberRange::new(Some(0.0), None))
                    .with_default(MISERY_ALPHA.to_string()),
            )
            .optional(
                FunctionArg::new("beta", NumberRange::new(Some(0.0), None))
                    .with_default(MISERY_BETA.to_string()),
            )
            .calculated("tolerated", tolerated)
            .calculated("parameter_sum", parameter_sum)
            .conditional_transform(
                "satisfaction",
                "ifNull(divide(plus(uniqIf(user, greater(duration, {tolerated:g})), {alpha:g}), \
                 plus(uniq(user), {parameter_sum:g})), 0)",
                format!(
                    "ifNull(divide(plus(uniqIf(user, greater({THRESHOLD_METRIC}, \
                     multiply(tupleElement(project_threshold_config, 2), 4))), {{alpha:g}}), \
                     plus(uniq(user), {{parameter_sum:g}})), 0)"
                ),
            )
            .result_type(ResultType::Number)
            .build()?,
        Function::builder("failure_rate")
            .transform("failure_rate()")
            .result_type(ResultType::Percentage)
            .build()?,
        Function::builder("failure_count")
            .transform("countIf(notIn(transaction_status, tuple(0, 1, 2)))")
            .result_type(ResultType::Integer)
            .build()?,
        Function::builder("array_join")
            .required(FunctionArg::new("column", StringArrayColumn))
            .column(Call::new("arrayJoin", vec![arg("column")]))
            .result_type(ResultType::String)
            .private()
            .build()?,
        Function::builder("histogram")
            .required(FunctionArg::new(
                "column",
                NumericColumn::new().allow_array_value(),
            ))
            .required(FunctionArg::new("num_buckets", IntArg::new(Some(1), Some(500))))
            .required(FunctionArg::new(
                "bucket_size",
                NumberRange::new(Some(0.0), None),
            ))
            .required(FunctionArg::new(
                "start_offset",
                NumberRange::new(Some(0.0), None),
            ))
            .required(FunctionArg::new(
                "multiplier",
                NumberRange::new(Some(1.0), None),
            ))
            // floor((x * multiplier - start_offset) / bucket_size) * bucket_size + start_offset
            .column(Call::new(
                "plus",
                vec![
                    call(
                        "multiply",
                        vec![
                            call(
                                "floor",
                                vec![call(
                                    "divide",
                                    vec![
                                        call(
                                            "minus",
                                            vec![
                                                call(
                                                    "multiply",
                                                    vec![arg("column"), arg("multiplier")],
                                                ),
                                                arg("start_offset"),
                                            ],
                                        ),
                                        arg("bucket_size"),
                                    ],
                                )],
                            ),
                            arg("bucket_size"),
                        ],
                    ),
                    arg("start_offset"),
                ],
            ))
            .result_type(ResultType::Number)
            .private()
            .build()?,
        Function::builder("count_unique")
            .required(FunctionArg::new("column", CountColumn))
            .aggregate("uniq", arg("column"), None)
            .result_type(ResultType::Integer)
            .build()?,
        Function::builder("count")
            .optional(FunctionArg::new("column", NullColumn))
            .aggregate("count", Expr::Null, None)
            .result_type(ResultType::Integer)
            .build()?,
        Function::builder("count_at_least")
            .required(numeric_column())
            .required(FunctionArg::new(
                "threshold",
                NumberRange::new(Some(0.0), None),
            ))
            .aggregate(
                "countIf",
                Expr::List(vec![call(
                    "greaterOrEquals",
                    vec![arg("column"), arg("threshold")],
                )]),
                None,
            )
            .result_type(ResultType::Integer)
            .build()?,
        numeric_aggregate("min", "min", ResultType::Duration)
            .redundant_grouping()
            .build()?,
        numeric_aggregate("max", "max", ResultType::Duration)
            .redundant_grouping()
            .build()?,
        numeric_aggregate("avg", "avg", ResultType::Duration)
            .redundant_grouping()
            .build()?,
        numeric_aggregate("var", "varSamp", ResultType::Number).build()?,
        numeric_aggregate("stddev", "stddevSamp", ResultType::Number).build()?,
        numeric_aggregate("sum", "sum", ResultType::Duration).build()?,
        Function::builder("cov")
            .required(FunctionArg::new("column1", NumericColumn::new()))
            .required(FunctionArg::new("column2", NumericColumn::new()))
            .aggregate(
                "covarSamp",
                Expr::List(vec![arg("column1"), arg("column2")]),
                None,
            )
            .result_type(ResultType::Number)
            .build()?,
        Function::builder("corr")
            .required(FunctionArg::new("column1", NumericColumn::new()))
            .required(FunctionArg::new("column2", NumericColumn::new()))
            .aggregate(
                "corr",
                Expr::List(vec![arg("column1"), arg("column2")]),
                None,
            )
            .result_type(ResultType::Number)
            .build()?,
        Function::builder("any")
            .required(FunctionArg::new("column", FieldColumn))
            .aggregate("min", arg("column"), None)
            .reflective_result_type(0)
            .result_type(ResultType::String)
            .redundant_grouping()
            .build()?,
        range_aggregate(
            "percentile_range",
            "quantileIf({percentile:.2f})",
            ResultType::Duration,
        )
        .reflective_result_type(0)
        .build()?,
        Function::builder("avg_range")
            .required(numeric_column())
            .required(FunctionArg::new("condition", ConditionArg))
            .required(FunctionArg::new("middle", DateArg))
            .aggregate(
                "avgIf",
                Expr::List(vec![arg("column"), range_condition()]),
                None,
            )
            .reflective_result_type(0)
            .result_type(ResultType::Duration)
            .build()?,
        Function::builder("variance_range")
            .required(numeric_column())
            .required(FunctionArg::new("condition", ConditionArg))
            .required(FunctionArg::new("middle", DateArg))
            .aggregate(
                "varSampIf",
                Expr::List(vec![arg("column"), range_condition()]),
                None,
            )
            .result_type(ResultType::Number)
            .build()?,
        Function::builder("count_range")
            .required(FunctionArg::new("condition", ConditionArg))
            .required(FunctionArg::new("middle", DateArg))
            .aggregate("countIf", Expr::List(vec![range_condition()]), None)
            .result_type(ResultType::Integer)
            .build()?,
        Function::builder("t_test")
            .required(FunctionArg::new("avg_1", FunctionAliasArg))
            .required(FunctionArg::new("avg_2", FunctionAliasArg))
            .required(FunctionArg::new("variance_1", FunctionAliasArg))
            .required(FunctionArg::new("variance_2", FunctionAliasArg))
            .required(FunctionArg::new("count_1", FunctionAliasArg))
            .required(FunctionArg::new("count_2", FunctionAliasArg))
            .aggregate(
                "divide(minus({avg_1},{avg_2}),sqrt(plus(divide({variance_1},{count_1}),\
                 divide({variance_2},{count_2}))))",
                Expr::Null,
                Some("t_test"),
            )
            .result_type(ResultType::Number)
            .build()?,
        Function::builder("minus")
            .required(FunctionArg::new("minuend", RawArg))
            .required(FunctionArg::new("subtrahend", RawArg))
            .aggregate(
                "minus",
                Expr::List(vec![arg("minuend"), arg("subtrahend")]),
                None,
            )
            .result_type(ResultType::Duration)
            .build()?,
        Function::builder("absolute_correlation")
            .aggregate(
                "abs",
                Expr::List(vec![call(
                    "corr",
                    vec![
                        call("toUnixTimestamp", vec![column("timestamp")]),
                        column(TRANSACTION_DURATION),
                    ],
                )]),
                None,
            )
            .result_type(ResultType::Number)
            .build()?,
        Function::builder("absolute_delta")
            .required(FunctionArg::new("column", DurationColumn::new()))
            .required(FunctionArg::new(
                "target",
                NumberRange::new(Some(0.0), None),
            ))
            .transform("abs(minus({column}, {target:.6f}))")
            .result_type(ResultType::Duration)
            .build()?,
        Function::builder("compare_numeric_aggregate")
            .required(FunctionArg::new("aggregate_alias", FunctionAliasArg))
            .required(FunctionArg::new("condition", ConditionArg))
            .required(FunctionArg::new("value", NumberRange::new(Some(0.0), None)))
            .aggregate("{condition}({aggregate_alias}, {value})", Expr::Null, None)
            .result_type(ResultType::Number)
            .build()?,
        Function::builder("count_if")
            .required(FunctionArg::new("column", ColumnTagArg))
            .required(FunctionArg::new("condition", ConditionArg))
            .required(FunctionArg::new(
                "value",
                StringArg::new().optional_unquote().unescape_quotes(),
            ))
            .calculated("typed_value", typed_count_if_value)
            .calculated("normalized_condition", count_if_condition)
            .aggregate(
                "countIf",
                Expr::List(vec![call(
                    "{normalized_condition}",
                    vec![arg("column"), arg("typed_value")],
                )]),
                None,
            )
            .result_type(ResultType::Integer)
            .build()?,
        Function::builder("count_web_vitals")
            .required(numeric_column())
            .required(FunctionArg::new(
                "quality",
                StringArg::new().allowed(&["good", "meh", "poor", "any"]),
            ))
            .calculated("quality_condition", web_vital_condition)
            .aggregate("countIf", arg("quality_condition"), None)
            .result_type(ResultType::Integer)
            .build()?,
        Function::builder("to_other")
            .required(FunctionArg::new(
                "column",
                ColumnArg::new().allowed(TO_OTHER_COLUMNS),
            ))
            .required(FunctionArg::new(
                "value",
                StringArg::new().unquote().unescape_quotes(),
            ))
            .optional(FunctionArg::new("that", StringArg::new()).with_default("that"))
            .optional(FunctionArg::new("this", StringArg::new()).with_default("this"))
            .column(Call::new(
                "if",
                vec![
                    call("equals", vec![arg("column"), arg("value")]),
                    arg("this"),
                    arg("that"),
                ],
            ))
            .result_type(ResultType::String)
            .private()
            .build()?,
        Function::builder("regression_score")
            .required(numeric_column())
            .required(FunctionArg::new("timestamp", TimestampArg))
            .aggregate(
                "minus",
                Expr::List(vec![
                    regression_half("greater"),
                    regression_half("lessOrEquals"),
                ]),
                None,
            )
            .result_type(ResultType::Number)
            .build()?,
    ];

    functions.push(percentage_function()?);
    Ok(functions)
}

/// The ratio of two aggregates, also used for precomputed aliases.
fn percentage_function() -> Result<Function, SignatureError> {
    Function::builder("percentage")
        .required(FunctionArg::new("numerator", RawArg))
        .required(FunctionArg::new("denominator", RawArg))
        .aggregate(
            "if(greater({denominator},0),divide({numerator},{denominator}),null)",
            Expr::Null,
            None,
        )
        .result_type(ResultType::Percentage)
        .build()
}

/// A metric argument accepting distribution columns.
fn distribution() -> FunctionArg {
    FunctionArg::new(
        "column",
        MetricArg::new()
            .allowed(METRIC_DISTRIBUTION_COLUMNS)
            .resolve_mri(),
    )
}

fn metric_aggregate(name: &str, aggregate: &str) -> Result<Function, SignatureError> {
    Function::builder(name)
        .required(distribution())
        .aggregate(aggregate, arg("column"), None)
        .reflective_result_type(0)
        .result_type(ResultType::Duration)
        .build()
}

fn metric_percentile(name: &str, aggregate: &str) -> Result<Function, SignatureError> {
    Function::builder(name)
        .optional(distribution().with_default(TRANSACTION_DURATION))
        .aggregate(aggregate, arg("column"), None)
        .reflective_result_type(0)
        .result_type(ResultType::Duration)
        .build()
}

/// Declares all functions available on the metrics dataset.
fn metrics_functions() -> Result<Vec<Function>, SignatureError> {
    Ok(vec![
        metric_aggregate("avg", "avg")?,
        metric_aggregate("max", "max")?,
        metric_aggregate("min", "min")?,
        metric_aggregate("sum", "sum")?,
        metric_percentile("p50", "quantile(0.5)")?,
        metric_percentile("p75", "quantile(0.75)")?,
        metric_percentile("p90", "quantile(0.90)")?,
        metric_percentile("p95", "quantile(0.95)")?,
        metric_percentile("p99", "quantile(0.99)")?,
        Function::builder("count_unique")
            .required(FunctionArg::new(
                "column",
                MetricArg::new()
                    .allowed(METRIC_SET_COLUMNS)
                    .without_custom_measurements()
                    .resolve_mri(),
            ))
            .aggregate("uniq", arg("column"), None)
            .result_type(ResultType::Integer)
            .build()?,
        Function::builder("count")
            .optional(distribution().with_default(TRANSACTION_DURATION))
            .aggregate("count", arg("column"), None)
            .result_type(ResultType::Integer)
            .build()?,
    ])
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::params::Params;

    fn arguments(function: &str, columns: &[&str]) -> Result<Arguments, SearchError> {
        let registry = FunctionRegistry::discover();
        let (function, combinator) = registry.lookup(function)?;
        let columns: Vec<_> = columns.iter().map(|&c| c.to_owned()).collect();
        function.format_as_arguments("test", &columns, &Params::default(), combinator)
    }

    #[test]
    fn test_registries_build() {
        let discover = FunctionRegistry::build_discover().unwrap();
        assert!(discover.contains("p95"));
        assert!(discover.contains("tpm"));
        assert!(discover.contains("tps"));
        assert!(discover.contains("percentage"));

        let metrics = FunctionRegistry::build_metrics().unwrap();
        assert!(metrics.contains("p95"));
        assert!(!metrics.contains("count_if"));
    }

    #[test]
    fn test_lookup_combinator() {
        let registry = FunctionRegistry::discover();

        let (function, combinator) = registry.lookup("avgArray").unwrap();
        assert_eq!(function.name(), "avg");
        assert_eq!(combinator.map(|c| c.kind), Some(CombinatorKind::Array));

        let error = registry.lookup("count_uniqueArray").unwrap_err();
        assert_eq!(
            error.to_string(),
            "count_unique: no support for the -Array combinator"
        );

        let error = registry.lookup("fooArray").unwrap_err();
        assert_eq!(error.to_string(), "fooArray is not a valid function");
    }

    #[test]
    fn test_count_if_duration() {
        let args = arguments("count_if", &["transaction.duration", "greater", "300"]).unwrap();
        assert_eq!(args["typed_value"], Expr::Float(300.0));
        assert_eq!(args["normalized_condition"], Expr::string("greater"));

        let args = arguments("count_if", &["transaction.duration", "less", "2s"]).unwrap();
        assert_eq!(args["typed_value"], Expr::Float(2000.0));

        let error = arguments("count_if", &["transaction.duration", "less", "2years"]);
        assert!(error.is_err());

        let error = arguments("count_if", &["transaction.duration", "less", "300msx"]).unwrap_err();
        assert_eq!(
            error.to_string(),
            "msx is not a valid duration type, must be ms, s, min, m, hr, h, day, d, wk or w"
        );

        let error = arguments("count_if", &["measurements.lcp", "less", "fast"]).unwrap_err();
        assert_eq!(
            error.to_string(),
            "'fast' is not a valid value to compare with measurements.lcp"
        );
    }

    #[test]
    fn test_count_if_status() {
        let args = arguments("count_if", &["transaction.status", "equals", "not_found"]).unwrap();
        assert_eq!(args["typed_value"], Expr::Int(5));

        let error = arguments("count_if", &["transaction.status", "equals", "great"]).unwrap_err();
        assert_eq!(
            error.to_string(),
            "'great' is not a valid value for transaction.status"
        );
    }

    #[test]
    fn test_count_if_strings() {
        let args = arguments("count_if", &["release", "equals", r#""1.0, beta""#]).unwrap();
        assert_eq!(args["typed_value"], Expr::string("'1.0, beta'"));

        let error = arguments("count_if", &["error.type", "less", "x"]).unwrap_err();
        assert_eq!(error.to_string(), "less is not a valid condition for error.type");

        let error = arguments("count_if", &["user.display", "equals", "x"]).unwrap_err();
        assert_eq!(error.to_string(), "user.display is not supported by count_if");
    }

    #[test]
    fn test_misery_arguments() {
        let args = arguments("user_misery", &["300"]).unwrap();
        assert_eq!(args["tolerated"], Expr::Float(1200.0));
        assert_eq!(args["alpha"], Expr::Float(MISERY_ALPHA));
        assert_eq!(args["beta"], Expr::Float(MISERY_BETA));

        let args = arguments("user_misery", &[]).unwrap();
        assert_eq!(args["satisfaction"], Expr::Null);
        assert_eq!(args["tolerated"], Expr::Null);
    }

    #[test]
    fn test_web_vitals() {
        let args = arguments("count_web_vitals", &["measurements.lcp", "good"]).unwrap();
        assert_eq!(
            args["quality_condition"],
            Expr::call(
                "less",
                vec![Expr::string("measurements.lcp"), Expr::Float(2500.0)]
            )
        );

        let error = arguments("count_web_vitals", &["measurements.ttfb", "good"]).unwrap_err();
        assert_eq!(error.to_string(), "count_web_vitals only supports measurements");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1.5", "min").unwrap(), 90_000.0);
        assert_eq!(parse_duration("2", "h").unwrap(), 7_200_000.0);
        assert_eq!(
            parse_duration("1", "yr").unwrap_err().to_string(),
            "yr is not a valid duration type, must be ms, s, min, m, hr, h, day, d, wk or w"
        );
    }
}
