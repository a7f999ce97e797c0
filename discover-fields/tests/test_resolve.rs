use chrono::{TimeZone, Utc};
use discover_fields::{
    Aggregate, Expr, FunctionRegistry, Params, ResolveOptions, ResultType, SearchError,
    SelectedColumn, resolve_field, resolve_field_list, resolve_function,
};
use insta::assert_json_snapshot;
use similar_asserts::assert_eq;

fn aggregate(field: &str) -> Aggregate {
    resolve_field(field, &Params::default(), None)
        .unwrap()
        .aggregate
        .unwrap()
}

fn error(field: &str) -> String {
    resolve_field(field, &Params::default(), None)
        .unwrap_err()
        .to_string()
}

fn acl(names: &[&str]) -> Vec<String> {
    names.iter().map(|&name| name.to_owned()).collect()
}

#[test]
fn test_fixed_percentile() {
    let p95 = aggregate("p95(transaction.duration)");
    assert_eq!(p95.function, "quantile(0.95)");
    assert_eq!(p95.args, Expr::string("transaction.duration"));
    assert_eq!(p95.alias, "p95_transaction_duration");
}

#[test]
fn test_default_argument_matches_explicit() {
    let implicit = resolve_field("p50()", &Params::default(), None).unwrap();
    let explicit = resolve_field("p50(transaction.duration)", &Params::default(), None).unwrap();

    let (implicit_agg, explicit_agg) = (implicit.aggregate.unwrap(), explicit.aggregate.unwrap());
    assert_eq!(implicit_agg.function, explicit_agg.function);
    assert_eq!(implicit_agg.args, explicit_agg.args);
    assert_eq!(implicit_agg.alias, "p50");
    assert_eq!(
        implicit.details.unwrap().arguments,
        explicit.details.unwrap().arguments
    );
}

#[test]
fn test_count() {
    assert_json_snapshot!(aggregate("count()"), @r###"
    [
      "count",
      null,
      "count"
    ]
    "###);
}

#[test]
fn test_count_if_duration() {
    let count_if = aggregate("count_if(transaction.duration, greater, 300)");
    assert_eq!(count_if.alias, "count_if_transaction_duration_greater_300");
    assert_json_snapshot!(count_if, @r###"
    [
      "countIf",
      [
        [
          "greater",
          [
            "transaction.duration",
            300.0
          ]
        ]
      ],
      "count_if_transaction_duration_greater_300"
    ]
    "###);
}

#[test]
fn test_count_if_duration_units() {
    let count_if = aggregate("count_if(transaction.duration, less, 2s)");
    let Expr::List(args) = count_if.args else {
        panic!("expected a list of arguments");
    };
    let Expr::Call(ref call) = args[0] else {
        panic!("expected a condition");
    };
    assert_eq!(call.args[1], Expr::Float(2000.0));
}

#[test]
fn test_percentile_bounds() {
    assert_eq!(aggregate("percentile(transaction.duration, 0.5)").function, "quantile(0.5)");
    assert_eq!(
        error("percentile(transaction.duration, 1.5)"),
        "percentile(transaction.duration, 1.5): percentile argument invalid: 1.5 must be less than 1"
    );
    assert_eq!(
        error("percentile(transaction.duration, -1)"),
        "percentile(transaction.duration, -1): percentile argument invalid: -1 must be greater than or equal to 0"
    );
}

#[test]
fn test_percentile_upper_bound_is_exclusive() {
    assert_eq!(
        aggregate("percentile(transaction.duration, 0.99)").function,
        "quantile(0.99)"
    );
    assert_eq!(
        error("percentile(transaction.duration, 1.0)"),
        "percentile(transaction.duration, 1.0): percentile argument invalid: 1 must be less than 1"
    );
}

#[test]
fn test_apdex_with_satisfaction() {
    assert_json_snapshot!(aggregate("apdex(300)"), @r###"
    [
      "apdex(duration, 300)",
      null,
      "apdex_300"
    ]
    "###);
}

#[test]
fn test_apdex_with_project_threshold() {
    let apdex = aggregate("apdex()");
    assert_eq!(
        apdex.function,
        "apdex(multiIf(equals(tupleElement(project_threshold_config, 1), 'lcp'), \
         if(has(measurements.key, 'lcp'), arrayElement(measurements.value, \
         indexOf(measurements.key, 'lcp')), NULL), duration), \
         tupleElement(project_threshold_config, 2))"
    );
    assert_eq!(apdex.args, Expr::Null);
    assert_eq!(apdex.alias, "apdex");
}

#[test]
fn test_user_misery_with_satisfaction() {
    assert_json_snapshot!(aggregate("user_misery(300)"), @r###"
    [
      "ifNull(divide(plus(uniqIf(user, greater(duration, 1200)), 5.8875), plus(uniq(user), 117.75)), 0)",
      null,
      "user_misery_300"
    ]
    "###);
}

#[test]
fn test_count_miserable_with_satisfaction() {
    assert_json_snapshot!(aggregate("count_miserable(user, 300)"), @r###"
    [
      "uniqIf(user, greater(duration, 1200))",
      null,
      "count_miserable_user_300"
    ]
    "###);
}

#[test]
fn test_count_unique_team_key_transaction() {
    let params = Params::new(1, vec![1]).with_teams(vec![1]);
    let resolved = resolve_field("count_unique(team_key_transaction)", &params, None).unwrap();
    assert_json_snapshot!(resolved.aggregate.unwrap(), @r###"
    [
      "uniq",
      [
        [
          "toInt8",
          [
            0
          ]
        ]
      ],
      "count_unique_team_key_transaction"
    ]
    "###);

    let error = resolve_field(
        "count_unique(team_key_transaction)",
        &Params::new(1, vec![1]),
        None,
    )
    .unwrap_err();
    assert_eq!(
        error.to_string(),
        "count_unique(team_key_transaction): column argument invalid: \
         Team key transactions parameters cannot be None"
    );
}

#[test]
fn test_count_unique_project_threshold_config() {
    let params = Params::new(1, vec![1]);
    let resolved = resolve_field("count_unique(project_threshold_config)", &params, None).unwrap();
    assert_json_snapshot!(resolved.aggregate.unwrap(), @r###"
    [
      "uniq",
      [
        [
          "tuple",
          [
            "'duration'",
            300
          ]
        ]
      ],
      "count_unique_project_threshold_config"
    ]
    "###);
}

#[test]
fn test_typed_tags() {
    let count_if = aggregate("count_if(tags[level, string], equals, error)");
    assert_eq!(
        count_if.args,
        Expr::List(vec![Expr::call(
            "equals",
            vec![Expr::string("tags[level, string]"), Expr::string("'error'")]
        )])
    );

    let resolved = resolve_field("tags[foo, number]", &Params::default(), None).unwrap();
    assert_eq!(
        resolved.column,
        Some(SelectedColumn::Field("tags[foo, number]".to_owned()))
    );
}

#[test]
fn test_argument_count() {
    assert_eq!(
        error("percentile(transaction.duration)"),
        "percentile(transaction.duration): expected exactly 2 argument(s) but got 1 argument(s)"
    );
    assert_eq!(
        error("p95(transaction.duration, 1)"),
        "p95(transaction.duration, 1): expected at most 1 argument(s) but got 2 argument(s)"
    );
    assert_eq!(
        error("to_other(release)"),
        "to_other(release): expected at least 2 argument(s) but got 1 argument(s)"
    );
}

#[test]
fn test_invalid_column() {
    assert_eq!(
        error("p95(not_a_real_column)"),
        "p95(not_a_real_column): column argument invalid: not_a_real_column is not a valid column"
    );
    assert_eq!(
        error("avg(title)"),
        "avg(title): column argument invalid: title is not a numeric column"
    );
}

#[test]
fn test_unknown_function() {
    assert_eq!(error("nope()"), "nope is not a valid function");
    assert_eq!(
        error("count_uniqueArray(user)"),
        "count_unique: no support for the -Array combinator"
    );
}

#[test]
fn test_private_function() {
    let params = Params::default();
    assert_eq!(
        error("array_join(tags.key)"),
        "array_join: no access to private function"
    );

    let granted = acl(&["array_join"]);
    let resolved = resolve_function("array_join(tags.key)", &params, Some(&granted)).unwrap();
    assert_json_snapshot!(resolved.column.unwrap(), @r###"
    [
      "arrayJoin",
      [
        "tags.key"
      ],
      "array_join_tags_key"
    ]
    "###);
}

#[test]
fn test_array_combinator() {
    let params = Params::default();
    assert_eq!(
        error("avgArray(spans_exclusive_time)"),
        "avg: no access to private function"
    );

    let granted = acl(&["avgArray"]);
    let resolved =
        resolve_function("avgArray(spans_exclusive_time)", &params, Some(&granted)).unwrap();
    let aggregate = resolved.aggregate.unwrap();
    assert_eq!(aggregate.function, "avg");
    assert_eq!(
        aggregate.args,
        Expr::List(vec![Expr::call(
            "arrayJoin",
            vec![Expr::string("spans_exclusive_time")]
        )])
    );
    assert_eq!(aggregate.alias, "avgArray_spans_exclusive_time");
}

#[test]
fn test_explicit_alias() {
    let first = aggregate("p75(measurements.lcp) as slow_lcp");
    let second = aggregate("p75(measurements.lcp) as slow_lcp");
    assert_eq!(first, second);
    assert_eq!(first.alias, "slow_lcp");
}

#[test]
fn test_transform() {
    let params = Params::default().with_range(
        Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2021, 1, 1, 1, 0, 0).unwrap(),
    );

    let resolved = resolve_function("epm()", &params, None).unwrap();
    let aggregate = resolved.aggregate.unwrap();
    assert_eq!(aggregate.function, "divide(count(), divide(3600, 60))");
    assert_eq!(aggregate.args, Expr::Null);
    assert_eq!(aggregate.alias, "epm");

    let tpm = resolve_function("tpm()", &params, None).unwrap();
    assert_eq!(tpm.aggregate.unwrap().function, aggregate.function);

    assert_eq!(
        resolve_function("epm()", &Params::default(), None)
            .unwrap_err()
            .to_string(),
        "epm(): interval argument invalid: function called without default"
    );
}

#[test]
fn test_result_types() {
    let params = Params::default();
    let result_type = |field: &str| {
        resolve_field(field, &params, None)
            .unwrap()
            .details
            .unwrap()
            .result_type()
    };

    assert_eq!(result_type("p95()"), Some(ResultType::Duration));
    assert_eq!(result_type("avg(measurements.cls)"), Some(ResultType::Number));
    assert_eq!(result_type("count_unique(user)"), Some(ResultType::Integer));
    assert_eq!(result_type("failure_rate()"), Some(ResultType::Percentage));
}

#[test]
fn test_plain_fields() {
    let params = Params::default();
    let column = |field: &str| resolve_field(field, &params, None).unwrap().column.unwrap();

    assert_eq!(column("title"), SelectedColumn::Field("title".to_owned()));
    assert_eq!(
        column("tags[browser.name]"),
        SelectedColumn::Field("tags[browser.name]".to_owned())
    );
    assert_eq!(column("project"), SelectedColumn::Field("project.id".to_owned()));

    assert_eq!(error("foo bar"), "Invalid characters in field foo bar");
}

#[test]
fn test_non_ascii_alias() {
    let params = Params::default();
    let resolved = resolve_field("count_unique(tags[café])", &params, None).unwrap();
    assert_eq!(resolved.aggregate.unwrap().alias, "count_unique_tags_caf\\xe9");
}

#[test]
fn test_field_list_groupby() {
    let fields = ["title", "count()", "p95()", ""];
    let resolved = resolve_field_list(&fields, &Params::default(), None, Default::default()).unwrap();

    assert_eq!(
        resolved.selected_columns,
        vec![SelectedColumn::Field("title".to_owned())]
    );
    assert_eq!(resolved.groupby, resolved.selected_columns);
    assert_eq!(resolved.aggregations.len(), 2);
    assert!(resolved.functions.contains_key("count"));
    assert!(resolved.functions.contains_key("p95"));
}

#[test]
fn test_field_list_auto_fields() {
    let fields = ["title", "title"];
    let resolved = resolve_field_list(&fields, &Params::default(), None, Default::default()).unwrap();
    assert_eq!(
        resolved.selected_columns,
        vec![
            SelectedColumn::Field("title".to_owned()),
            SelectedColumn::Field("id".to_owned()),
            SelectedColumn::Field("project.id".to_owned()),
        ]
    );
    assert!(resolved.groupby.is_empty());

    let options = ResolveOptions {
        auto_fields: false,
        rollup: None,
    };
    let resolved = resolve_field_list(&fields, &Params::default(), None, options).unwrap();
    assert_eq!(resolved.selected_columns.len(), 1);
}

#[test]
fn test_field_list_rollup() {
    let options = ResolveOptions {
        auto_fields: true,
        rollup: Some(3600),
    };
    let error = resolve_field_list(&["title"], &Params::default(), None, options).unwrap_err();
    assert_eq!(
        error.to_string(),
        "You cannot use rollup without an aggregate field."
    );
}

#[test]
fn test_field_list_redundant_grouping() {
    let fields = [
        "transaction.duration",
        "p50(transaction.duration)",
        "p75(transaction.duration)",
        "avg(transaction.duration)",
    ];
    let error = resolve_field_list(&fields, &Params::default(), None, Default::default())
        .unwrap_err();

    assert!(matches!(error, SearchError::InvalidSearchQuery(_)));
    assert_eq!(
        error.to_string(),
        "A single field cannot be used both inside and outside a function in the same query. \
         To use transaction.duration you must first remove the function(s): \
         p50(transaction.duration), p75(transaction.duration) and 1 more."
    );

    // count_unique does not group redundantly
    let fields = ["user", "count_unique(user)"];
    assert!(resolve_field_list(&fields, &Params::default(), None, Default::default()).is_ok());
}

#[test]
fn test_precomputed_alias() {
    let precomputed = Aggregate {
        function: "divide".to_owned(),
        args: Expr::List(vec![Expr::string("a"), Expr::string("b")]),
        alias: "ratio".to_owned(),
    };
    let params = Params::default().with_alias("ratio()", precomputed.clone());

    let resolved = resolve_function("ratio()", &params, None).unwrap();
    assert_eq!(resolved.aggregate, Some(precomputed));
    assert_eq!(resolved.details.unwrap().function.name(), "percentage");
}

#[test]
fn test_metrics_registry() {
    let metrics = FunctionRegistry::metrics();
    let params = Params::default();

    let resolved = metrics.resolve_function("p95()", &params, None).unwrap();
    assert_eq!(
        resolved.aggregate.unwrap().args,
        Expr::string("d:transactions/duration@millisecond")
    );

    let error = metrics
        .resolve_function("p95(title)", &params, None)
        .unwrap_err();
    assert!(matches!(error, SearchError::IncompatibleMetricsQuery(_)));
}
