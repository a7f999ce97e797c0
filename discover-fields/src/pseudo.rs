//! Pseudo fields.
//!
//! A pseudo field is a field name that does not map to a column directly. It resolves either to
//! another field name, to a fixed expression, or to an expression computed from the query
//! parameters and organization configuration.

use std::sync::LazyLock;

use crate::error::SearchError;
use crate::expr::{Call, Expr, SelectedColumn};
use crate::function::ResultType;
use crate::params::Params;
use crate::store::ProjectStore;

/// Maximum number of project and transaction thresholds compiled into a query.
pub const MAX_QUERYABLE_TRANSACTION_THRESHOLDS: usize = 500;

/// Maximum number of key transactions compiled into a query.
pub const MAX_QUERYABLE_TEAM_KEY_TRANSACTIONS: usize = 500;

/// The default apdex threshold used for projects without configuration.
const DEFAULT_PROJECT_THRESHOLD: (&str, i64) = ("duration", 300);

const PROJECT_THRESHOLD_CONFIG_ALIAS: &str = "project_threshold_config";
const PROJECT_THRESHOLD_CONFIG_INDEX_ALIAS: &str = "project_threshold_config_index";
const PROJECT_THRESHOLD_OVERRIDE_CONFIG_INDEX_ALIAS: &str = "project_threshold_override_config_index";
const TEAM_KEY_TRANSACTION_ALIAS: &str = "team_key_transaction";

type ExpressionFn = fn(&Params) -> Result<Call, SearchError>;

#[derive(Clone, Debug)]
enum PseudoExpression {
    Alias,
    Literal(Call),
    Produced(ExpressionFn),
}

/// A named field that resolves to an alias or an expression.
#[derive(Clone, Debug)]
pub struct PseudoField {
    /// The name used in queries.
    pub name: &'static str,
    /// The output name, or the field this one stands for if it has no expression.
    pub alias: &'static str,
    /// The type of the resolved values, if known.
    pub result_type: Option<ResultType>,
    expression: PseudoExpression,
}

impl PseudoField {
    fn alias(name: &'static str, alias: &'static str) -> Self {
        Self {
            name,
            alias,
            result_type: None,
            expression: PseudoExpression::Alias,
        }
    }

    fn literal(name: &'static str, expression: Call) -> Self {
        Self {
            name,
            alias: name,
            result_type: None,
            expression: PseudoExpression::Literal(expression),
        }
    }

    fn produced(name: &'static str, expression: ExpressionFn) -> Self {
        Self {
            name,
            alias: name,
            result_type: None,
            expression: PseudoExpression::Produced(expression),
        }
    }

    fn with_result_type(mut self, result_type: ResultType) -> Self {
        self.result_type = Some(result_type);
        self
    }

    /// Returns the expression of this field, computing it from the parameters if needed.
    pub fn get_expression(&self, params: &Params) -> Result<Option<Call>, SearchError> {
        match self.expression {
            PseudoExpression::Alias => Ok(None),
            PseudoExpression::Literal(ref call) => Ok(Some(call.clone())),
            PseudoExpression::Produced(produce) => produce(params).map(Some),
        }
    }

    /// Resolves the field to a selected column.
    ///
    /// Expressions are aliased with the field's alias. Fields without expression resolve to the
    /// field they stand for.
    pub fn get_field(&self, params: &Params) -> Result<SelectedColumn, SearchError> {
        Ok(match self.get_expression(params)? {
            Some(call) => SelectedColumn::Expression(call.with_alias(self.alias)),
            None => SelectedColumn::Field(self.alias.to_owned()),
        })
    }
}

fn if_positive_ratio(numerator: &str, denominator: &str) -> Call {
    Call::new(
        "if",
        vec![
            Expr::call("greater", vec![Expr::string(denominator), Expr::Int(0)]),
            Expr::call(
                "divide",
                vec![Expr::string(numerator), Expr::string(denominator)],
            ),
            Expr::Null,
        ],
    )
}

static PSEUDO_FIELDS: LazyLock<Vec<PseudoField>> = LazyLock::new(|| {
    vec![
        PseudoField::alias("project", "project.id"),
        PseudoField::alias("issue", "issue.id"),
        PseudoField::literal(
            "timestamp.to_hour",
            Call::new("toStartOfHour", vec![Expr::string("timestamp")]),
        )
        .with_result_type(ResultType::Date),
        PseudoField::literal(
            "timestamp.to_day",
            Call::new("toStartOfDay", vec![Expr::string("timestamp")]),
        )
        .with_result_type(ResultType::Date),
        PseudoField::literal("error.unhandled", Call::new("notHandled", vec![]))
            .with_result_type(ResultType::Boolean),
        PseudoField::literal(
            "user.display",
            Call::new(
                "coalesce",
                vec![
                    Expr::string("user.email"),
                    Expr::string("user.username"),
                    Expr::string("user.ip"),
                ],
            ),
        ),
        PseudoField::produced(PROJECT_THRESHOLD_CONFIG_ALIAS, |params| {
            project_threshold_config_expression(
                params.organization_id,
                &params.project_ids,
                params.store.as_deref(),
            )
        }),
        PseudoField::produced(TEAM_KEY_TRANSACTION_ALIAS, |params| {
            team_key_transaction_expression(
                params.organization_id,
                params.team_ids.as_deref(),
                &params.project_ids,
                params.store.as_deref(),
            )
        })
        .with_result_type(ResultType::Boolean),
        PseudoField::literal(
            "measurements.frames_slow_rate",
            if_positive_ratio("measurements.frames_slow", "measurements.frames_total"),
        )
        .with_result_type(ResultType::Percentage),
        PseudoField::literal(
            "measurements.frames_frozen_rate",
            if_positive_ratio("measurements.frames_frozen", "measurements.frames_total"),
        )
        .with_result_type(ResultType::Percentage),
        PseudoField::literal(
            "measurements.stall_percentage",
            if_positive_ratio("measurements.stall_total_time", "transaction.duration"),
        )
        .with_result_type(ResultType::Percentage),
    ]
});

/// Returns all pseudo fields.
pub fn pseudo_fields() -> &'static [PseudoField] {
    &PSEUDO_FIELDS
}

/// Looks up a pseudo field by name.
pub fn pseudo_field(name: &str) -> Option<&'static PseudoField> {
    pseudo_fields().iter().find(|field| field.name == name)
}

/// Converts an identifier or threshold into a signed integer expression.
fn int_value(value: u64) -> Result<Expr, SearchError> {
    i64::try_from(value)
        .map(Expr::Int)
        .map_err(|_| SearchError::invalid(format!("{value} is out of range for a query value")))
}

fn metric_tuple(metric: &str, threshold: u64) -> Result<Expr, SearchError> {
    Ok(Expr::call(
        "tuple",
        vec![Expr::String(format!("'{metric}'")), int_value(threshold)?],
    ))
}

fn default_threshold() -> Call {
    let (metric, threshold) = DEFAULT_PROJECT_THRESHOLD;
    Call::new(
        "tuple",
        vec![Expr::String(format!("'{metric}'")), Expr::Int(threshold)],
    )
}

/// Builds the expression that selects the apdex threshold of each row.
///
/// Transaction overrides take precedence over project thresholds, which take precedence over the
/// default of 300ms on the duration. The result is a tuple of metric name and threshold.
pub fn project_threshold_config_expression(
    organization_id: Option<u64>,
    project_ids: &[u64],
    store: Option<&dyn ProjectStore>,
) -> Result<Call, SearchError> {
    let Some(organization_id) = organization_id else {
        return Err(SearchError::invalid(
            "Missing necessary data for project threshold config",
        ));
    };

    let (project_configs, transaction_configs) = match store {
        Some(store) => (
            store.project_thresholds(organization_id, project_ids)?,
            store.transaction_thresholds(organization_id, project_ids)?,
        ),
        None => Default::default(),
    };

    discover_log::debug!(
        organization_id,
        project_thresholds = project_configs.len(),
        transaction_thresholds = transaction_configs.len(),
        "loaded project threshold configs"
    );

    if project_configs.len() + transaction_configs.len() > MAX_QUERYABLE_TRANSACTION_THRESHOLDS {
        return Err(SearchError::invalid(format!(
            "Exceeded {MAX_QUERYABLE_TRANSACTION_THRESHOLDS} configured transaction thresholds \
             limit, try with fewer Projects."
        )));
    }

    let project_config_query = if project_configs.is_empty() {
        default_threshold()
    } else {
        let project_ids = project_configs
            .iter()
            .map(|config| int_value(config.project_id).map(|id| Expr::call("toUInt64", vec![id])))
            .collect::<Result<Vec<_>, SearchError>>()?;
        let thresholds = project_configs
            .iter()
            .map(|config| metric_tuple(config.metric.as_str(), config.threshold))
            .collect::<Result<Vec<_>, SearchError>>()?;

        let project_index = Call::new(
            "indexOf",
            vec![Expr::call("array", project_ids), Expr::string("project_id")],
        )
        .with_alias(PROJECT_THRESHOLD_CONFIG_INDEX_ALIAS);

        Call::new(
            "if",
            vec![
                Expr::call(
                    "equals",
                    vec![Expr::Call(project_index.clone()), Expr::Int(0)],
                ),
                Expr::Call(default_threshold()),
                Expr::call(
                    "arrayElement",
                    vec![Expr::call("array", thresholds), Expr::Call(project_index)],
                ),
            ],
        )
    };

    if transaction_configs.is_empty() {
        return Ok(project_config_query);
    }

    let transactions = transaction_configs
        .iter()
        .map(|config| -> Result<Expr, SearchError> {
            Ok(Expr::call(
                "tuple",
                vec![
                    Expr::call("toUInt64", vec![int_value(config.project_id)?]),
                    Expr::String(format!("'{}'", config.transaction)),
                ],
            ))
        })
        .collect::<Result<Vec<_>, SearchError>>()?;
    let thresholds = transaction_configs
        .iter()
        .map(|config| metric_tuple(config.metric.as_str(), config.threshold))
        .collect::<Result<Vec<_>, SearchError>>()?;

    let override_index = Call::new(
        "indexOf",
        vec![
            Expr::call("array", transactions),
            Expr::call(
                "tuple",
                vec![Expr::string("project_id"), Expr::string("transaction")],
            ),
        ],
    )
    .with_alias(PROJECT_THRESHOLD_OVERRIDE_CONFIG_INDEX_ALIAS);

    Ok(Call::new(
        "if",
        vec![
            Expr::call(
                "equals",
                vec![Expr::Call(override_index.clone()), Expr::Int(0)],
            ),
            Expr::Call(project_config_query),
            Expr::call(
                "arrayElement",
                vec![Expr::call("array", thresholds), Expr::Call(override_index)],
            ),
        ],
    ))
}

/// Builds the expression that checks whether a row belongs to a key transaction of the teams.
///
/// Without any key transactions, this is a constant false.
pub fn team_key_transaction_expression(
    organization_id: Option<u64>,
    team_ids: Option<&[u64]>,
    project_ids: &[u64],
    store: Option<&dyn ProjectStore>,
) -> Result<Call, SearchError> {
    let (Some(organization_id), Some(team_ids)) = (organization_id, team_ids) else {
        return Err(SearchError::invalid(
            "Team key transactions parameters cannot be None",
        ));
    };

    let key_transactions = match store {
        Some(store) => store.team_key_transactions(
            organization_id,
            team_ids,
            project_ids,
            MAX_QUERYABLE_TEAM_KEY_TRANSACTIONS,
        )?,
        None => Vec::new(),
    };

    discover_log::debug!(
        organization_id,
        key_transactions = key_transactions.len(),
        "loaded team key transactions"
    );

    if key_transactions.is_empty() {
        return Ok(Call::new("toInt8", vec![Expr::Int(0)]));
    }

    let pairs = key_transactions
        .iter()
        .take(MAX_QUERYABLE_TEAM_KEY_TRANSACTIONS)
        .map(|(project_id, transaction)| -> Result<Expr, SearchError> {
            Ok(Expr::call(
                "tuple",
                vec![
                    int_value(*project_id)?,
                    Expr::String(format!("'{transaction}'")),
                ],
            ))
        })
        .collect::<Result<Vec<_>, SearchError>>()?;

    Ok(Call::new(
        "in",
        vec![
            Expr::call(
                "tuple",
                vec![Expr::string("project_id"), Expr::string("transaction")],
            ),
            Expr::call("tuple", pairs),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use similar_asserts::assert_eq;

    use super::*;
    use crate::store::{
        InMemoryStore, KeyTransaction, ProjectThreshold, TransactionMetric, TransactionThreshold,
    };

    #[test]
    fn test_alias_field() {
        let field = pseudo_field("project").unwrap();
        assert_eq!(
            field.get_field(&Params::default()).unwrap(),
            SelectedColumn::Field("project.id".into())
        );
    }

    #[test]
    fn test_literal_field() {
        let field = pseudo_field("user.display").unwrap();
        insta::assert_json_snapshot!(field.get_field(&Params::default()).unwrap(), @r#"
        [
          "coalesce",
          [
            "user.email",
            "user.username",
            "user.ip"
          ],
          "user.display"
        ]
        "#);
    }

    #[test]
    fn test_threshold_requires_organization() {
        let error = project_threshold_config_expression(None, &[1], None).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Missing necessary data for project threshold config"
        );
    }

    #[test]
    fn test_threshold_default() {
        let expression = project_threshold_config_expression(Some(1), &[1], None).unwrap();
        assert_eq!(expression, default_threshold());
    }

    #[test]
    fn test_threshold_configs() {
        discover_log::init_test!();

        let store = InMemoryStore {
            project_thresholds: vec![ProjectThreshold {
                project_id: 1,
                metric: TransactionMetric::Lcp,
                threshold: 400,
            }],
            transaction_thresholds: vec![TransactionThreshold {
                transaction: "/api".to_owned(),
                project_id: 1,
                metric: TransactionMetric::Duration,
                threshold: 200,
            }],
            ..Default::default()
        };

        let params = Params::new(1, [1]).with_store(Arc::new(store));
        let column = pseudo_field("project_threshold_config")
            .unwrap()
            .get_field(&params)
            .unwrap();

        insta::assert_json_snapshot!(column, @r#"
        [
          "if",
          [
            [
              "equals",
              [
                [
                  "indexOf",
                  [
                    [
                      "array",
                      [
                        [
                          "tuple",
                          [
                            [
                              "toUInt64",
                              [
                                1
                              ]
                            ],
                            "'/api'"
                          ]
                        ]
                      ]
                    ],
                    [
                      "tuple",
                      [
                        "project_id",
                        "transaction"
                      ]
                    ]
                  ],
                  "project_threshold_override_config_index"
                ],
                0
              ]
            ],
            [
              "if",
              [
                [
                  "equals",
                  [
                    [
                      "indexOf",
                      [
                        [
                          "array",
                          [
                            [
                              "toUInt64",
                              [
                                1
                              ]
                            ]
                          ]
                        ],
                        "project_id"
                      ],
                      "project_threshold_config_index"
                    ],
                    0
                  ]
                ],
                [
                  "tuple",
                  [
                    "'duration'",
                    300
                  ]
                ],
                [
                  "arrayElement",
                  [
                    [
                      "array",
                      [
                        [
                          "tuple",
                          [
                            "'lcp'",
                            400
                          ]
                        ]
                      ]
                    ],
                    [
                      "indexOf",
                      [
                        [
                          "array",
                          [
                            [
                              "toUInt64",
                              [
                                1
                              ]
                            ]
                          ]
                        ],
                        "project_id"
                      ],
                      "project_threshold_config_index"
                    ]
                  ]
                ]
              ]
            ],
            [
              "arrayElement",
              [
                [
                  "array",
                  [
                    [
                      "tuple",
                      [
                        "'duration'",
                        200
                      ]
                    ]
                  ]
                ],
                [
                  "indexOf",
                  [
                    [
                      "array",
                      [
                        [
                          "tuple",
                          [
                            [
                              "toUInt64",
                              [
                                1
                              ]
                            ],
                            "'/api'"
                          ]
                        ]
                      ]
                    ],
                    [
                      "tuple",
                      [
                        "project_id",
                        "transaction"
                      ]
                    ]
                  ],
                  "project_threshold_override_config_index"
                ]
              ]
            ]
          ],
          "project_threshold_config"
        ]
        "#);
    }

    #[test]
    fn test_threshold_limit() {
        let store = InMemoryStore {
            project_thresholds: (0..=MAX_QUERYABLE_TRANSACTION_THRESHOLDS as u64)
                .map(|project_id| ProjectThreshold {
                    project_id,
                    metric: TransactionMetric::Duration,
                    threshold: 100,
                })
                .collect(),
            ..Default::default()
        };

        let project_ids: Vec<_> = (0..=MAX_QUERYABLE_TRANSACTION_THRESHOLDS as u64).collect();
        let error =
            project_threshold_config_expression(Some(1), &project_ids, Some(&store)).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Exceeded 500 configured transaction thresholds limit, try with fewer Projects."
        );
    }

    #[test]
    fn test_threshold_out_of_range() {
        let store = InMemoryStore {
            project_thresholds: vec![ProjectThreshold {
                project_id: 1,
                metric: TransactionMetric::Duration,
                threshold: u64::MAX,
            }],
            ..Default::default()
        };

        let error = project_threshold_config_expression(Some(1), &[1], Some(&store)).unwrap_err();
        assert_eq!(
            error.to_string(),
            "18446744073709551615 is out of range for a query value"
        );

        let store = InMemoryStore {
            key_transactions: vec![KeyTransaction {
                team_id: 1,
                project_id: u64::MAX,
                transaction: "/api".to_owned(),
            }],
            ..Default::default()
        };

        let error = team_key_transaction_expression(Some(1), Some(&[1]), &[u64::MAX], Some(&store))
            .unwrap_err();
        assert!(matches!(error, SearchError::InvalidSearchQuery(_)));
    }

    #[test]
    fn test_key_transactions() {
        discover_log::init_test!();

        let error = team_key_transaction_expression(Some(1), None, &[1], None).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Team key transactions parameters cannot be None"
        );

        let expression = team_key_transaction_expression(Some(1), Some(&[1]), &[1], None).unwrap();
        assert_eq!(expression, Call::new("toInt8", vec![Expr::Int(0)]));

        let store: InMemoryStore = serde_json::from_str(
            r#"{"key_transactions": [{"team_id": 1, "project_id": 1, "transaction": "/api"}]}"#,
        )
        .unwrap();
        let expression =
            team_key_transaction_expression(Some(1), Some(&[1]), &[1], Some(&store)).unwrap();
        insta::assert_json_snapshot!(expression, @r#"
        [
          "in",
          [
            [
              "tuple",
              [
                "project_id",
                "transaction"
              ]
            ],
            [
              "tuple",
              [
                [
                  "tuple",
                  [
                    1,
                    "'/api'"
                  ]
                ]
              ]
            ]
          ]
        ]
        "#);
    }
}
