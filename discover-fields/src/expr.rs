//! Expression trees handed to the analytical backend.
//!
//! The backend accepts expressions in a nested list format. A function application is written as
//! `[name, [args...]]`, optionally followed by an alias, and selected aggregates are always
//! written as `[name, args, alias]` where `args` is `null`, a single value or a list of values.
//!
//! The same types double as templates in function signatures: [`Expr::Arg`] is a placeholder for
//! a normalized argument and strings are format templates (see [`crate::format`]).

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeSeq, Serializer};

/// Normalized function arguments keyed by argument name.
pub type Arguments = BTreeMap<&'static str, Expr>;

/// A node in an expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// The absence of a value.
    Null,
    /// A boolean literal.
    Bool(bool),
    /// An integer literal.
    Int(i64),
    /// A floating point literal.
    Float(f64),
    /// A column name or a literal.
    ///
    /// String literals are wrapped in single quotes, column names are not.
    String(String),
    /// A point in time.
    Timestamp(DateTime<Utc>),
    /// A positional list of expressions.
    List(Vec<Expr>),
    /// A function application.
    Call(Call),
    /// Placeholder for the normalized value of the named argument.
    ///
    /// Only valid within templates. Resolution replaces all placeholders.
    Arg(String),
}

impl Expr {
    /// Creates a string expression.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Creates a function application without alias.
    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call(Call::new(function, args))
    }

    /// Creates an argument placeholder.
    pub fn arg(name: impl Into<String>) -> Self {
        Self::Arg(name.into())
    }

    /// Returns `true` if this is [`Expr::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the contents of a string expression.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric value of an integer or float expression.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Int(i) => Some(i as f64),
            Self::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Returns `true` if this expression is a nested expression rather than a scalar.
    ///
    /// A nested expression in the position of a single argument has to be wrapped in a list, so
    /// the backend does not interpret it as a list of arguments.
    pub fn is_nested(&self) -> bool {
        matches!(self, Self::Call(_) | Self::List(_))
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Call> for Expr {
    fn from(value: Call) -> Self {
        Self::Call(value)
    }
}

impl<T: Into<Expr>> From<Option<T>> for Expr {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl Serialize for Expr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::Timestamp(ts) => {
                serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            Self::List(items) => serializer.collect_seq(items),
            Self::Call(call) => call.serialize(serializer),
            Self::Arg(name) => serializer.serialize_str(&format!("{{{name}}}")),
        }
    }
}

/// A function application within an expression tree.
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    /// The name of the backend function.
    pub function: String,
    /// Positional arguments.
    pub args: Vec<Expr>,
    /// Output name of this expression, if it is selected.
    pub alias: Option<String>,
}

impl Call {
    /// Creates a new function application without alias.
    pub fn new(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            function: function.into(),
            args,
            alias: None,
        }
    }

    /// Sets the output name of this expression.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl Serialize for Call {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = if self.alias.is_some() { 3 } else { 2 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.function)?;
        seq.serialize_element(&self.args)?;
        if let Some(ref alias) = self.alias {
            seq.serialize_element(alias)?;
        }
        seq.end()
    }
}

/// A selected aggregate, or a transform evaluated as an aggregate.
///
/// Transforms produce a literal expression string in `function` with [`Expr::Null`] arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    /// The aggregate function, possibly parameterized such as `quantile(0.95)`.
    pub function: String,
    /// `Null`, a single argument, or a [`Expr::List`] of arguments.
    pub args: Expr,
    /// The output name of the aggregate.
    pub alias: String,
}

impl Serialize for Aggregate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.function)?;
        seq.serialize_element(&self.args)?;
        seq.serialize_element(&self.alias)?;
        seq.end()
    }
}

/// A selected column: either a plain field or a computed expression.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectedColumn {
    /// A plain column or tag reference, passed through unchanged.
    Field(String),
    /// A computed per-row expression with an alias.
    Expression(Call),
}

impl SelectedColumn {
    /// Returns the name of this column in the result set.
    pub fn name(&self) -> &str {
        match self {
            Self::Field(field) => field,
            Self::Expression(call) => call.alias.as_deref().unwrap_or(&call.function),
        }
    }
}

impl Serialize for SelectedColumn {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Field(field) => serializer.serialize_str(field),
            Self::Expression(call) => call.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_aggregate() {
        let aggregate = Aggregate {
            function: "count".to_owned(),
            args: Expr::Null,
            alias: "count".to_owned(),
        };

        insta::assert_json_snapshot!(aggregate, @r#"
        [
          "count",
          null,
          "count"
        ]
        "#);
    }

    #[test]
    fn test_serialize_nested_call() {
        let call = Call::new(
            "countIf",
            vec![Expr::call(
                "greater",
                vec![Expr::string("transaction.duration"), Expr::Float(300.0)],
            )],
        )
        .with_alias("slow");

        let json = serde_json::to_string(&call).unwrap();
        assert_eq!(
            json,
            r#"["countIf",[["greater",["transaction.duration",300.0]]],"slow"]"#
        );
    }

    #[test]
    fn test_selected_column_name() {
        let column = SelectedColumn::Expression(
            Call::new("coalesce", vec![Expr::string("user.email")]).with_alias("user.display"),
        );
        assert_eq!(column.name(), "user.display");
        assert_eq!(SelectedColumn::Field("title".into()).name(), "title");
    }

    #[test]
    fn test_option_into_expr() {
        assert_eq!(Expr::from(None::<f64>), Expr::Null);
        assert_eq!(Expr::from(Some(1.5)), Expr::Float(1.5));
    }
}
