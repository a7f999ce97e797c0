//! Function signatures.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::args::FunctionArg;
use crate::columns;
use crate::combinator::{Combinator, CombinatorKind};
use crate::error::{SearchError, SignatureError};
use crate::expr::{Arguments, Call, Expr};
use crate::params::Params;

/// The kind of value a function produces.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    /// Text.
    String,
    /// A floating point number.
    Number,
    /// A whole number, such as a count.
    Integer,
    /// A ratio between zero and one.
    Percentage,
    /// A duration in milliseconds.
    Duration,
    /// A point in time.
    Date,
    /// True or false.
    Boolean,
}

impl ResultType {
    /// Returns the lowercase name of this result type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Percentage => "percentage",
            Self::Duration => "duration",
            Self::Date => "date",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives the value of a calculated argument from the normalized arguments.
pub type CalculateFn = fn(&Arguments) -> Result<Expr, SearchError>;

/// Infers the result type of a call from the signature and the normalized arguments.
pub type ResultTypeFn = fn(&Function, &Arguments) -> Option<ResultType>;

#[derive(Clone, Copy, Debug)]
enum ResultTypeResolver {
    /// The result type of the argument at the given position.
    Argument(usize),
    Custom(ResultTypeFn),
}

/// An argument derived from other arguments rather than passed by the caller.
#[derive(Clone, Copy, Debug)]
pub struct CalculatedArg {
    /// The name of the argument.
    pub name: &'static str,
    /// Computes the value from the arguments normalized so far.
    pub calculate: CalculateFn,
}

/// The template of an aggregate expression.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateTemplate {
    /// The aggregate function, formatted as a string template.
    pub function: String,
    /// The arguments, with [`Expr::Arg`] placeholders.
    pub args: Expr,
    /// A fixed alias. Generated from the function call if absent.
    pub alias: Option<String>,
}

/// What a function resolves to.
///
/// Exactly one shape is declared per function.
#[derive(Clone, Debug, PartialEq)]
pub enum FunctionShape {
    /// A per-row expression.
    ///
    /// The alias of the template is formatted with the arguments. If it is absent, the alias is
    /// generated from the function call.
    Column(Call),
    /// An aggregate expression.
    Aggregate(AggregateTemplate),
    /// An aggregate given as a single string template.
    Transform(String),
    /// One of two string templates chosen by whether an argument is null.
    ConditionalTransform {
        /// The argument that selects the template.
        condition: &'static str,
        /// The template used if the argument is not null.
        matched: String,
        /// The template used if the argument is null.
        fallback: String,
    },
}

impl FunctionShape {
    fn kind(&self) -> &'static str {
        match self {
            Self::Column(_) => "column",
            Self::Aggregate(_) => "aggregate",
            Self::Transform(_) => "transform",
            Self::ConditionalTransform { .. } => "conditional_transform",
        }
    }
}

/// The signature of a function in a registry.
///
/// Functions are created with [`Function::builder`], which validates the signature.
#[derive(Clone, Debug)]
pub struct Function {
    name: String,
    required_args: Vec<FunctionArg>,
    optional_args: Vec<FunctionArg>,
    calculated_args: Vec<CalculatedArg>,
    shape: FunctionShape,
    result_type_resolver: Option<ResultTypeResolver>,
    default_result_type: Option<ResultType>,
    redundant_grouping: bool,
    combinators: Vec<Combinator>,
    private: bool,
}

impl Function {
    /// Starts declaring a function with the given name.
    pub fn builder(name: impl Into<String>) -> FunctionBuilder {
        FunctionBuilder {
            name: name.into(),
            required_args: Vec::new(),
            optional_args: Vec::new(),
            calculated_args: Vec::new(),
            shapes: Vec::new(),
            result_type_resolver: None,
            default_result_type: None,
            redundant_grouping: false,
            combinators: Vec::new(),
            private: false,
        }
    }

    /// Returns a copy of this function registered under another name.
    pub fn alias_as(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// The name of this function.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shape of the expression this function resolves to.
    pub fn shape(&self) -> &FunctionShape {
        &self.shape
    }

    /// All positional arguments, required arguments first.
    pub fn args(&self) -> impl Iterator<Item = &FunctionArg> {
        self.required_args.iter().chain(&self.optional_args)
    }

    /// Number of required arguments.
    pub fn required_args_count(&self) -> usize {
        self.required_args.len()
    }

    /// Number of positional arguments.
    pub fn total_args_count(&self) -> usize {
        self.required_args.len() + self.optional_args.len()
    }

    /// The calculated arguments in evaluation order.
    pub fn calculated_args(&self) -> &[CalculatedArg] {
        &self.calculated_args
    }

    /// Returns `true` if selecting the aggregated column as well is redundant.
    pub fn redundant_grouping(&self) -> bool {
        self.redundant_grouping
    }

    /// Returns `true` if this function is only accessible with an explicit grant.
    pub fn is_private(&self) -> bool {
        self.private
    }

    /// Returns the combinator of the given kind, if this function supports it.
    pub fn find_combinator(&self, kind: CombinatorKind) -> Option<&Combinator> {
        self.combinators.iter().find(|c| c.kind == kind)
    }

    /// Checks whether the function is accessible with the given grants.
    ///
    /// Public functions are always accessible. A private function, or a function combined with a
    /// private combinator, must be listed in the ACL under its combined name.
    pub fn is_accessible(&self, acl: Option<&[String]>, combinator: Option<&Combinator>) -> bool {
        let combinator_private = combinator.is_some_and(|c| c.private);
        if !self.private && !combinator_private {
            return true;
        }

        let name = match combinator {
            Some(combinator) => format!("{}{}", self.name, combinator.kind),
            None => self.name.clone(),
        };

        acl.is_some_and(|acl| acl.contains(&name))
    }

    /// Validates the number of raw arguments passed to the function.
    pub fn validate_argument_count(&self, field: &str, count: usize) -> Result<(), SearchError> {
        let required = self.required_args_count();
        let total = self.total_args_count();

        if count == total {
            Ok(())
        } else if required == total {
            Err(SearchError::invalid(format!(
                "{field}: expected exactly {total} argument(s) but got {count} argument(s)"
            )))
        } else if count < required {
            Err(SearchError::invalid(format!(
                "{field}: expected at least {required} argument(s) but got {count} argument(s)"
            )))
        } else if count > total {
            Err(SearchError::invalid(format!(
                "{field}: expected at most {total} argument(s) but got {count} argument(s)"
            )))
        } else {
            Ok(())
        }
    }

    /// Validates the argument count and fills in defaults of omitted optional arguments.
    pub fn add_default_arguments(
        &self,
        field: &str,
        columns: &[String],
        params: &Params,
    ) -> Result<Vec<Option<String>>, SearchError> {
        self.validate_argument_count(field, columns.len())?;

        let mut values: Vec<_> = columns.iter().cloned().map(Some).collect();
        for argument in self.args().skip(columns.len()) {
            let value = argument
                .default_value(params)
                .map_err(|error| SearchError::for_argument(field, argument.name, error))?;
            values.push(value);
        }

        Ok(values)
    }

    /// Normalizes the raw arguments and evaluates calculated arguments.
    ///
    /// Numeric array columns are expanded with `arrayJoin`, unless a combinator already applied to
    /// the argument.
    pub fn format_as_arguments(
        &self,
        field: &str,
        columns: &[String],
        params: &Params,
        combinator: Option<&Combinator>,
    ) -> Result<Arguments, SearchError> {
        let values = self.add_default_arguments(field, columns, params)?;
        let mut arguments = Arguments::new();

        for (argument, raw) in self.args().zip(&values) {
            let raw = raw.as_deref();
            let mut value = argument
                .normalize(raw, params, combinator)
                .map_err(|error| SearchError::for_argument(field, argument.name, error))?;

            let applied = match (combinator, raw) {
                (Some(combinator), Some(raw)) => combinator.is_applicable(argument.name, raw),
                _ => false,
            };

            if let Some(combinator) = combinator.filter(|_| applied) {
                value = combinator.apply(value);
            } else if argument.expands_arrays()
                && value
                    .as_str()
                    .is_some_and(|column| columns::NUMERIC_ARRAY_COLUMNS.contains(&column))
            {
                value = Expr::call("arrayJoin", vec![value]);
            }

            arguments.insert(argument.name, value);
        }

        for calculated in &self.calculated_args {
            let value = (calculated.calculate)(&arguments)?;
            arguments.insert(calculated.name, value);
        }

        Ok(arguments)
    }

    /// Resolves the result type of this function.
    ///
    /// The declared resolver infers it from the normalized arguments. If it has no answer, the
    /// default result type applies.
    pub fn result_type(&self, arguments: Option<&Arguments>) -> Option<ResultType> {
        let inferred = match (self.result_type_resolver, arguments) {
            (Some(ResultTypeResolver::Argument(index)), Some(arguments)) => {
                self.args().nth(index).and_then(|argument| {
                    let value = arguments.get(argument.name)?;
                    argument.result_type(value)
                })
            }
            (Some(ResultTypeResolver::Custom(resolve)), Some(arguments)) => {
                resolve(self, arguments)
            }
            _ => None,
        };

        inferred.or(self.default_result_type)
    }
}

/// Declares a [`Function`].
#[derive(Debug)]
pub struct FunctionBuilder {
    name: String,
    required_args: Vec<FunctionArg>,
    optional_args: Vec<FunctionArg>,
    calculated_args: Vec<CalculatedArg>,
    shapes: Vec<FunctionShape>,
    result_type_resolver: Option<ResultTypeResolver>,
    default_result_type: Option<ResultType>,
    redundant_grouping: bool,
    combinators: Vec<Combinator>,
    private: bool,
}

impl FunctionBuilder {
    /// Appends a required argument.
    pub fn required(mut self, argument: FunctionArg) -> Self {
        self.required_args.push(argument);
        self
    }

    /// Appends an optional argument, which must have a default.
    pub fn optional(mut self, argument: FunctionArg) -> Self {
        self.optional_args.push(argument);
        self
    }

    /// Appends a calculated argument.
    pub fn calculated(mut self, name: &'static str, calculate: CalculateFn) -> Self {
        self.calculated_args.push(CalculatedArg { name, calculate });
        self
    }

    /// Resolves to a per-row expression.
    pub fn column(mut self, template: Call) -> Self {
        self.shapes.push(FunctionShape::Column(template));
        self
    }

    /// Resolves to an aggregate expression.
    pub fn aggregate(
        mut self,
        function: impl Into<String>,
        args: Expr,
        alias: Option<&str>,
    ) -> Self {
        self.shapes.push(FunctionShape::Aggregate(AggregateTemplate {
            function: function.into(),
            args,
            alias: alias.map(str::to_owned),
        }));
        self
    }

    /// Resolves to an aggregate given as a string template.
    pub fn transform(mut self, template: impl Into<String>) -> Self {
        self.shapes.push(FunctionShape::Transform(template.into()));
        self
    }

    /// Resolves to one of two string templates, depending on whether `condition` is null.
    pub fn conditional_transform(
        mut self,
        condition: &'static str,
        matched: impl Into<String>,
        fallback: impl Into<String>,
    ) -> Self {
        self.shapes.push(FunctionShape::ConditionalTransform {
            condition,
            matched: matched.into(),
            fallback: fallback.into(),
        });
        self
    }

    /// Infers the result type from the argument at the given position.
    pub fn reflective_result_type(mut self, index: usize) -> Self {
        self.result_type_resolver = Some(ResultTypeResolver::Argument(index));
        self
    }

    /// Infers the result type with a custom function.
    pub fn result_type_fn(mut self, resolve: ResultTypeFn) -> Self {
        self.result_type_resolver = Some(ResultTypeResolver::Custom(resolve));
        self
    }

    /// Sets the result type used when none can be inferred.
    pub fn result_type(mut self, result_type: ResultType) -> Self {
        self.default_result_type = Some(result_type);
        self
    }

    /// Marks selecting the aggregated column as well as redundant.
    pub fn redundant_grouping(mut self) -> Self {
        self.redundant_grouping = true;
        self
    }

    /// Adds a supported combinator.
    pub fn combinator(mut self, combinator: Combinator) -> Self {
        self.combinators.push(combinator);
        self
    }

    /// Requires an explicit grant to use this function.
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// Validates and builds the function.
    pub fn build(mut self) -> Result<Function, SignatureError> {
        let shape = match self.shapes.len() {
            0 => return Err(SignatureError::MissingShape(self.name)),
            1 => self.shapes.remove(0),
            _ => return Err(SignatureError::DuplicateShape(self.name)),
        };

        if let Some(index) = self.optional_args.iter().position(|arg| !arg.has_default()) {
            return Err(SignatureError::MissingDefault {
                function: self.name,
                index,
            });
        }

        let mut names = BTreeSet::new();
        let all_names = self
            .required_args
            .iter()
            .chain(&self.optional_args)
            .map(|arg| arg.name)
            .chain(self.calculated_args.iter().map(|arg| arg.name));

        for name in all_names {
            if !names.insert(name) {
                return Err(SignatureError::DuplicateArgument {
                    function: self.name,
                    argument: name.to_owned(),
                });
            }
        }

        if let FunctionShape::ConditionalTransform { condition, .. } = shape {
            if !names.contains(condition) {
                return Err(SignatureError::UnknownCondition {
                    function: self.name,
                    argument: condition.to_owned(),
                });
            }
        }

        discover_log::trace!(
            function = self.name.as_str(),
            shape = shape.kind(),
            "declared function"
        );

        Ok(Function {
            name: self.name,
            required_args: self.required_args,
            optional_args: self.optional_args,
            calculated_args: self.calculated_args,
            shape,
            result_type_resolver: self.result_type_resolver,
            default_result_type: self.default_result_type,
            redundant_grouping: self.redundant_grouping,
            combinators: self.combinators,
            private: self.private,
        })
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::args::{NullColumn, NumberRange, NumericColumn, StringArg};

    fn columns(values: &[&str]) -> Vec<String> {
        values.iter().map(|&v| v.to_owned()).collect()
    }

    fn percentile() -> Function {
        Function::builder("percentile")
            .required(FunctionArg::new("column", NumericColumn::new()))
            .optional(
                FunctionArg::new("percentile", NumberRange::new(Some(0.0), Some(1.0)))
                    .with_default("0.5"),
            )
            .aggregate(
                "quantile({percentile:g})",
                Expr::arg("column"),
                None,
            )
            .reflective_result_type(0)
            .result_type(ResultType::Duration)
            .build()
            .unwrap()
    }

    #[test]
    fn test_missing_shape() {
        let error = Function::builder("nothing").build().unwrap_err();
        assert_eq!(error, SignatureError::MissingShape("nothing".into()));
    }

    #[test]
    fn test_duplicate_shape() {
        let error = Function::builder("twice")
            .transform("count()")
            .transform("count()")
            .build()
            .unwrap_err();
        assert_eq!(error, SignatureError::DuplicateShape("twice".into()));
    }

    #[test]
    fn test_optional_without_default() {
        let error = Function::builder("f")
            .optional(FunctionArg::new("value", StringArg::new()))
            .transform("f({value})")
            .build()
            .unwrap_err();
        assert!(matches!(error, SignatureError::MissingDefault { index: 0, .. }));
    }

    #[test]
    fn test_duplicate_argument() {
        let error = Function::builder("f")
            .required(FunctionArg::new("column", NumericColumn::new()))
            .optional(FunctionArg::new("column", NullColumn))
            .transform("f({column})")
            .build()
            .unwrap_err();
        assert!(matches!(error, SignatureError::DuplicateArgument { .. }));
    }

    #[test]
    fn test_unknown_condition() {
        let error = Function::builder("f")
            .conditional_transform("missing", "a", "b")
            .build()
            .unwrap_err();
        assert!(matches!(error, SignatureError::UnknownCondition { .. }));
    }

    #[test]
    fn test_argument_count() {
        let function = percentile();
        let params = Params::default();

        let error = function
            .add_default_arguments("percentile()", &[], &params)
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "percentile(): expected at least 1 argument(s) but got 0 argument(s)"
        );

        let error = function
            .add_default_arguments("percentile(a,b,c)", &columns(&["a", "b", "c"]), &params)
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "percentile(a,b,c): expected at most 2 argument(s) but got 3 argument(s)"
        );

        let values = function
            .add_default_arguments("percentile(a)", &columns(&["a"]), &params)
            .unwrap();
        assert_eq!(values, [Some("a".to_owned()), Some("0.5".to_owned())]);
    }

    #[test]
    fn test_exact_argument_count() {
        let function = Function::builder("f")
            .required(FunctionArg::new("column", NumericColumn::new()))
            .transform("f({column})")
            .build()
            .unwrap();

        let error = function
            .validate_argument_count("f()", 0)
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "f(): expected exactly 1 argument(s) but got 0 argument(s)"
        );
    }

    #[test]
    fn test_format_as_arguments() {
        let function = percentile();
        let arguments = function
            .format_as_arguments(
                "percentile(measurements.lcp, 0.75)",
                &columns(&["measurements.lcp", "0.75"]),
                &Params::default(),
                None,
            )
            .unwrap();

        assert_eq!(arguments["column"], Expr::string("measurements.lcp"));
        assert_eq!(arguments["percentile"], Expr::Float(0.75));
        assert_eq!(
            function.result_type(Some(&arguments)),
            Some(ResultType::Duration)
        );
    }

    #[test]
    fn test_result_type_fn() {
        fn integral_percentile(_: &Function, arguments: &Arguments) -> Option<ResultType> {
            match arguments.get("percentile") {
                Some(Expr::Float(value)) if *value == 0.5 => Some(ResultType::Integer),
                _ => None,
            }
        }

        let function = Function::builder("median_or_number")
            .required(FunctionArg::new(
                "percentile",
                NumberRange::new(Some(0.0), Some(1.0)),
            ))
            .aggregate("quantile({percentile:g})", Expr::Null, None)
            .result_type_fn(integral_percentile)
            .result_type(ResultType::Number)
            .build()
            .unwrap();

        let resolve = |value: &str| {
            let arguments = function
                .format_as_arguments("f", &columns(&[value]), &Params::default(), None)
                .unwrap();
            function.result_type(Some(&arguments))
        };

        assert_eq!(resolve("0.5"), Some(ResultType::Integer));
        assert_eq!(resolve("0.9"), Some(ResultType::Number));
        assert_eq!(function.result_type(None), Some(ResultType::Number));
    }

    #[test]
    fn test_combinator_expands_array() {
        let function = percentile();
        let combinator = Combinator::array("column", columns::NUMERIC_ARRAY_COLUMNS);
        let arguments = function
            .format_as_arguments(
                "percentileArray(spans_exclusive_time, 0.5)",
                &columns(&["spans_exclusive_time", "0.5"]),
                &Params::default(),
                Some(&combinator),
            )
            .unwrap();

        assert_eq!(
            arguments["column"],
            Expr::call("arrayJoin", vec![Expr::string("spans_exclusive_time")])
        );
    }

    #[test]
    fn test_accessible() {
        let function = percentile();
        let combinator = Combinator::array("column", columns::NUMERIC_ARRAY_COLUMNS);
        let acl = vec!["percentileArray".to_owned()];

        assert!(function.is_accessible(None, None));
        assert!(!function.is_accessible(None, Some(&combinator)));
        assert!(function.is_accessible(Some(acl.as_slice()), Some(&combinator)));
    }

    #[test]
    fn test_alias_as() {
        let function = percentile().alias_as("pct");
        assert_eq!(function.name(), "pct");
        assert_eq!(function.total_args_count(), 2);
    }
}
