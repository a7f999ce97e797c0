//! Resolution of fields and function calls.
//!
//! A field in a query is either a function call of the form `name(arg, ...) [as alias]`, a
//! [pseudo field](crate::pseudo), or a plain column or tag reference. Function calls resolve to
//! a per-row column expression or to an aggregate, both with an output alias.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use itertools::Itertools;
use regex::Regex;
use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};

use crate::columns;
use crate::error::SearchError;
use crate::expr::{Aggregate, Arguments, Expr, SelectedColumn};
use crate::format::{format_template, substitute, substitute_call, FormatError};
use crate::function::{Function, FunctionShape, ResultType};
use crate::params::Params;
use crate::pseudo;
use crate::registry::FunctionRegistry;
use crate::tokenizer::parse_arguments;

/// Pseudo field that is grouped by its expression rather than its alias.
const USER_DISPLAY_ALIAS: &str = "user.display";

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<function>[^(]+)\((?P<columns>.*)\)(?: (?:as|AS) (?P<alias>\S+))?$").unwrap()
});

static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W").unwrap());

/// A function call parsed from a field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedFunction {
    /// The called name, including combinator suffixes.
    pub name: String,
    /// The raw arguments, split and trimmed.
    pub arguments: Vec<String>,
    /// The explicit alias given with `as`.
    pub alias: Option<String>,
}

fn match_function(field: &str) -> Option<ParsedFunction> {
    let captures = FUNCTION_RE.captures(field)?;
    let name = captures.name("function")?.as_str();
    let columns = captures.name("columns").map_or("", |m| m.as_str());

    Some(ParsedFunction {
        name: name.to_owned(),
        arguments: parse_arguments(columns),
        alias: captures.name("alias").map(|m| m.as_str().to_owned()),
    })
}

/// Returns `true` if the field has the syntax of a function call.
pub fn is_function(field: &str) -> bool {
    FUNCTION_RE.is_match(field)
}

/// Escapes non-ASCII characters with backslash escapes of their code point.
fn escape_non_ascii(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        let code = u32::from(c);
        if c.is_ascii() {
            escaped.push(c);
        } else if code <= 0xff {
            escaped.push_str(&format!("\\x{code:02x}"));
        } else if code <= 0xffff {
            escaped.push_str(&format!("\\u{code:04x}"));
        } else {
            escaped.push_str(&format!("\\U{code:08x}"));
        }
    }
    escaped
}

/// Generates the alias of a function call from its name and raw arguments.
///
/// Non-word characters in the arguments are replaced by underscores, remaining non-ASCII
/// characters are escaped, and trailing underscores are removed.
///
/// # Example
///
/// ```
/// use discover_fields::get_function_alias_with_columns;
///
/// let alias = get_function_alias_with_columns("p95", &["transaction.duration"]);
/// assert_eq!(alias, "p95_transaction_duration");
/// ```
pub fn get_function_alias_with_columns<S: AsRef<str>>(name: &str, columns: &[S]) -> String {
    let joined = columns.iter().map(AsRef::as_ref).join("_");
    let sanitized = NON_WORD_RE.replace_all(&joined, "_");
    let alias = format!("{name}_{}", escape_non_ascii(&sanitized));
    alias.trim_end_matches('_').to_owned()
}

/// Returns the output name of a field without resolving it.
///
/// Plain fields are their own alias. Function calls use their explicit alias or a generated one.
pub fn get_function_alias(field: &str) -> String {
    match match_function(field) {
        Some(ParsedFunction {
            alias: Some(alias), ..
        }) => alias,
        Some(parsed) => get_function_alias_with_columns(&parsed.name, &parsed.arguments),
        None => field.to_owned(),
    }
}

/// A resolved function call with its normalized arguments.
#[derive(Clone, Debug)]
pub struct FunctionDetails {
    /// The field the function was resolved from.
    pub field: String,
    /// The signature of the called function.
    pub function: Arc<Function>,
    /// Normalized and calculated arguments.
    pub arguments: Arguments,
}

impl FunctionDetails {
    /// Resolves the result type of the function call.
    pub fn result_type(&self) -> Option<ResultType> {
        self.function.result_type(Some(&self.arguments))
    }
}

impl Serialize for FunctionDetails {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("FunctionDetails", 4)?;
        state.serialize_field("field", &self.field)?;
        state.serialize_field("function", self.function.name())?;
        state.serialize_field("arguments", &self.arguments)?;
        state.serialize_field("result_type", &self.result_type())?;
        state.end()
    }
}

/// The result of resolving a single field.
///
/// Exactly one of `column` and `aggregate` is set. `details` is set for function calls.
#[derive(Clone, Debug, Serialize)]
pub struct ResolvedFunction {
    /// The function call this was resolved from.
    pub details: Option<FunctionDetails>,
    /// A selected column or per-row expression.
    pub column: Option<SelectedColumn>,
    /// An aggregate expression.
    pub aggregate: Option<Aggregate>,
}

/// Options for [`FunctionRegistry::resolve_field_list`].
#[derive(Clone, Copy, Debug)]
pub struct ResolveOptions {
    /// Adds `id` and `project.id` to queries without aggregates.
    pub auto_fields: bool,
    /// The rollup interval in seconds, which requires aggregates.
    pub rollup: Option<u64>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            auto_fields: true,
            rollup: None,
        }
    }
}

/// The resolved selection of a query.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ResolvedFields {
    /// Selected columns and per-row expressions.
    pub selected_columns: Vec<SelectedColumn>,
    /// Selected aggregates.
    pub aggregations: Vec<Aggregate>,
    /// Columns to group by, if there are aggregates.
    pub groupby: Vec<SelectedColumn>,
    /// Details of all function calls by output alias.
    pub functions: BTreeMap<String, FunctionDetails>,
}

fn template_error(field: &str) -> impl Fn(FormatError) -> SearchError + '_ {
    move |error| SearchError::for_template(field, error)
}

impl FunctionRegistry {
    /// Parses a function call from a field.
    ///
    /// Fails if the field is not a function call or the function is not in this registry.
    pub fn parse_function(&self, field: &str) -> Result<ParsedFunction, SearchError> {
        let invalid = || SearchError::invalid(format!("{field} is not a valid function"));
        let parsed = match_function(field).ok_or_else(invalid)?;
        self.lookup(&parsed.name).map_err(|_| invalid())?;
        Ok(parsed)
    }

    /// Resolves a function call into a column expression or an aggregate.
    ///
    /// Access to private functions requires the called name in the `acl`.
    pub fn resolve_function(
        &self,
        field: &str,
        params: &Params,
        acl: Option<&[String]>,
    ) -> Result<ResolvedFunction, SearchError> {
        if let Some(precomputed) = params.aliases.get(field) {
            let function = self
                .get("percentage")
                .or_else(|| Self::discover().get("percentage"))
                .ok_or_else(|| SearchError::invalid(format!("{field} is not a valid function")))?;

            return Ok(ResolvedFunction {
                details: Some(FunctionDetails {
                    field: field.to_owned(),
                    function: Arc::clone(function),
                    arguments: Arguments::new(),
                }),
                column: None,
                aggregate: Some(precomputed.aggregate.clone()),
            });
        }

        let parsed = match_function(field)
            .ok_or_else(|| SearchError::invalid(format!("{field} is not a valid function")))?;
        let (function, combinator) = self.lookup(&parsed.name)?;

        if !function.is_accessible(acl, combinator) {
            return Err(SearchError::invalid(format!(
                "{}: no access to private function",
                function.name()
            )));
        }

        let arguments = function.format_as_arguments(field, &parsed.arguments, params, combinator)?;
        let alias = match parsed.alias {
            Some(ref alias) => alias.clone(),
            None => get_function_alias_with_columns(&parsed.name, &parsed.arguments),
        };

        let mut column = None;
        let mut aggregate = None;

        match function.shape() {
            FunctionShape::Transform(template) => {
                aggregate = Some(Aggregate {
                    function: format_template(template, &arguments).map_err(template_error(field))?,
                    args: Expr::Null,
                    alias,
                });
            }
            FunctionShape::ConditionalTransform {
                condition,
                matched,
                fallback,
            } => {
                let is_matched = arguments.get(condition).is_some_and(|value| !value.is_null());
                let template = if is_matched { matched } else { fallback };
                aggregate = Some(Aggregate {
                    function: format_template(template, &arguments).map_err(template_error(field))?,
                    args: Expr::Null,
                    alias,
                });
            }
            FunctionShape::Aggregate(template) => {
                let args = match template.args {
                    // a nested expression in a single argument must not be read as a list of
                    // arguments
                    Expr::Arg(ref name) => match arguments.get(name.as_str()) {
                        Some(value) if value.is_nested() => Expr::List(vec![value.clone()]),
                        Some(value) => value.clone(),
                        None => {
                            return Err(SearchError::for_template(
                                field,
                                FormatError::UnknownArgument(name.clone()),
                            ));
                        }
                    },
                    ref args => substitute(args, &arguments).map_err(template_error(field))?,
                };

                let alias = match parsed.alias {
                    Some(_) => alias,
                    None => template.alias.clone().unwrap_or(alias),
                };

                aggregate = Some(Aggregate {
                    function: format_template(&template.function, &arguments)
                        .map_err(template_error(field))?,
                    args,
                    alias,
                });
            }
            FunctionShape::Column(template) => {
                let mut call = substitute_call(template, &arguments).map_err(template_error(field))?;
                call.alias = match (parsed.alias, call.alias) {
                    (Some(explicit), _) => Some(explicit),
                    (None, Some(formatted)) => Some(formatted),
                    (None, None) => Some(alias),
                };
                column = Some(SelectedColumn::Expression(call));
            }
        }

        discover_log::trace!(
            field,
            function = function.name(),
            combinator = ?combinator.map(|c| c.kind),
            "resolved function"
        );

        Ok(ResolvedFunction {
            details: Some(FunctionDetails {
                field: field.to_owned(),
                function: Arc::clone(function),
                arguments,
            }),
            column,
            aggregate,
        })
    }

    /// Resolves a function call, a pseudo field, or a plain column reference.
    pub fn resolve_field(
        &self,
        field: &str,
        params: &Params,
        acl: Option<&[String]>,
    ) -> Result<ResolvedFunction, SearchError> {
        if is_function(field) {
            return self.resolve_function(field, params, acl);
        }

        let column = if let Some(pseudo) = pseudo::pseudo_field(field) {
            pseudo.get_field(params)?
        } else if columns::is_valid_field(
            columns::typed_tag_key(field)
                .or_else(|| columns::tag_key(field))
                .unwrap_or(field),
        ) {
            SelectedColumn::Field(field.to_owned())
        } else {
            return Err(SearchError::invalid(format!(
                "Invalid characters in field {field}"
            )));
        };

        Ok(ResolvedFunction {
            details: None,
            column: Some(column),
            aggregate: None,
        })
    }

    /// Resolves the selected fields of a query.
    ///
    /// Blank fields are skipped. When the query aggregates, all selected columns become
    /// group-by columns. A column aggregated by a function with redundant grouping cannot be
    /// selected as well.
    pub fn resolve_field_list<S: AsRef<str>>(
        &self,
        fields: &[S],
        params: &Params,
        acl: Option<&[String]>,
        options: ResolveOptions,
    ) -> Result<ResolvedFields, SearchError> {
        let mut resolved = ResolvedFields::default();
        let mut aggregate_fields = BTreeMap::<String, Vec<String>>::new();

        for field in fields {
            let field = field.as_ref();
            if field.trim().is_empty() {
                continue;
            }

            let function = self.resolve_field(field, params, acl)?;
            if let Some(column) = function.column {
                if resolved.selected_columns.contains(&column) {
                    continue;
                }
                if let (Some(details), SelectedColumn::Expression(_)) = (function.details, &column)
                {
                    resolved.functions.insert(column.name().to_owned(), details);
                }
                resolved.selected_columns.push(column);
            } else if let Some(aggregate) = function.aggregate {
                if let Some(details) = function.details {
                    if let Some(argument) = aggregate.args.as_str() {
                        if details.function.redundant_grouping() {
                            let functions = aggregate_fields.entry(argument.to_owned()).or_default();
                            if !functions.iter().any(|f| f == field) {
                                functions.push(field.to_owned());
                            }
                        }
                    }
                    resolved.functions.insert(aggregate.alias.clone(), details);
                }
                resolved.aggregations.push(aggregate);
            }
        }

        if options.rollup.is_none() && options.auto_fields && resolved.aggregations.is_empty() {
            for auto_field in ["id", "project.id"] {
                let column = SelectedColumn::Field(auto_field.to_owned());
                if !resolved.selected_columns.contains(&column) {
                    resolved.selected_columns.push(column);
                }
            }
        }

        if options.rollup.is_some() && resolved.aggregations.is_empty() {
            return Err(SearchError::invalid(
                "You cannot use rollup without an aggregate field.",
            ));
        }

        if !resolved.aggregations.is_empty() {
            for column in &resolved.selected_columns {
                let groupby = match column {
                    SelectedColumn::Expression(call)
                        if call.alias.as_deref() == Some(USER_DISPLAY_ALIAS) =>
                    {
                        column.clone()
                    }
                    SelectedColumn::Expression(_) => SelectedColumn::Field(column.name().to_owned()),
                    SelectedColumn::Field(name) => {
                        if let Some(conflicts) = aggregate_fields.get(name) {
                            return Err(redundant_grouping_error(name, conflicts));
                        }
                        column.clone()
                    }
                };
                resolved.groupby.push(groupby);
            }
        }

        Ok(resolved)
    }
}

fn redundant_grouping_error(field: &str, conflicts: &[String]) -> SearchError {
    let mut functions = conflicts.iter().take(2).join(", ");
    if conflicts.len() > 2 {
        functions.push_str(&format!(" and {} more.", conflicts.len() - 2));
    }

    SearchError::invalid(format!(
        "A single field cannot be used both inside and outside a function in the same query. \
         To use {field} you must first remove the function(s): {functions}"
    ))
}

/// Parses a function call from a field using the Discover registry.
pub fn parse_function(field: &str) -> Result<ParsedFunction, SearchError> {
    FunctionRegistry::discover().parse_function(field)
}

/// Resolves a function call using the Discover registry.
///
/// See [`FunctionRegistry::resolve_function`].
pub fn resolve_function(
    field: &str,
    params: &Params,
    acl: Option<&[String]>,
) -> Result<ResolvedFunction, SearchError> {
    FunctionRegistry::discover().resolve_function(field, params, acl)
}

/// Resolves a field using the Discover registry.
///
/// See [`FunctionRegistry::resolve_field`].
pub fn resolve_field(
    field: &str,
    params: &Params,
    acl: Option<&[String]>,
) -> Result<ResolvedFunction, SearchError> {
    FunctionRegistry::discover().resolve_field(field, params, acl)
}

/// Resolves the selected fields of a query using the Discover registry.
///
/// See [`FunctionRegistry::resolve_field_list`].
pub fn resolve_field_list<S: AsRef<str>>(
    fields: &[S],
    params: &Params,
    acl: Option<&[String]>,
    options: ResolveOptions,
) -> Result<ResolvedFields, SearchError> {
    FunctionRegistry::discover().resolve_field_list(fields, params, acl, options)
}
