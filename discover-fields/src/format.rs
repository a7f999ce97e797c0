//! Template substitution for function signatures.
//!
//! Templates use curly-brace placeholders of the form `{name}` or `{name:spec}`. The format
//! specification is the numeric subset of the common format-spec mini-language, since the
//! backend expects the exact output of signatures such as `quantile({percentile:g})`:
//!
//!  - `g`: general format, six significant digits by default, trailing zeros removed.
//!  - `.Nf`: fixed point with `N` decimals.
//!  - `e`: scientific notation with a two-digit exponent.
//!  - `d`: integers only.
//!
//! Without a specification, values render in their shortest round-trip form. Integral floats
//! keep a trailing `.0`, and null renders as `None`.

use std::fmt::Write;

use crate::expr::{Arguments, Call, Expr};

/// An error raised when a template cannot be formatted with the given arguments.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum FormatError {
    /// The template references an argument that has not been normalized.
    #[error("unknown argument {0} in template")]
    UnknownArgument(String),

    /// The format specification is malformed or does not apply to the value.
    #[error("cannot format argument {name} with specifier {spec:?}")]
    InvalidSpec {
        /// The name of the argument.
        name: String,
        /// The format specification.
        spec: String,
    },

    /// A single `{` or `}` that is not part of a placeholder.
    #[error("unmatched brace in template {0:?}")]
    UnmatchedBrace(String),
}

/// A parsed format specification: `[.precision][type]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct FormatSpec {
    precision: Option<usize>,
    ty: Option<char>,
}

impl FormatSpec {
    fn parse(spec: &str) -> Option<Self> {
        let mut parsed = Self::default();
        let mut rest = spec;

        if let Some(stripped) = rest.strip_prefix('.') {
            let digits = stripped.len() - stripped.trim_start_matches(|c: char| c.is_ascii_digit()).len();
            parsed.precision = Some(stripped[..digits].parse().ok()?);
            rest = &stripped[digits..];
        }

        let mut chars = rest.chars();
        parsed.ty = chars.next();
        if chars.next().is_some() {
            return None;
        }

        match parsed.ty {
            None | Some('g' | 'f' | 'e' | 'd') => Some(parsed),
            Some(_) => None,
        }
    }
}

/// Formats a template string by replacing all placeholders with the named arguments.
///
/// # Example
///
/// ```
/// use discover_fields::{Arguments, Expr, format_template};
///
/// let mut arguments = Arguments::new();
/// arguments.insert("percentile", Expr::Float(0.95));
///
/// let formatted = format_template("quantile({percentile:g})", &arguments).unwrap();
/// assert_eq!(formatted, "quantile(0.95)");
/// ```
pub fn format_template(template: &str, arguments: &Arguments) -> Result<String, FormatError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        output.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            output.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            output.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            return Err(FormatError::UnmatchedBrace(template.to_owned()));
        } else {
            let end = tail
                .find('}')
                .ok_or_else(|| FormatError::UnmatchedBrace(template.to_owned()))?;
            let placeholder = &tail[1..end];
            let (name, spec) = placeholder.split_once(':').unwrap_or((placeholder, ""));

            let value = arguments
                .get(name)
                .ok_or_else(|| FormatError::UnknownArgument(name.to_owned()))?;
            write_value(&mut output, name, value, spec)?;

            rest = &tail[end + 1..];
        }
    }

    output.push_str(rest);
    Ok(output)
}

fn write_value(output: &mut String, name: &str, value: &Expr, spec: &str) -> Result<(), FormatError> {
    if spec.is_empty() {
        output.push_str(&display_value(value));
        return Ok(());
    }

    let invalid = || FormatError::InvalidSpec {
        name: name.to_owned(),
        spec: spec.to_owned(),
    };

    let parsed = FormatSpec::parse(spec).ok_or_else(invalid)?;
    let formatted = match (parsed.ty, value) {
        (Some('d'), Expr::Int(i)) => i.to_string(),
        (Some('d'), _) => return Err(invalid()),
        (ty, value) => {
            let number = value.as_f64().ok_or_else(invalid)?;
            match ty {
                Some('f') => format!("{:.*}", parsed.precision.unwrap_or(6), number),
                Some('e') => format_exponent(number, parsed.precision.unwrap_or(6)),
                _ => format_general(number, parsed.precision.unwrap_or(6)),
            }
        }
    };

    output.push_str(&formatted);
    Ok(())
}

/// Renders a value without format specification.
pub(crate) fn display_value(value: &Expr) -> String {
    match value {
        Expr::Null => "None".to_owned(),
        Expr::Bool(true) => "True".to_owned(),
        Expr::Bool(false) => "False".to_owned(),
        Expr::Int(i) => i.to_string(),
        Expr::Float(f) => float_repr(*f),
        Expr::String(s) => s.clone(),
        Expr::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S+00:00").to_string(),
        Expr::List(items) => {
            let mut output = String::from("[");
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    output.push_str(", ");
                }
                output.push_str(&display_value(item));
            }
            output.push(']');
            output
        }
        Expr::Call(call) => display_call(call),
        Expr::Arg(name) => format!("{{{name}}}"),
    }
}

fn display_call(call: &Call) -> String {
    let mut output = call.function.clone();
    output.push('(');
    for (index, arg) in call.args.iter().enumerate() {
        if index > 0 {
            output.push_str(", ");
        }
        output.push_str(&display_value(arg));
    }
    output.push(')');
    output
}

/// Renders a float in its shortest round-trip form, keeping `.0` on integral values.
pub(crate) fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    } else if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_owned();
    }

    let abs = value.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        padded_exponent(&format!("{value:e}"))
    } else if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// The `g` presentation type.
pub(crate) fn format_general(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return float_repr(value);
    } else if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_owned();
    }

    let precision = precision.max(1);
    let scientific = format!("{:.*e}", precision - 1, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or_default();

    if exponent >= -4 && exponent < precision as i32 {
        let decimals = (precision as i32 - 1 - exponent) as usize;
        strip_trailing_zeros(&format!("{value:.decimals$}")).to_owned()
    } else {
        padded_exponent(&format!("{}e{exponent}", strip_trailing_zeros(mantissa)))
    }
}

/// The `e` presentation type.
fn format_exponent(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return float_repr(value);
    }
    padded_exponent(&format!("{value:.precision$e}"))
}

/// Pads the exponent to two digits and adds its sign: `1e-5` becomes `1e-05`.
fn padded_exponent(formatted: &str) -> String {
    let Some((mantissa, exponent)) = formatted.split_once('e') else {
        return formatted.to_owned();
    };

    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };

    let mut output = String::with_capacity(formatted.len() + 2);
    write!(output, "{mantissa}e{sign}{digits:0>2}").ok();
    output
}

fn strip_trailing_zeros(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

/// Substitutes all placeholders in an expression template.
///
/// Argument placeholders are replaced with the normalized value. Function names and aliases are
/// formatted as templates. Literal strings and all other nodes are copied unchanged.
pub fn substitute(template: &Expr, arguments: &Arguments) -> Result<Expr, FormatError> {
    Ok(match template {
        Expr::Arg(name) => arguments
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| FormatError::UnknownArgument(name.clone()))?,
        Expr::List(items) => Expr::List(substitute_all(items, arguments)?),
        Expr::Call(call) => Expr::Call(substitute_call(call, arguments)?),
        other => other.clone(),
    })
}

/// Substitutes all placeholders in a function application template.
pub(crate) fn substitute_call(template: &Call, arguments: &Arguments) -> Result<Call, FormatError> {
    Ok(Call {
        function: format_template(&template.function, arguments)?,
        args: substitute_all(&template.args, arguments)?,
        alias: template
            .alias
            .as_deref()
            .map(|alias| format_template(alias, arguments))
            .transpose()?,
    })
}

fn substitute_all(items: &[Expr], arguments: &Arguments) -> Result<Vec<Expr>, FormatError> {
    items.iter().map(|item| substitute(item, arguments)).collect()
}
