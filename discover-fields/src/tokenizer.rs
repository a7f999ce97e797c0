//! Splitting of raw function arguments.

/// Splits the raw argument text of a function call into trimmed arguments.
///
/// Arguments are separated by top-level commas. Commas are literal text inside:
///
///  - double-quoted strings, which may contain backslash-escaped quotes,
///  - tag references of the form `tags[...]`.
///
/// Unterminated quotes or tag brackets are tolerated, the remainder of the input becomes part of
/// the last argument. Empty arguments are dropped, so `count()` has no arguments.
///
/// # Example
///
/// ```
/// use discover_fields::parse_arguments;
///
/// let args = parse_arguments(r#"tags[foo,bar], "a,b", c"#);
/// assert_eq!(args, ["tags[foo,bar]", r#""a,b""#, "c"]);
/// ```
pub fn parse_arguments(columns: &str) -> Vec<String> {
    let bytes = columns.as_bytes();
    let mut args = Vec::new();

    let mut quoted = false;
    let mut in_tag = false;
    let mut escaped = false;

    let (mut i, mut j) = (0, 0);
    while j < bytes.len() {
        let c = bytes[j];

        if !in_tag && i == j && c == b'"' {
            // a quote at the beginning of an argument starts a quoted string
            quoted = true;
        } else if !quoted && c == b'[' && j >= 4 && &bytes[j - 4..j] == b"tags" {
            in_tag = true;
        } else if i == j && c == b' ' {
            // skip leading whitespace before the argument starts
            i += 1;
        } else if quoted && !escaped && c == b'\\' {
            escaped = true;
        } else if quoted && !escaped && c == b'"' {
            quoted = false;
        } else if in_tag && !escaped && c == b']' {
            in_tag = false;
        } else if quoted && escaped {
            // the escaped character is consumed verbatim
            escaped = false;
        } else if (quoted || in_tag) && c == b',' {
            // literal comma
        } else if c == b',' {
            args.push(columns[i..j].trim().to_owned());
            i = j + 1;
        }

        j += 1;
    }

    if i != j {
        args.push(columns[i..].trim().to_owned());
    }

    args.retain(|arg| !arg.is_empty());
    args
}
