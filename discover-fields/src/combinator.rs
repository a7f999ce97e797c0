//! Function name suffixes that modify a function.
//!
//! A combinator is appended to the name of a base function, such as `avgArray`. The base function
//! resolves as usual, but the combinator relaxes the validation of its target argument and
//! post-processes the normalized value.

use std::fmt;

use crate::expr::Expr;

/// The kind of a combinator, which is also its function name suffix.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CombinatorKind {
    /// Aggregates all elements of an array column.
    Array,
}

impl CombinatorKind {
    /// All combinator kinds.
    pub const ALL: &'static [Self] = &[Self::Array];

    /// Returns the suffix that selects this combinator.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Array => "Array",
        }
    }

    /// Splits a called function name into the base name and a combinator suffix.
    ///
    /// Returns `None` if the name does not end in a known suffix or consists of the suffix only.
    pub fn split(name: &str) -> Option<(&str, Self)> {
        Self::ALL.iter().find_map(|&kind| {
            name.strip_suffix(kind.suffix())
                .filter(|base| !base.is_empty())
                .map(|base| (base, kind))
        })
    }
}

impl fmt::Display for CombinatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A combinator attached to a function.
#[derive(Clone, Debug, PartialEq)]
pub struct Combinator {
    /// The kind of this combinator.
    pub kind: CombinatorKind,
    /// The name of the argument this combinator applies to.
    pub column_name: &'static str,
    /// The columns accepted for that argument in addition to the base function's columns.
    pub array_columns: &'static [&'static str],
    /// Whether the combined function requires an explicit grant.
    pub private: bool,
}

impl Combinator {
    /// Creates a private `Array` combinator for the given argument.
    pub fn array(column_name: &'static str, array_columns: &'static [&'static str]) -> Self {
        Self {
            kind: CombinatorKind::Array,
            column_name,
            array_columns,
            private: true,
        }
    }

    /// Returns `true` if the combinator accepts this raw column.
    ///
    /// Argument descriptors use this to permit columns they would otherwise reject.
    pub fn validate_argument(&self, column: &str) -> bool {
        self.array_columns.contains(&column)
    }

    /// Returns `true` if the combinator post-processes the given argument with this raw value.
    pub fn is_applicable(&self, argument: &str, column: &str) -> bool {
        argument == self.column_name && self.validate_argument(column)
    }

    /// Post-processes the normalized value of the target argument.
    pub fn apply(&self, value: Expr) -> Expr {
        match self.kind {
            CombinatorKind::Array => Expr::call("arrayJoin", vec![value]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split() {
        assert_eq!(
            CombinatorKind::split("avgArray"),
            Some(("avg", CombinatorKind::Array))
        );
        assert_eq!(CombinatorKind::split("Array"), None);
        assert_eq!(CombinatorKind::split("avg"), None);
    }

    #[test]
    fn test_array_combinator() {
        let combinator = Combinator::array("column", &["spans_exclusive_time"]);
        assert!(combinator.private);
        assert!(combinator.is_applicable("column", "spans_exclusive_time"));
        assert!(!combinator.is_applicable("column", "transaction.duration"));
        assert!(!combinator.is_applicable("other", "spans_exclusive_time"));

        let applied = combinator.apply(Expr::string("spans_exclusive_time"));
        assert_eq!(
            applied,
            Expr::call("arrayJoin", vec![Expr::string("spans_exclusive_time")])
        );
    }
}
