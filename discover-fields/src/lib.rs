//! Resolution of Discover fields and aggregate functions.
//!
//! Discover queries select fields as strings. A field is either a plain column such as
//! `transaction.duration`, a tag such as `tags[browser]`, a pseudo field such as `project`, or
//! a function call such as `p95(transaction.duration)` or `count_if(http.status, equals, 500)`.
//! This crate parses these fields, validates their arguments against the signature of the
//! called function, and resolves them into column expressions and aggregates.
//!
//! ```
//! use discover_fields::{Expr, Params};
//!
//! let resolved = discover_fields::resolve_field("p95()", &Params::default(), None).unwrap();
//! let aggregate = resolved.aggregate.unwrap();
//!
//! assert_eq!(aggregate.function, "quantile(0.95)");
//! assert_eq!(aggregate.args, Expr::string("transaction.duration"));
//! assert_eq!(aggregate.alias, "p95");
//! ```
//!
//! # Registries
//!
//! Function signatures are kept in a [`FunctionRegistry`]. The free functions of this crate use
//! [`FunctionRegistry::discover`], which holds the functions available on the events dataset.
//! [`FunctionRegistry::metrics`] holds the functions supported on metrics.
//!
//! # Combinators
//!
//! Some functions accept a combinator suffix that changes how their column argument is read.
//! With the `Array` combinator, `avgArray(spans_exclusive_time)` averages over the elements of an
//! array column. See [`combinator`].
#![warn(missing_docs)]

pub mod args;
pub mod columns;
pub mod combinator;
pub mod mri;
pub mod pseudo;
pub mod store;

mod error;
mod expr;
mod format;
mod function;
mod params;
mod registry;
mod resolve;
mod tokenizer;

pub use crate::error::*;
pub use crate::expr::*;
pub use crate::format::{FormatError, format_template, substitute};
pub use crate::function::*;
pub use crate::mri::{MetricResourceIdentifier, ParseMetricError};
pub use crate::params::*;
pub use crate::registry::*;
pub use crate::resolve::*;
pub use crate::store::{InMemoryStore, ProjectStore, StoreError};
pub use crate::tokenizer::parse_arguments;
