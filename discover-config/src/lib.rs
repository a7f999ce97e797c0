//! Configuration for the Discover CLI.
//!
//! The configuration is read from a YAML file. All sections are optional:
//!
//! ```yaml
//! logging:
//!   level: debug
//! query:
//!   organization_id: 1
//!   project_ids: [1, 2]
//!   functions_acl: [array_join]
//! store:
//!   project_thresholds:
//!     - { project_id: 1, metric: lcp, threshold: 400 }
//! ```
//!
//! Query parameters can be overridden from the command line with [`OverridableConfig`].
#![warn(missing_docs)]

mod config;

pub use crate::config::*;
