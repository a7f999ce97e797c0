//! Command line interface to resolve Discover fields and functions.
//!
//! ```text
//! discover resolve 'p95()' 'count_if(transaction.duration, greater, 300)' title
//! discover functions --dataset metrics
//! ```
//!
//! Results are printed as JSON to stdout, logs go to stderr.

mod cli;
mod cliapp;
mod setup;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            discover_log::report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
