//! This module implements the definition of the command line app.

use clap::{Arg, ArgAction, Command, value_parser};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Resolves Discover fields into columns and aggregates.";

fn dataset_arg() -> Arg {
    Arg::new("dataset")
        .long("dataset")
        .short('d')
        .value_name("DATASET")
        .value_parser(["discover", "metrics"])
        .default_value("discover")
        .help("The registry of functions to resolve against.")
}

pub fn make_app() -> Command {
    Command::new("discover")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .help("The path to the config file."),
        )
        .arg(
            Arg::new("organization_id")
                .value_name("ID")
                .long("organization")
                .global(true)
                .help("The organization id of queries."),
        )
        .arg(
            Arg::new("project_ids")
                .value_name("IDS")
                .long("projects")
                .global(true)
                .help("Comma-separated project ids of queries."),
        )
        .arg(
            Arg::new("team_ids")
                .value_name("IDS")
                .long("teams")
                .global(true)
                .help("Comma-separated team ids of the requesting user."),
        )
        .arg(
            Arg::new("start")
                .value_name("DATE")
                .long("start")
                .global(true)
                .help("Start of the queried time range in RFC 3339 format."),
        )
        .arg(
            Arg::new("end")
                .value_name("DATE")
                .long("end")
                .global(true)
                .help("End of the queried time range in RFC 3339 format."),
        )
        .arg(
            Arg::new("functions_acl")
                .value_name("FUNCTION")
                .long("allow")
                .global(true)
                .action(ArgAction::Append)
                .help("Grant access to a private function, such as array_join or avgArray."),
        )
        .subcommand(
            Command::new("resolve")
                .about("Resolve a list of fields")
                .after_help(
                    "This resolves all fields as the selection of a single query and prints \
                     the selected columns, aggregations, group by columns and details of all \
                     functions as JSON.",
                )
                .arg(
                    Arg::new("fields")
                        .value_name("FIELD")
                        .num_args(1..)
                        .required(true)
                        .help("The fields to resolve."),
                )
                .arg(dataset_arg())
                .arg(
                    Arg::new("no_auto_fields")
                        .long("no-auto-fields")
                        .action(ArgAction::SetTrue)
                        .help("Do not add id and project.id to queries without aggregates."),
                )
                .arg(
                    Arg::new("rollup")
                        .long("rollup")
                        .value_name("SECONDS")
                        .value_parser(value_parser!(u64))
                        .help("The rollup interval, which requires an aggregate."),
                ),
        )
        .subcommand(
            Command::new("alias")
                .about("Print the output names of fields")
                .after_help("This prints the alias of every field without validating it.")
                .arg(
                    Arg::new("fields")
                        .value_name("FIELD")
                        .num_args(1..)
                        .required(true)
                        .help("The fields to name."),
                ),
        )
        .subcommand(
            Command::new("functions")
                .about("List the functions of a registry")
                .arg(dataset_arg()),
        )
}
