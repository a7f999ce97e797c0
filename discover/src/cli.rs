use anyhow::{Context, Result};
use clap::ArgMatches;
use discover_config::{Config, OverridableConfig};
use discover_fields::combinator::CombinatorKind;
use discover_fields::{Function, FunctionRegistry, ResolveOptions, ResultType};
use serde::Serialize;

use crate::{cliapp, setup};

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = cliapp::make_app();
    let matches = app.get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            Config::from_path(path).with_context(|| format!("failed to load config {path}"))?
        }
        None => Config::default(),
    };
    config.apply_override(extract_overrides(&matches))?;

    setup::init_logging(&config);
    setup::dump_query_infos(&config);

    match matches.subcommand() {
        Some(("resolve", matches)) => resolve(&config, matches),
        Some(("alias", matches)) => alias(matches),
        Some(("functions", matches)) => list_functions(matches),
        _ => unreachable!(),
    }
}

fn extract_overrides(matches: &ArgMatches) -> OverridableConfig {
    OverridableConfig {
        organization_id: matches.get_one::<String>("organization_id").cloned(),
        project_ids: matches.get_one::<String>("project_ids").cloned(),
        team_ids: matches.get_one::<String>("team_ids").cloned(),
        start: matches.get_one::<String>("start").cloned(),
        end: matches.get_one::<String>("end").cloned(),
        functions_acl: matches
            .get_many::<String>("functions_acl")
            .map(|values| values.cloned().collect())
            .unwrap_or_default(),
    }
}

fn registry(matches: &ArgMatches) -> &'static FunctionRegistry {
    match matches.get_one::<String>("dataset").map(String::as_str) {
        Some("metrics") => FunctionRegistry::metrics(),
        _ => FunctionRegistry::discover(),
    }
}

fn fields(matches: &ArgMatches) -> Vec<String> {
    matches
        .get_many::<String>("fields")
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

#[allow(clippy::print_stdout)]
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{json}");
    Ok(())
}

fn resolve(config: &Config, matches: &ArgMatches) -> Result<()> {
    let options = ResolveOptions {
        auto_fields: !matches.get_flag("no_auto_fields"),
        rollup: matches.get_one::<u64>("rollup").copied(),
    };

    let params = config.params();
    let resolved = registry(matches).resolve_field_list(
        &fields(matches),
        &params,
        config.functions_acl(),
        options,
    )?;

    print_json(&resolved)
}

fn alias(matches: &ArgMatches) -> Result<()> {
    let aliases: Vec<_> = fields(matches)
        .iter()
        .map(|field| discover_fields::get_function_alias(field))
        .collect();

    print_json(&aliases)
}

/// Summary of a function signature for listings.
#[derive(Serialize)]
struct FunctionSummary<'a> {
    name: &'a str,
    arguments: Vec<&'a str>,
    required_arguments: usize,
    result_type: Option<ResultType>,
    combinators: Vec<&'static str>,
    redundant_grouping: bool,
    private: bool,
}

impl<'a> From<&'a Function> for FunctionSummary<'a> {
    fn from(function: &'a Function) -> Self {
        Self {
            name: function.name(),
            arguments: function.args().map(|arg| arg.name).collect(),
            required_arguments: function.required_args_count(),
            result_type: function.result_type(None),
            combinators: CombinatorKind::ALL
                .iter()
                .filter(|&&kind| function.find_combinator(kind).is_some())
                .map(CombinatorKind::suffix)
                .collect(),
            redundant_grouping: function.redundant_grouping(),
            private: function.is_private(),
        }
    }
}

fn list_functions(matches: &ArgMatches) -> Result<()> {
    let functions: Vec<_> = registry(matches)
        .iter()
        .map(|function| FunctionSummary::from(function.as_ref()))
        .collect();

    print_json(&functions)
}
