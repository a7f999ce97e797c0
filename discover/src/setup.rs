use discover_config::Config;

/// Initialize the logging system.
pub fn init_logging(config: &Config) {
    discover_log::init(&config.logging);
}

/// Print the query parameters to the log.
pub fn dump_query_infos(config: &Config) {
    let params = &config.query.params;

    match params.organization_id {
        Some(id) => discover_log::debug!("  organization id: {id}"),
        None => discover_log::debug!("  organization id: -"),
    }
    discover_log::debug!("  project ids: {:?}", params.project_ids);

    if let (Some(start), Some(end)) = (params.start, params.end) {
        discover_log::debug!("  time range: {start} to {end}");
    }

    if let Some(acl) = config.functions_acl() {
        discover_log::debug!("  granted functions: {}", acl.join(", "));
    }
}
