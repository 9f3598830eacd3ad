/// Installs `env_logger`. An explicit level wins over `RUST_LOG`; without
/// either the filter defaults to `info`. Calling it twice is harmless.
pub fn init_logging(level: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(lvl) = level {
        builder.parse_filters(lvl);
    }
    let _ = builder.try_init();
}
