fn main() -> tmc22::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    tmc22::cli::run()
}
