use tracing_subscriber::EnvFilter;

/// Installs the global subscriber for the library and the command line
/// driver. `RUST_LOG` replaces the default of `info` for both crates; a
/// second call leaves the first subscriber in place.
pub fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("promptshare_core=info,promptshare_agent=info"));
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
