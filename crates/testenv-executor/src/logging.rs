use tracing_subscriber::EnvFilter;

/// Installs a process-wide `tracing` subscriber reading its filter from
/// `RUST_LOG`. The embedding binary calls this once at startup; the engine
/// itself never calls it (no CLI lives here to own that decision).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();
}
