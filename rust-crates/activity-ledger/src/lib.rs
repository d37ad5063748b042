pub mod app;
pub mod decode;
pub mod error;
pub mod events;
pub mod ledger;
pub mod snapshot;

pub use app::{
    build_ledger,
    reconstruct,
};
pub use error::{
    FetchError,
    LedgerError,
};
pub use explorer_config::ConfigError;
pub use ledger::Ledger;
pub use snapshot::{
    Snapshot,
    compute_snapshot,
};

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
