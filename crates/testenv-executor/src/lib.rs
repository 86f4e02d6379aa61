pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod logging;

pub use config::EngineConfig;
pub use error::ExecutorError;
pub use executor::Executor;
pub use logging::init_tracing;
