pub mod client;
pub mod error;
pub mod manager;
pub mod protocol;

pub use client::ProviderClient;
pub use error::ProviderError;
pub use manager::ProviderManager;
pub use protocol::{tool_method, ProviderCapabilities, CAPABILITIES_METHOD};
