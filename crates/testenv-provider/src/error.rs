use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to spawn provider process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("provider '{0}' is not running")]
    NotRunning(String),

    #[error("no provider registered under name '{0}'")]
    UnknownProvider(String),

    #[error("provider '{provider}' does not advertise tool '{tool}'")]
    UnsupportedTool { provider: String, tool: String },

    #[error("no default provider is registered")]
    NoDefaultProvider,

    #[error("provider call timed out")]
    Timeout,

    #[error("provider process exited before replying")]
    Disconnected,

    #[error("provider returned a JSON-RPC error: code = {code}, message = {message}")]
    Rpc { code: i64, message: String },
}
