//! Error types for the Verdict core library.
//!
//! Uses `thiserror` for public API error types. Almost every variant here is
//! caught at the boundary of the step that produced it and replaced with a
//! default; only errors escaping the session handler become terminal events.

/// Top-level error type for the Verdict core library.
#[derive(Debug, thiserror::Error)]
pub enum VerdictError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Session task failed: {message}")]
    SessionTask { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from model backends and the failover chain.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Model not configured: {model}")]
    UnsupportedModel { model: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Model {model} returned an empty response")]
    EmptyResponse { model: String },

    #[error("Circuit open for model {model}")]
    CircuitOpen { model: String },

    #[error("All {attempts} model(s) failed for role '{role}': {last_error}")]
    ChainExhausted {
        role: String,
        attempts: usize,
        last_error: String,
    },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },

    #[error("Unknown role referenced in configuration: {role}")]
    UnknownRole { role: String },
}

/// Errors from external collaborators (search, triangulation, correction, audit).
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("{what} is unavailable")]
    Unavailable { what: String },

    #[error("Malformed {what}: {message}")]
    Malformed { what: String, message: String },

    #[error("HTTP error: {message}")]
    Http { message: String },
}

/// Errors from the cache store.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend failure: {message}")]
    Backend { message: String },

    #[error("Cached value could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors from the event stream.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("Stream already closed")]
    Closed,

    #[error("Observer disconnected")]
    Disconnected,

    #[error("Event out of order: {message}")]
    OutOfOrder { message: String },

    #[error("Progress step {index} is out of range")]
    InvalidStep { index: u8 },
}

/// Errors from the progress tracker.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProgressError {
    #[error("Progress step {index} exceeds the terminal step {terminal}")]
    StepOutOfRange { index: u8, terminal: u8 },
}

/// Errors from a mode strategy.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No role produced any content")]
    NoContributions,

    #[error("Synthesis role '{role}' returned no conclusion")]
    SynthesisFailed { role: String },
}

/// Errors from report assembly.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Nothing to report: no analysis content")]
    NoContent,
}

/// A type alias for results using the top-level `VerdictError`.
pub type Result<T> = std::result::Result<T, VerdictError>;
