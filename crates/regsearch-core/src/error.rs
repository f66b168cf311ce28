//! Error types for regsearch-core

use thiserror::Error;

/// Result type alias using regsearch-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for regsearch
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration contents
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A hook template failed to compile
    #[error("Hook '{hook}' failed to compile: {message}")]
    HookCompile { hook: String, message: String },

    /// A hook has no compiled template to run
    #[error("Hook '{hook}' has no compiled template")]
    HookNotCompiled { hook: String },

    /// A hook template failed while rendering
    #[error("Hook '{hook}' failed: {message}")]
    HookEval { hook: String, message: String },

    /// Search request carried neither a simple nor an advanced query
    #[error("No search criteria: supply a simple query (q) or an advanced query (a)")]
    NoSearchCriteria,

    /// Advanced query string could not be parsed
    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    /// Webhook envelope could not be decoded
    #[error("Malformed notification envelope: {message}")]
    MalformedEnvelope { message: String },

    /// Registry collaborator failure
    #[error("Registry error: {message}")]
    Registry { message: String },

    /// Index store failure
    #[error("Index store error: {message}")]
    Store { message: String },

    /// Crawl could not continue
    #[error("Crawl error: {message}")]
    Crawl { message: String },
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a hook compile error
    pub fn hook_compile(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HookCompile {
            hook: hook.into(),
            message: message.into(),
        }
    }

    /// Create a hook evaluation error
    pub fn hook_eval(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HookEval {
            hook: hook.into(),
            message: message.into(),
        }
    }

    /// Create an invalid query error
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Create a malformed envelope error
    pub fn malformed_envelope(message: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            message: message.into(),
        }
    }

    /// Create a registry error
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a crawl error
    pub fn crawl(message: impl Into<String>) -> Self {
        Self::Crawl {
            message: message.into(),
        }
    }

    /// Whether this error was caused by a bad caller request rather than a
    /// server-side failure.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            Self::NoSearchCriteria | Self::InvalidQuery { .. } | Self::MalformedEnvelope { .. }
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::registry(format!("{:#}", err))
    }
}
