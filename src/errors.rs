use thiserror::Error;

/// Errors surfaced to a connected client as `ERR <message>\n`.
///
/// `Display` renders the exact lower-case wire text clients see; keep it that
/// way even when adding variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("invalid command")]
    InvalidCommand,

    #[error("empty command")]
    EmptyCommand,

    #[error("invalid data type")]
    InvalidDataType,

    #[error("not found")]
    NotFound,

    #[error("out of range")]
    OutOfRange,

    #[error("unknown client")]
    UnknownClient,

    #[error("no registered clients")]
    NoRegisteredClients,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("{0}")]
    Consensus(String),

    #[error("{0}")]
    Transport(String),
}

impl StoreError {
    /// Renders as the body of an `ERR <message>\n` response line.
    pub fn as_wire_message(&self) -> String {
        self.to_string()
    }
}

/// Errors loading or validating the JSON configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("TLS configuration incomplete: both cert_file_path and key_file_path must be set together, or neither")]
    IncompleteTls,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_messages_match_spec_text() {
        assert_eq!(StoreError::InvalidCommand.as_wire_message(), "invalid command");
        assert_eq!(StoreError::EmptyCommand.as_wire_message(), "empty command");
        assert_eq!(
            StoreError::InvalidDataType.as_wire_message(),
            "invalid data type"
        );
        assert_eq!(StoreError::NotFound.as_wire_message(), "not found");
        assert_eq!(StoreError::UnknownClient.as_wire_message(), "unknown client");
        assert_eq!(
            StoreError::NoRegisteredClients.as_wire_message(),
            "no registered clients"
        );
        assert_eq!(
            StoreError::InvalidSignature.as_wire_message(),
            "invalid signature"
        );
    }
}
