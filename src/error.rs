use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// Device frame that is not 9 binary tokens
    #[error("Malformed pad frame: {0:?}")]
    MalformedFrame(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored mapping that is not a permutation of the slots
    #[error("Invalid pad mapping: {0}")]
    InvalidMapping(String),

    /// Registration service unreachable or refused the request
    #[error("Roster unavailable: {0}")]
    Roster(String),
    #[error("{0}")]
    Registration(String),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Navigation parameters missing something the next screen needs
    #[error("Invalid session: {0}")]
    Session(String),
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn io_errors_keep_their_source() {
        let err: BridgeError = std::io::Error::other("pipe closed").into();

        assert_eq!(err.to_string(), "I/O error: pipe closed");
        assert!(err.source().is_some());
    }

    #[test]
    fn roster_errors_read_plainly() {
        let err = BridgeError::Roster("HTTP 503".to_string());

        assert_eq!(err.to_string(), "Roster unavailable: HTTP 503");
        assert!(err.source().is_none());
    }
}
