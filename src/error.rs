use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Network error: {0}")]
    NetworkMessage(String),
    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Schedule source error: {0}")]
    ScheduleSource(String),
    #[error("Unknown feed group: {0}")]
    UnknownFeedGroup(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_network_message() {
        let err = EngineError::NetworkMessage("connection refused".into());
        assert_eq!(err.to_string(), "Network error: connection refused");
    }

    #[test]
    fn display_schedule_source() {
        let err = EngineError::ScheduleSource("stop_times.txt missing".into());
        assert_eq!(err.to_string(), "Schedule source error: stop_times.txt missing");
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EngineError = io_err.into();
        assert!(matches!(err, EngineError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn from_prost_decode_error() {
        let bad_bytes: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F];
        let result = <gtfs_realtime::FeedMessage as prost::Message>::decode(bad_bytes);
        let err: EngineError = result.unwrap_err().into();
        assert!(matches!(err, EngineError::Decode(_)));
    }

    #[test]
    fn from_json_error() {
        let result: Result<serde_json::Value, _> = serde_json::from_str("not valid json!!!");
        let err: EngineError = result.unwrap_err().into();
        assert!(matches!(err, EngineError::Json(_)));
    }
}
