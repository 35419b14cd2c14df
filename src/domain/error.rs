//! Engine error taxonomy.
//!
//! Transient data problems (`MissingData`, `UpstreamUnavailable`) degrade a
//! single point or task and are reported; structural problems (unknown region,
//! malformed date, broken store invariant) fail fast.

/// Top-level error type for folioquant.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid bar for {symbol} ({region}) on {date}: {reason}")]
    InvalidBar {
        symbol: String,
        region: String,
        date: String,
        reason: String,
    },

    #[error("no usable data for {symbol} ({region})")]
    MissingData { symbol: String, region: String },

    #[error("recompute conflict for {symbol} ({region}): {reason}")]
    RecomputeConflict {
        symbol: String,
        region: String,
        reason: String,
    },

    #[error("upstream source unavailable: {reason}")]
    UpstreamUnavailable { reason: String },

    #[error("unknown region: {value}")]
    UnknownRegion { value: String },

    #[error("malformed date {value}: {reason}")]
    MalformedDate { value: String, reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. } => 2,
            EngineError::Database { .. } | EngineError::DatabaseQuery { .. } => 3,
            EngineError::InvalidBar { .. }
            | EngineError::UnknownRegion { .. }
            | EngineError::MalformedDate { .. } => 4,
            EngineError::MissingData { .. }
            | EngineError::RecomputeConflict { .. }
            | EngineError::UpstreamUnavailable { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_bar_message() {
        let err = EngineError::InvalidBar {
            symbol: "AAPL".into(),
            region: "USD".into(),
            date: "2024-01-15".into(),
            reason: "close is not finite".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid bar for AAPL (USD) on 2024-01-15: close is not finite"
        );
    }

    #[test]
    fn missing_data_message() {
        let err = EngineError::MissingData {
            symbol: "SHOP".into(),
            region: "CAD".into(),
        };
        assert_eq!(err.to_string(), "no usable data for SHOP (CAD)");
    }

    #[test]
    fn exit_code_classes() {
        use std::process::ExitCode;

        let io: ExitCode = (&EngineError::Io(std::io::Error::other("x"))).into();
        assert_eq!(format!("{io:?}"), format!("{:?}", ExitCode::from(1)));

        let config: ExitCode = (&EngineError::ConfigMissing {
            section: "sqlite".into(),
            key: "path".into(),
        })
            .into();
        assert_eq!(format!("{config:?}"), format!("{:?}", ExitCode::from(2)));

        let db: ExitCode = (&EngineError::Database { reason: "x".into() }).into();
        assert_eq!(format!("{db:?}"), format!("{:?}", ExitCode::from(3)));

        let structural: ExitCode = (&EngineError::UnknownRegion { value: "AUD".into() }).into();
        assert_eq!(format!("{structural:?}"), format!("{:?}", ExitCode::from(4)));

        let transient: ExitCode = (&EngineError::MissingData {
            symbol: "X".into(),
            region: "USD".into(),
        })
            .into();
        assert_eq!(format!("{transient:?}"), format!("{:?}", ExitCode::from(5)));
    }
}
