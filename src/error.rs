use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the scraper can produce.
///
/// The first four variants are per-unit: the caller logs them and moves on
/// to the next work unit. The rest abort the run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{resource} for {unit} still failing after {attempts} attempts: {reason}")]
    TransientUpstream {
        unit: String,
        resource: String,
        attempts: u32,
        reason: String,
    },

    #[error("malformed {resource} response for {unit}: {reason}")]
    MalformedResponse {
        unit: String,
        resource: String,
        reason: String,
    },

    #[error("{resource} for {unit} returned status {status}")]
    UpstreamStatus {
        unit: String,
        resource: String,
        status: u16,
    },

    #[error("{side} dataset is missing join column '{column}'")]
    JoinKeyMissing { side: &'static str, column: String },

    #[error("failed to write {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// True when the error only affects the current work unit.
    pub fn is_unit_skip(&self) -> bool {
        matches!(
            self,
            Error::TransientUpstream { .. }
                | Error::MalformedResponse { .. }
                | Error::UpstreamStatus { .. }
                | Error::JoinKeyMissing { .. }
        )
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Persistence {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_skip_classification() {
        let malformed = Error::MalformedResponse {
            unit: "0022400001".to_string(),
            resource: "advanced".to_string(),
            reason: "missing 'data'".to_string(),
        };
        assert!(malformed.is_unit_skip());

        let join = Error::JoinKeyMissing {
            side: "traditional",
            column: "personId".to_string(),
        };
        assert!(join.is_unit_skip());

        let config = Error::Config("FETCH_MAX_ATTEMPTS must be at least 1".to_string());
        assert!(!config.is_unit_skip());

        let io = Error::persistence(
            "out.csv",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!io.is_unit_skip());
        assert!(io.to_string().contains("out.csv"));
    }
}
