use std::path::PathBuf;

use thiserror::Error;

/// Document-level failures. Field-level absence never reaches this type.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("input not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("malformed XML at byte {position}: {message}")]
    Parse { message: String, position: u64 },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn exit_code(&self) -> i32 {
        match self {
            IngestError::NotFound { .. } => 2,
            IngestError::Parse { .. } => 3,
            IngestError::Io { .. } | IngestError::Config(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_parse_have_distinct_codes() {
        let nf = IngestError::NotFound { path: PathBuf::from("missing.xml") };
        let pf = IngestError::Parse { message: "bad".to_string(), position: 4 };
        assert_ne!(nf.exit_code(), pf.exit_code());
        assert!(nf.to_string().contains("missing.xml"));
        assert!(pf.to_string().contains("byte 4"));
    }
}
