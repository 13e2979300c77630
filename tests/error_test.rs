use std::error::Error;
use std::time::Duration;

use mimir::{MimirError, Result, Stage};

#[test]
fn test_error_display() {
    let err = MimirError::embedding(MimirError::Http("connection refused".into()));
    let text = err.to_string();
    assert!(text.contains("embedding stage failed"));
    assert!(text.contains("connection refused"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(MimirError::EmptyResponse)
    }
    assert!(returns_error().is_err());
}

// ============================================================================
// Stage tagging
// ============================================================================

#[test]
fn stage_wrappers_report_their_stage() {
    let cause = || MimirError::Timeout(Duration::from_secs(5));
    assert_eq!(MimirError::embedding(cause()).stage(), Some(Stage::Embedding));
    assert_eq!(MimirError::search(cause()).stage(), Some(Stage::Search));
    assert_eq!(MimirError::generation(cause()).stage(), Some(Stage::Generation));
    assert_eq!(cause().stage(), None);
    assert_eq!(MimirError::RequestTimeout(Duration::from_secs(90)).stage(), None);

    for stage in [Stage::Embedding, Stage::Search, Stage::Generation] {
        assert_eq!(MimirError::at_stage(stage, cause()).stage(), Some(stage));
    }
}

#[test]
fn cause_unwraps_to_backend_error() {
    let err = MimirError::search(MimirError::Api {
        status: 503,
        message: "unavailable".into(),
    });
    assert!(matches!(err.cause(), MimirError::Api { status: 503, .. }));
    assert!(err.source().is_some());

    let plain = MimirError::EmptyResponse;
    assert!(matches!(plain.cause(), MimirError::EmptyResponse));
}

#[test]
fn stage_labels() {
    assert_eq!(Stage::Embedding.to_string(), "embedding");
    assert_eq!(Stage::Search.as_str(), "search");
    assert_eq!(Stage::Generation.as_str(), "generation");
}

// ============================================================================
// Retry classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(MimirError::Http("connection reset".into()).is_transient());
    assert!(MimirError::Timeout(Duration::from_secs(1)).is_transient());
    assert!(MimirError::EmptyResponse.is_transient());
    assert!(MimirError::Truncated("cut off".into()).is_transient());
    assert!(MimirError::CacheUnavailable("redis down".into()).is_transient());
    assert!(
        MimirError::Api {
            status: 429,
            message: "slow down".into()
        }
        .is_transient()
    );
    assert!(
        MimirError::Api {
            status: 502,
            message: "bad gateway".into()
        }
        .is_transient()
    );
}

#[test]
fn permanent_errors() {
    assert!(!MimirError::InvalidInput("empty".into()).is_transient());
    assert!(!MimirError::Configuration("no key".into()).is_transient());
    assert!(!MimirError::DataError("bad".into()).is_transient());
    assert!(
        !MimirError::Api {
            status: 404,
            message: "not found".into()
        }
        .is_transient()
    );
}

#[test]
fn every_stage_failure_is_retryable() {
    assert!(MimirError::embedding(MimirError::Http("reset".into())).is_retryable());
    assert!(MimirError::search(MimirError::Timeout(Duration::from_secs(5))).is_retryable());
    assert!(
        MimirError::generation(MimirError::Api {
            status: 500,
            message: "boom".into()
        })
        .is_retryable()
    );
    // Malformed input at a backend is still reported as a stage failure
    let rejected = MimirError::embedding(MimirError::InvalidInput("too long".into()));
    assert!(rejected.is_retryable());
    assert!(!rejected.cause().is_transient());
    assert!(MimirError::generation(MimirError::Configuration("bad key".into())).is_retryable());
    assert!(MimirError::RequestTimeout(Duration::from_secs(90)).is_retryable());
    assert!(!MimirError::InvalidInput("top_k".into()).is_retryable());
}

#[test]
fn json_errors_convert() {
    let err: MimirError = serde_json::from_str::<serde_json::Value>("{")
        .unwrap_err()
        .into();
    assert!(matches!(err, MimirError::Json(_)));
}
