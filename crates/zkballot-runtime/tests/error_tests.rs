//! Integration tests for error handling in zkballot-runtime

use zkballot_runtime::BallotError;

#[test]
fn test_artifact_unavailable_message() {
    let error = BallotError::artifact_unavailable("vote", "connection refused");

    let error_msg = error.to_string();
    assert!(error_msg.contains("Artifact unavailable"));
    assert!(error_msg.contains("'vote'"));
    assert!(error_msg.contains("connection refused"));
}

#[test]
fn test_invalid_input_message() {
    let error = BallotError::invalid_input("voter id must not be empty");

    let error_msg = error.to_string();
    assert!(error_msg.contains("Invalid input"));
    assert!(error_msg.contains("voter id must not be empty"));
}

#[test]
fn test_proof_generation_message() {
    let error = BallotError::proof_generation("constraint system not satisfied");

    let error_msg = error.to_string();
    assert!(error_msg.contains("Proof generation failed"));
    assert!(error_msg.contains("constraint system not satisfied"));
}

#[test]
fn test_retry_classification() {
    assert!(BallotError::artifact_unavailable("vote", "timeout").is_retryable());
    assert!(BallotError::roster_unavailable("503").is_retryable());
    assert!(!BallotError::invalid_input("bad").is_retryable());
    assert!(!BallotError::proof_generation("unsatisfiable").is_retryable());
}

#[test]
fn test_error_debug_format() {
    let error = BallotError::invalid_input("test");
    let debug_output = format!("{:?}", error);

    assert!(debug_output.contains("InvalidInput"));
}

#[test]
fn test_result_type_err() {
    use zkballot_runtime::Result;

    let result: Result<i32> = Err(BallotError::proof_generation("test error"));
    assert!(result.is_err());
    if let Err(error) = result {
        assert!(!error.is_retryable());
    }
}
