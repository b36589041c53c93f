//! Vote ledger client
//!
//! Submits `POST {ledger}/votes` and sorts the answer into a receipt or one of
//! three kinds of rejection.

use std::{future::Future, time::Duration};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use zkballot_prover::GeneratedVoteProof;
use zkballot_runtime::{CandidateId, ElectionId, PublicSignals, VoteProof};

use crate::config::LedgerConfig;

/// Ledger reason codes meaning the nullifier has already been spent
pub const DUPLICATE_REASONS: [&str; 2] = ["DUPLICATE_NULLIFIER", "ALREADY_VOTED"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerRejection {
    #[error("A vote with this nullifier was already recorded")]
    DuplicateVote,

    #[error("Ledger temporarily unavailable: {0}")]
    Transient(String),

    #[error("Ledger rejected the vote ({reason}): {message}")]
    Rejected { reason: String, message: String },
}

impl LedgerRejection {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Request body of a vote submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSubmission {
    pub candidate_id: CandidateId,
    pub election_id: ElectionId,
    pub proof: VoteProof,
    pub public_signals: PublicSignals,
}

impl VoteSubmission {
    pub fn new(candidate: &CandidateId, election: &ElectionId, proof: &GeneratedVoteProof) -> Self {
        Self {
            candidate_id: candidate.clone(),
            election_id: election.clone(),
            proof: proof.proof.clone(),
            public_signals: proof.public_signals.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub vote_id: String,
    #[serde(default)]
    pub zkp_proof: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerResponse {
    success: bool,
    #[serde(default)]
    vote_id: Option<String>,
    #[serde(default)]
    zkp_proof: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub trait LedgerClient: Send + Sync + 'static {
    fn submit(
        &self,
        submission: &VoteSubmission,
    ) -> impl Future<Output = Result<VoteReceipt, LedgerRejection>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    client: reqwest::Client,
    base_url: String,
    submit_timeout: Duration,
}

impl HttpLedgerClient {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            submit_timeout: config.submit_timeout(),
        }
    }

    pub fn votes_url(&self) -> String {
        format!("{}/votes", self.base_url)
    }
}

impl LedgerClient for HttpLedgerClient {
    async fn submit(&self, submission: &VoteSubmission) -> Result<VoteReceipt, LedgerRejection> {
        let url = self.votes_url();
        debug!(%url, election = %submission.election_id, "submitting vote");

        let request = async {
            let response = self.client.post(&url).json(submission).send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match tokio::time::timeout(self.submit_timeout, request).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!(error = %e, "ledger request failed");
                return Err(LedgerRejection::Transient(e.to_string()));
            }
            Err(_) => {
                warn!(timeout = ?self.submit_timeout, "ledger request timed out");
                return Err(LedgerRejection::Transient(format!(
                    "no answer within {:?}",
                    self.submit_timeout
                )));
            }
        };

        let outcome = classify_response(status, &body);
        match &outcome {
            Ok(receipt) => info!(vote_id = %receipt.vote_id, "vote recorded"),
            Err(rejection) => warn!(%status, %rejection, "vote not recorded"),
        }
        outcome
    }
}

/// Interprets a ledger answer.
///
/// 409 and the duplicate reason codes mean the vote was already cast.
/// Timeouts, throttling and server errors are transient. A 2xx whose body
/// cannot be read is transient too: a retry is safe because the nullifier
/// lets the ledger refuse a second recording.
pub fn classify_response(
    status: StatusCode,
    body: &[u8],
) -> Result<VoteReceipt, LedgerRejection> {
    if status == StatusCode::CONFLICT {
        return Err(LedgerRejection::DuplicateVote);
    }
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        return Err(LedgerRejection::Transient(format!("ledger returned {}", status)));
    }

    let response: LedgerResponse = match serde_json::from_slice(body) {
        Ok(response) => response,
        Err(e) if status.is_success() => {
            return Err(LedgerRejection::Transient(format!("unreadable ledger response: {}", e)))
        }
        Err(_) => {
            return Err(LedgerRejection::Rejected {
                reason: format!("HTTP_{}", status.as_u16()),
                message: String::from_utf8_lossy(body).into_owned(),
            })
        }
    };

    if response.success && status.is_success() {
        return match response.vote_id {
            Some(vote_id) => Ok(VoteReceipt { vote_id, zkp_proof: response.zkp_proof }),
            None => Err(LedgerRejection::Transient("ledger response lacks a voteId".to_string())),
        };
    }

    let reason = response.reason.unwrap_or_else(|| format!("HTTP_{}", status.as_u16()));
    if DUPLICATE_REASONS.contains(&reason.as_str()) {
        return Err(LedgerRejection::DuplicateVote);
    }
    Err(LedgerRejection::Rejected { reason, message: response.message.unwrap_or_default() })
}
