//! Vote session coordination
//!
//! A session walks one voter through `Idle → GeneratingProof → SubmittingVote`
//! and ends in `Completed` or `Failed`. Transitions are a pure function over
//! [`SessionState`]; [`VoteSession`] drives them and publishes every state on
//! a watch channel.

use std::fmt;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};
use zkballot_prover::{ArtifactSource, ProofGenerator};
use zkballot_runtime::{BallotError, CandidateId, ElectionContext, ElectionId, VoterId};

use crate::ledger::{LedgerClient, LedgerRejection, VoteReceipt, VoteSubmission};
use crate::roster::RosterService;

/// Why a session ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    ArtifactUnavailable(String),
    RosterUnavailable(String),
    InvalidInput(String),
    ProofGeneration(String),
    DuplicateVote,
    LedgerTransient(String),
    LedgerRejected { reason: String, message: String },
}

impl FailureReason {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ArtifactUnavailable(_) | Self::RosterUnavailable(_) | Self::LedgerTransient(_)
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArtifactUnavailable(reason) => write!(f, "artifact unavailable: {}", reason),
            Self::RosterUnavailable(reason) => write!(f, "roster unavailable: {}", reason),
            Self::InvalidInput(reason) => write!(f, "invalid input: {}", reason),
            Self::ProofGeneration(reason) => write!(f, "proof generation failed: {}", reason),
            Self::DuplicateVote => f.write_str("already voted in this election"),
            Self::LedgerTransient(reason) => write!(f, "ledger unavailable: {}", reason),
            Self::LedgerRejected { reason, message } => {
                write!(f, "ledger rejected the vote ({}): {}", reason, message)
            }
        }
    }
}

impl From<BallotError> for FailureReason {
    fn from(err: BallotError) -> Self {
        match err {
            BallotError::ArtifactUnavailable { .. } => Self::ArtifactUnavailable(err.to_string()),
            BallotError::RosterUnavailable(reason) => Self::RosterUnavailable(reason),
            BallotError::InvalidInput(reason) => Self::InvalidInput(reason),
            BallotError::ProofGenerationFailure(reason) => Self::ProofGeneration(reason),
        }
    }
}

impl From<LedgerRejection> for FailureReason {
    fn from(rejection: LedgerRejection) -> Self {
        match rejection {
            LedgerRejection::DuplicateVote => Self::DuplicateVote,
            LedgerRejection::Transient(reason) => Self::LedgerTransient(reason),
            LedgerRejection::Rejected { reason, message } => {
                Self::LedgerRejected { reason, message }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    GeneratingProof,
    SubmittingVote,
    Completed(VoteReceipt),
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    ProofReady,
    ProofFailed(FailureReason),
    LedgerAccepted(VoteReceipt),
    LedgerRejected(FailureReason),
    Retry,
    /// The driving future went away before reaching a terminal state
    Abandon,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("A vote is already in progress or finished for this session")]
    AlreadyInProgress,

    #[error("Event {event} is not valid in state {state}")]
    InvalidTransition { state: &'static str, event: &'static str },

    #[error("Session failed with a final reason: {0}")]
    NotRetryable(FailureReason),

    #[error("Vote failed: {0}")]
    Failed(FailureReason),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::GeneratingProof => "GeneratingProof",
            Self::SubmittingVote => "SubmittingVote",
            Self::Completed(_) => "Completed",
            Self::Failed(_) => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::GeneratingProof | Self::SubmittingVote)
    }

    /// Returns the state `event` leads to, leaving `self` untouched.
    pub fn apply(&self, event: SessionEvent) -> Result<SessionState, SessionError> {
        use SessionEvent as E;
        use SessionState as S;

        match (self, event) {
            (S::Idle, E::Start) => Ok(S::GeneratingProof),
            (_, E::Start) => Err(SessionError::AlreadyInProgress),

            (S::GeneratingProof, E::ProofReady) => Ok(S::SubmittingVote),
            (S::GeneratingProof, E::ProofFailed(reason)) => Ok(S::Failed(reason)),

            (S::SubmittingVote, E::LedgerAccepted(receipt)) => Ok(S::Completed(receipt)),
            (S::SubmittingVote, E::LedgerRejected(reason)) => Ok(S::Failed(reason)),

            (S::Failed(reason), E::Retry) if reason.is_retryable() => Ok(S::Idle),
            (S::Failed(reason), E::Retry) => Err(SessionError::NotRetryable(reason.clone())),

            (S::GeneratingProof | S::SubmittingVote, E::Abandon) => Ok(S::Idle),

            (state, event) => Err(SessionError::InvalidTransition {
                state: state.name(),
                event: event.name(),
            }),
        }
    }
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::ProofReady => "ProofReady",
            Self::ProofFailed(_) => "ProofFailed",
            Self::LedgerAccepted(_) => "LedgerAccepted",
            Self::LedgerRejected(_) => "LedgerRejected",
            Self::Retry => "Retry",
            Self::Abandon => "Abandon",
        }
    }
}

/// One voter's attempt to cast a vote in one election.
pub struct VoteSession<S, L, R> {
    voter: VoterId,
    election: ElectionId,
    generator: ProofGenerator<S>,
    ledger: L,
    roster: R,
    state: watch::Sender<SessionState>,
}

impl<S, L, R> VoteSession<S, L, R>
where
    S: ArtifactSource,
    L: LedgerClient,
    R: RosterService,
{
    pub fn new(
        voter: VoterId,
        election: ElectionId,
        generator: ProofGenerator<S>,
        ledger: L,
        roster: R,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self { voter, election, generator, ledger, roster, state }
    }

    pub fn election(&self) -> &ElectionId {
        &self.election
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Watches the session state as it changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Runs a full attempt: root lookup, proof generation and submission.
    ///
    /// Only one attempt can run at a time; a second call while one is in
    /// flight (or after completion) gets [`SessionError::AlreadyInProgress`].
    /// Dropping the returned future before it finishes puts the session back
    /// to `Idle`.
    pub async fn cast_vote(&self, candidate: &CandidateId) -> Result<VoteReceipt, SessionError> {
        self.transition(SessionEvent::Start)?;
        let guard = AbandonGuard { state: &self.state, armed: true };
        info!(election = %self.election, "vote session started");

        let generated = match self.prove(candidate).await {
            Ok(generated) => generated,
            Err(err) => {
                let reason = FailureReason::from(err);
                return Err(self.fail(guard, SessionEvent::ProofFailed(reason.clone()), reason));
            }
        };
        self.transition(SessionEvent::ProofReady)?;

        let submission = VoteSubmission::new(candidate, &self.election, &generated);
        match self.ledger.submit(&submission).await {
            Ok(receipt) => {
                self.transition(SessionEvent::LedgerAccepted(receipt.clone()))?;
                guard.disarm();
                info!(election = %self.election, vote_id = %receipt.vote_id, "vote cast");
                Ok(receipt)
            }
            Err(rejection) => {
                let reason = FailureReason::from(rejection);
                Err(self.fail(guard, SessionEvent::LedgerRejected(reason.clone()), reason))
            }
        }
    }

    /// Moves a retryable failure back to `Idle`.
    pub fn retry(&self) -> Result<(), SessionError> {
        self.transition(SessionEvent::Retry)
    }

    async fn prove(
        &self,
        candidate: &CandidateId,
    ) -> zkballot_runtime::Result<zkballot_prover::GeneratedVoteProof> {
        let root = self.roster.election_root(&self.election).await?;
        let context = ElectionContext::new(self.election.clone(), root);
        self.generator.generate_vote_proof(&self.voter, candidate, &context).await
    }

    fn fail(
        &self,
        guard: AbandonGuard<'_>,
        event: SessionEvent,
        reason: FailureReason,
    ) -> SessionError {
        warn!(election = %self.election, %reason, retryable = reason.is_retryable(), "vote failed");
        if let Err(err) = self.transition(event) {
            return err;
        }
        guard.disarm();
        SessionError::Failed(reason)
    }

    fn transition(&self, event: SessionEvent) -> Result<(), SessionError> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| match state.apply(event) {
            Ok(next) => {
                *state = next;
                true
            }
            Err(err) => {
                outcome = Err(err);
                false
            }
        });
        outcome
    }
}

/// Resets a busy session to `Idle` if the driving future is dropped.
struct AbandonGuard<'a> {
    state: &'a watch::Sender<SessionState>,
    armed: bool,
}

impl AbandonGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.state.send_if_modified(|state| match state.apply(SessionEvent::Abandon) {
            Ok(next) => {
                warn!(from = state.name(), "vote session abandoned");
                *state = next;
                true
            }
            Err(_) => false,
        });
    }
}
