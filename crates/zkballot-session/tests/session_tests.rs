//! End-to-end tests of vote sessions against in-memory services

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use halo2curves::pasta::Fp;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use vote_circuit::{CIRCUIT_NAME, MIN_K};
use zkballot_prover::{
    write_artifacts, ArtifactCache, ArtifactKind, ArtifactSource, DirectoryArtifactSource,
    ProofGenerator,
};
use zkballot_runtime::{BallotError, CandidateId, ElectionId, ElectionRoot, Result, VoterId};
use zkballot_session::{
    FailureReason, LedgerClient, LedgerRejection, RosterService, SessionError, SessionState,
    VoteReceipt, VoteSession, VoteSubmission,
};
use zkballot_verifier::verify_proof;

struct SwitchableSource {
    inner: DirectoryArtifactSource,
    offline: Arc<AtomicBool>,
}

impl ArtifactSource for SwitchableSource {
    async fn fetch(&self, circuit: &str, kind: ArtifactKind) -> anyhow::Result<Vec<u8>> {
        if self.offline.load(Ordering::SeqCst) {
            anyhow::bail!("artifact host unreachable");
        }
        self.inner.fetch(circuit, kind).await
    }
}

#[derive(Default)]
struct LedgerState {
    submissions: Mutex<Vec<VoteSubmission>>,
    nullifiers: Mutex<HashSet<String>>,
    transient_failures: AtomicUsize,
}

/// Ledger that records submissions and refuses a nullifier it has seen.
#[derive(Clone, Default)]
struct MemoryLedger(Arc<LedgerState>);

impl MemoryLedger {
    fn fail_next(&self, times: usize) {
        self.0.transient_failures.store(times, Ordering::SeqCst);
    }

    fn submissions(&self) -> Vec<VoteSubmission> {
        self.0.submissions.lock().unwrap().clone()
    }
}

impl LedgerClient for MemoryLedger {
    async fn submit(
        &self,
        submission: &VoteSubmission,
    ) -> std::result::Result<VoteReceipt, LedgerRejection> {
        let pending = self.0.transient_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.0.transient_failures.store(pending - 1, Ordering::SeqCst);
            return Err(LedgerRejection::Transient("503 Service Unavailable".to_string()));
        }

        let nullifier = submission.public_signals.nullifier().expect("nullifier signal").to_hex();
        if !self.0.nullifiers.lock().unwrap().insert(nullifier) {
            return Err(LedgerRejection::DuplicateVote);
        }

        let mut submissions = self.0.submissions.lock().unwrap();
        submissions.push(submission.clone());
        Ok(VoteReceipt { vote_id: format!("vote-{}", submissions.len()), zkp_proof: None })
    }
}

struct FixedRoster {
    root: Option<ElectionRoot>,
    delay: Duration,
}

impl RosterService for FixedRoster {
    async fn election_root(&self, _election: &ElectionId) -> Result<ElectionRoot> {
        tokio::time::sleep(self.delay).await;
        self.root.ok_or_else(|| BallotError::roster_unavailable("roster offline"))
    }
}

struct Harness {
    _dir: TempDir,
    offline: Arc<AtomicBool>,
    generator: ProofGenerator<SwitchableSource>,
    ledger: MemoryLedger,
}

type TestSession = VoteSession<SwitchableSource, MemoryLedger, FixedRoster>;

impl Harness {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let dir = TempDir::new().unwrap();
        write_artifacts(dir.path(), CIRCUIT_NAME, MIN_K).unwrap();

        let offline = Arc::new(AtomicBool::new(false));
        let source = SwitchableSource {
            inner: DirectoryArtifactSource::new(dir.path()),
            offline: Arc::clone(&offline),
        };
        let cache = ArtifactCache::with_timeout(source, Duration::from_secs(30));

        Self {
            _dir: dir,
            offline,
            generator: ProofGenerator::new(Arc::new(cache)),
            ledger: MemoryLedger::default(),
        }
    }

    fn session(&self, voter: &str) -> TestSession {
        self.session_with_roster(voter, root(), Duration::ZERO)
    }

    fn session_with_roster(
        &self,
        voter: &str,
        root: Option<ElectionRoot>,
        delay: Duration,
    ) -> TestSession {
        VoteSession::new(
            VoterId::parse(voter).unwrap(),
            ElectionId::parse("E1").unwrap(),
            self.generator.clone(),
            self.ledger.clone(),
            FixedRoster { root, delay },
        )
    }
}

fn root() -> Option<ElectionRoot> {
    Some(ElectionRoot::from_field(Fp::from(0x5eed)))
}

fn candidate(id: &str) -> CandidateId {
    CandidateId::parse(id).unwrap()
}

#[tokio::test]
async fn test_happy_path() {
    let harness = Harness::new();
    let session = harness.session("V1");

    let receipt = session.cast_vote(&candidate("C1")).await.unwrap();

    assert_eq!(receipt.vote_id, "vote-1");
    assert_eq!(session.state(), SessionState::Completed(receipt));

    let submissions = harness.ledger.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].candidate_id, candidate("C1"));
    assert_eq!(submissions[0].public_signals.election_root(), root());

    let key = harness.generator.cache().fetch_verification_key(CIRCUIT_NAME).await.unwrap();
    assert!(verify_proof(&submissions[0].proof, &submissions[0].public_signals, &key).valid);
}

#[tokio::test]
async fn test_duplicate_vote_is_final() {
    let harness = Harness::new();

    harness.session("V1").cast_vote(&candidate("C1")).await.unwrap();

    // Same voter, new session, different candidate: same nullifier
    let second = harness.session("V1");
    let err = second.cast_vote(&candidate("C2")).await.unwrap_err();

    assert_eq!(err, SessionError::Failed(FailureReason::DuplicateVote));
    assert_eq!(second.state(), SessionState::Failed(FailureReason::DuplicateVote));
    assert_eq!(second.retry(), Err(SessionError::NotRetryable(FailureReason::DuplicateVote)));
    assert_eq!(harness.ledger.submissions().len(), 1);
}

#[tokio::test]
async fn test_artifact_outage_then_recovery() {
    let harness = Harness::new();
    harness.offline.store(true, Ordering::SeqCst);
    let session = harness.session("V1");

    let err = session.cast_vote(&candidate("C1")).await.unwrap_err();
    assert!(matches!(err, SessionError::Failed(FailureReason::ArtifactUnavailable(_))));
    assert!(harness.ledger.submissions().is_empty());

    // Busy or finished sessions refuse a new start until retried
    assert_eq!(
        session.cast_vote(&candidate("C1")).await.unwrap_err(),
        SessionError::AlreadyInProgress
    );

    harness.offline.store(false, Ordering::SeqCst);
    session.retry().unwrap();
    assert_eq!(session.state(), SessionState::Idle);

    session.cast_vote(&candidate("C1")).await.unwrap();
    assert_eq!(harness.ledger.submissions().len(), 1);
}

#[tokio::test]
async fn test_transient_ledger_failure_can_be_retried() {
    let harness = Harness::new();
    harness.ledger.fail_next(1);
    let session = harness.session("V1");

    let err = session.cast_vote(&candidate("C1")).await.unwrap_err();
    let SessionError::Failed(reason) = err else {
        panic!("expected a failed session, got {:?}", err);
    };
    assert!(matches!(reason, FailureReason::LedgerTransient(_)));
    assert!(reason.is_retryable());

    session.retry().unwrap();
    let receipt = session.cast_vote(&candidate("C1")).await.unwrap();
    assert_eq!(session.state(), SessionState::Completed(receipt));
}

#[tokio::test]
async fn test_roster_outage_is_retryable() {
    let harness = Harness::new();
    let session = harness.session_with_roster("V1", None, Duration::ZERO);

    let err = session.cast_vote(&candidate("C1")).await.unwrap_err();
    assert!(matches!(err, SessionError::Failed(FailureReason::RosterUnavailable(_))));
    assert!(session.retry().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_start_rejected() {
    let harness = Harness::new();
    let session = Arc::new(harness.session_with_roster("V1", root(), Duration::from_millis(200)));
    let mut status = session.subscribe();

    let running = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.cast_vote(&candidate("C1")).await })
    };

    status.wait_for(|state| *state == SessionState::GeneratingProof).await.unwrap();
    assert_eq!(
        session.cast_vote(&candidate("C2")).await.unwrap_err(),
        SessionError::AlreadyInProgress
    );

    running.await.unwrap().unwrap();
    assert!(matches!(*status.borrow_and_update(), SessionState::Completed(_)));
    assert_eq!(harness.ledger.submissions().len(), 1);
}

#[tokio::test]
async fn test_dropped_attempt_returns_to_idle() {
    let harness = Harness::new();
    let session = harness.session_with_roster("V1", root(), Duration::from_millis(500));

    let chosen = candidate("C1");
    let attempt = session.cast_vote(&chosen);
    assert!(tokio::time::timeout(Duration::from_millis(20), attempt).await.is_err());

    assert_eq!(session.state(), SessionState::Idle);
    assert!(harness.ledger.submissions().is_empty());
}
