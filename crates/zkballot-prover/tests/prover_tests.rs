//! Integration tests for the artifact cache and the proof generator

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use vote_circuit::{commitment, VoteCircuitInput, CIRCUIT_NAME, MIN_K};
use zkballot_prover::{
    write_artifacts, ArtifactCache, ArtifactKind, ArtifactSource, DirectoryArtifactSource,
    ProofGenerator,
};
use zkballot_runtime::{
    BallotError, CandidateId, ElectionContext, ElectionId, ElectionRoot, Salt, VoterId,
};
use zkballot_verifier::verify_proof;

/// Directory source that counts fetches and can be made slow or unavailable.
struct ControlledSource {
    inner: DirectoryArtifactSource,
    fetches: AtomicUsize,
    offline: AtomicBool,
    delay: Duration,
}

impl ControlledSource {
    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl ArtifactSource for ControlledSource {
    async fn fetch(&self, circuit: &str, kind: ArtifactKind) -> anyhow::Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.offline.load(Ordering::SeqCst) {
            anyhow::bail!("distribution service unreachable");
        }
        self.inner.fetch(circuit, kind).await
    }
}

struct Fixture {
    _dir: TempDir,
    cache: Arc<ArtifactCache<ControlledSource>>,
}

impl Fixture {
    fn new(delay: Duration, timeout: Duration) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let dir = TempDir::new().unwrap();
        write_artifacts(dir.path(), CIRCUIT_NAME, MIN_K).unwrap();

        let source = ControlledSource {
            inner: DirectoryArtifactSource::new(dir.path()),
            fetches: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
            delay,
        };
        let cache = Arc::new(ArtifactCache::with_timeout(source, timeout));
        Self { _dir: dir, cache }
    }

    fn fast() -> Self {
        Self::new(Duration::ZERO, Duration::from_secs(30))
    }

    fn source(&self) -> &ControlledSource {
        self.cache.source()
    }

    fn generator(&self) -> ProofGenerator<ControlledSource> {
        ProofGenerator::new(Arc::clone(&self.cache))
    }
}

fn ballot(candidate: &str) -> (VoterId, CandidateId, ElectionContext) {
    (
        VoterId::parse("V1").unwrap(),
        CandidateId::parse(candidate).unwrap(),
        ElectionContext::new(
            ElectionId::parse("E1").unwrap(),
            ElectionRoot::parse("0x2a").unwrap(),
        ),
    )
}

#[tokio::test]
async fn test_proof_round_trip() {
    let fixture = Fixture::fast();
    let (voter, candidate, context) = ballot("C1");

    let generated =
        fixture.generator().generate_vote_proof(&voter, &candidate, &context).await.unwrap();
    let key = fixture.cache.fetch_verification_key(CIRCUIT_NAME).await.unwrap();

    assert!(verify_proof(&generated.proof, &generated.public_signals, &key).valid);
    assert_eq!(generated.public_signals.nullifier(), Some(generated.nullifier_hash));
    assert_eq!(generated.public_signals.commitment(), Some(generated.commitment_hash));
    assert_eq!(generated.public_signals.election_root(), Some(context.root()));
}

#[tokio::test]
async fn test_public_signals_do_not_leak_private_inputs() {
    let fixture = Fixture::fast();
    let (voter, first_choice, context) = ballot("C1");
    let (_, second_choice, _) = ballot("C2");
    let generator = fixture.generator();

    let first = generator.generate_vote_proof(&voter, &first_choice, &context).await.unwrap();
    let second = generator.generate_vote_proof(&voter, &second_choice, &context).await.unwrap();

    for generated in [&first, &second] {
        for signal in generated.public_signals.as_slice() {
            assert_ne!(*signal, first_choice.element());
            assert_ne!(*signal, second_choice.element());
            assert_ne!(*signal, voter.element());
        }
        let json = serde_json::to_string(generated).unwrap();
        for raw in ["V1", "C1", "C2"] {
            assert!(!json.contains(raw), "{} leaked", raw);
        }
    }

    // Same voter and election: same nullifier; the commitments differ and the
    // root is shared, so nothing public tells the two candidates apart
    assert_eq!(first.nullifier_hash, second.nullifier_hash);
    assert_ne!(first.commitment_hash, second.commitment_hash);
    assert_eq!(first.public_signals.election_root(), second.public_signals.election_root());
}

#[tokio::test]
async fn test_load_circuit_is_idempotent() {
    let fixture = Fixture::fast();

    let first = fixture.cache.load_circuit(CIRCUIT_NAME).await.unwrap();
    let second = fixture.cache.load_circuit(CIRCUIT_NAME).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(fixture.source().fetch_count(), 1);
    assert!(fixture.cache.is_cached(CIRCUIT_NAME).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_loads_share_one_fetch() {
    let fixture = Fixture::new(Duration::from_millis(50), Duration::from_secs(30));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&fixture.cache);
            tokio::spawn(async move { cache.load_circuit(CIRCUIT_NAME).await })
        })
        .collect();

    let mut artifacts = Vec::new();
    for handle in handles {
        artifacts.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(fixture.source().fetch_count(), 1);
    assert!(artifacts.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[tokio::test]
async fn test_failed_loads_are_not_cached() {
    let fixture = Fixture::fast();
    fixture.source().set_offline(true);

    let err = fixture.cache.load_circuit(CIRCUIT_NAME).await.unwrap_err();
    assert!(matches!(err, BallotError::ArtifactUnavailable { .. }));
    assert!(err.is_retryable());
    assert!(!fixture.cache.is_cached(CIRCUIT_NAME).await);

    fixture.source().set_offline(false);
    fixture.cache.load_circuit(CIRCUIT_NAME).await.unwrap();
    assert_eq!(fixture.source().fetch_count(), 2);
}

#[tokio::test]
async fn test_artifact_outage_fails_before_proving() {
    let fixture = Fixture::fast();
    fixture.source().set_offline(true);
    let (voter, candidate, context) = ballot("C1");

    let err =
        fixture.generator().generate_vote_proof(&voter, &candidate, &context).await.unwrap_err();

    assert!(matches!(
        err,
        BallotError::ArtifactUnavailable { ref circuit, .. } if circuit == CIRCUIT_NAME
    ));
    assert_eq!(fixture.source().fetch_count(), 1);
}

#[tokio::test]
async fn test_fetch_timeout_is_artifact_unavailable() {
    let fixture = Fixture::new(Duration::from_millis(500), Duration::from_millis(20));

    let err = fixture.cache.load_circuit(CIRCUIT_NAME).await.unwrap_err();
    assert!(matches!(err, BallotError::ArtifactUnavailable { .. }));
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_unknown_circuit_is_artifact_unavailable() {
    let fixture = Fixture::fast();

    let err = fixture.cache.load_circuit("tally").await.unwrap_err();
    assert!(matches!(err, BallotError::ArtifactUnavailable { .. }));
    assert_eq!(fixture.source().fetch_count(), 0);
}

#[tokio::test]
async fn test_verification_key_is_memoized() {
    let fixture = Fixture::fast();

    let first = fixture.cache.fetch_verification_key(CIRCUIT_NAME).await.unwrap();
    let second = fixture.cache.fetch_verification_key(CIRCUIT_NAME).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(fixture.source().fetch_count(), 1);
    assert_eq!(first.document().k, MIN_K);
}

#[tokio::test]
async fn test_unsatisfiable_input_is_proof_generation_failure() {
    let fixture = Fixture::fast();
    let (voter, candidate, context) = ballot("C1");
    let salt = commitment::generate_salt();

    let other = CandidateId::parse("C2").unwrap();
    let input = VoteCircuitInput::assemble(
        voter.clone(),
        candidate,
        context.clone(),
        salt,
        commitment::nullifier_hash(&voter, context.election()),
        commitment::commitment_hash(&voter, &other, context.election(), &salt),
    );

    let err = fixture.generator().prove_input(input).await.unwrap_err();
    assert!(matches!(err, BallotError::ProofGenerationFailure(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_prove_input_with_fixed_salt() {
    let fixture = Fixture::fast();
    let (voter, candidate, context) = ballot("C1");
    let input = VoteCircuitInput::derive(
        voter,
        candidate,
        context,
        Salt::from_field(halo2curves::pasta::Fp::from(99)),
    );
    let expected = input.public_signals();

    let generated = fixture.generator().prove_input(input).await.unwrap();
    assert_eq!(generated.public_signals, expected);
}
