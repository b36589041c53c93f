//! Circuit artifact loading and caching
//!
//! Artifacts come from an [`ArtifactSource`] laid out as
//! `circuits/{name}/{name}_final.zkey` (serialized IPA parameters) and
//! `circuits/{name}/{name}_verification_key.json`. The [`ArtifactCache`] loads
//! each of them at most once per process and shares the result.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use halo2_proofs::{
    plonk::{keygen_pk, keygen_vk, ProvingKey, VerifyingKey},
    poly::commitment::Params,
};
use halo2curves::pasta::EqAffine;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};
use vote_circuit::{VoteCircuit, CIRCUIT_NAME};
use zkballot_runtime::{BallotError, Result};
use zkballot_verifier::{VerificationKey, VerificationKeyDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    ProvingParams,
    VerificationKey,
}

impl ArtifactKind {
    pub fn file_name(self, circuit: &str) -> String {
        match self {
            Self::ProvingParams => format!("{}_final.zkey", circuit),
            Self::VerificationKey => format!("{}_verification_key.json", circuit),
        }
    }

    /// Path relative to the root of a distribution service
    pub fn relative_path(self, circuit: &str) -> String {
        format!("circuits/{}/{}", circuit, self.file_name(circuit))
    }
}

/// Where artifact bytes come from.
pub trait ArtifactSource: Send + Sync + 'static {
    fn fetch(
        &self,
        circuit: &str,
        kind: ArtifactKind,
    ) -> impl Future<Output = anyhow::Result<Vec<u8>>> + Send;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_fetch_timeout() -> u64 {
    30_000
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self { base_url: default_base_url(), fetch_timeout_ms: default_fetch_timeout() }
    }
}

impl ArtifactConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Fetches artifacts over HTTP(S) from a static distribution service.
#[derive(Debug, Clone)]
pub struct HttpArtifactSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpArtifactSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn url_for(&self, circuit: &str, kind: ArtifactKind) -> String {
        format!("{}/{}", self.base_url, kind.relative_path(circuit))
    }
}

impl ArtifactSource for HttpArtifactSource {
    async fn fetch(&self, circuit: &str, kind: ArtifactKind) -> anyhow::Result<Vec<u8>> {
        let url = self.url_for(circuit, kind);
        debug!(%url, "fetching artifact");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("{} returned an error status", url))?;

        let bytes =
            response.bytes().await.with_context(|| format!("failed to read body of {}", url))?;
        Ok(bytes.to_vec())
    }
}

/// Reads artifacts from a local directory with the same layout as the
/// distribution service.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactSource {
    root: PathBuf,
}

impl DirectoryArtifactSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn path_for(&self, circuit: &str, kind: ArtifactKind) -> PathBuf {
        self.root.join("circuits").join(circuit).join(kind.file_name(circuit))
    }
}

impl ArtifactSource for DirectoryArtifactSource {
    async fn fetch(&self, circuit: &str, kind: ArtifactKind) -> anyhow::Result<Vec<u8>> {
        let path = self.path_for(circuit, kind);
        tokio::fs::read(&path).await.with_context(|| format!("failed to read {:?}", path))
    }
}

/// Proving material for one circuit: parameters plus the keys derived from
/// them and the compiled circuit.
pub struct CircuitArtifact {
    name: String,
    params: Params<EqAffine>,
    pk: ProvingKey<EqAffine>,
}

impl CircuitArtifact {
    /// Decodes a `.zkey` blob and runs keygen. CPU-bound.
    pub fn from_params_bytes(name: &str, bytes: &[u8]) -> Result<Self> {
        if name != CIRCUIT_NAME {
            return Err(BallotError::artifact_unavailable(
                name,
                format!("no compiled circuit named '{}'", name),
            ));
        }

        let params = Params::<EqAffine>::read(&mut &bytes[..]).map_err(|e| {
            BallotError::artifact_unavailable(name, format!("undecodable parameters: {}", e))
        })?;

        Self::from_params(name, params)
    }

    pub fn from_params(name: &str, params: Params<EqAffine>) -> Result<Self> {
        let circuit = VoteCircuit::default();
        let incompatible = |e: halo2_proofs::plonk::Error| {
            BallotError::artifact_unavailable(name, format!("incompatible parameters: {:?}", e))
        };

        let vk = keygen_vk(&params, &circuit).map_err(incompatible)?;
        let pk = keygen_pk(&params, vk, &circuit).map_err(incompatible)?;

        Ok(Self { name: name.to_string(), params, pk })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &Params<EqAffine> {
        &self.params
    }

    pub fn proving_key(&self) -> &ProvingKey<EqAffine> {
        &self.pk
    }

    pub fn verifying_key(&self) -> &VerifyingKey<EqAffine> {
        self.pk.get_vk()
    }
}

impl fmt::Debug for CircuitArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitArtifact")
            .field("name", &self.name)
            .field("k", &self.params.k())
            .finish_non_exhaustive()
    }
}

type Slot<T> = Arc<OnceCell<Arc<T>>>;

/// In-memory, per-process cache of circuit artifacts and verification keys.
///
/// Concurrent first loads of the same name share one fetch. Failed loads are
/// not remembered, so the next call fetches again.
pub struct ArtifactCache<S> {
    source: S,
    fetch_timeout: Duration,
    circuits: Mutex<HashMap<String, Slot<CircuitArtifact>>>,
    keys: Mutex<HashMap<String, Slot<VerificationKey>>>,
}

impl<S: ArtifactSource> ArtifactCache<S> {
    pub fn new(source: S, config: &ArtifactConfig) -> Self {
        Self::with_timeout(source, config.fetch_timeout())
    }

    pub fn with_timeout(source: S, fetch_timeout: Duration) -> Self {
        Self {
            source,
            fetch_timeout,
            circuits: Mutex::new(HashMap::new()),
            keys: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn load_circuit(&self, name: &str) -> Result<Arc<CircuitArtifact>> {
        let slot = Self::slot(&self.circuits, name).await?;
        slot.get_or_try_init(|| self.fetch_circuit(name)).await.cloned()
    }

    pub async fn fetch_verification_key(&self, name: &str) -> Result<Arc<VerificationKey>> {
        let slot = Self::slot(&self.keys, name).await?;
        slot.get_or_try_init(|| self.fetch_key(name)).await.cloned()
    }

    /// True once `name` has been loaded successfully.
    pub async fn is_cached(&self, name: &str) -> bool {
        self.circuits.lock().await.get(name).is_some_and(|slot| slot.initialized())
    }

    /// Only compiled circuits get a slot, so arbitrary names never grow the maps.
    async fn slot<T>(map: &Mutex<HashMap<String, Slot<T>>>, name: &str) -> Result<Slot<T>> {
        if name != CIRCUIT_NAME {
            return Err(BallotError::artifact_unavailable(
                name,
                format!("no compiled circuit named '{}'", name),
            ));
        }
        Ok(map.lock().await.entry(name.to_string()).or_default().clone())
    }

    async fn fetch_circuit(&self, name: &str) -> Result<Arc<CircuitArtifact>> {
        info!(circuit = name, "loading circuit artifact");
        let bytes = self.fetch_bytes(name, ArtifactKind::ProvingParams).await?;

        let owned = name.to_string();
        let artifact =
            tokio::task::spawn_blocking(move || CircuitArtifact::from_params_bytes(&owned, &bytes))
                .await
                .map_err(|e| {
                    BallotError::artifact_unavailable(name, format!("keygen task failed: {}", e))
                })??;

        info!(circuit = name, k = artifact.params().k(), "circuit artifact ready");
        Ok(Arc::new(artifact))
    }

    async fn fetch_key(&self, name: &str) -> Result<Arc<VerificationKey>> {
        info!(circuit = name, "loading verification key");
        let bytes = self.fetch_bytes(name, ArtifactKind::VerificationKey).await?;
        let document = VerificationKeyDocument::from_json(name, &bytes)?;
        document.validate(name)?;

        let owned = name.to_string();
        let key =
            tokio::task::spawn_blocking(move || VerificationKey::from_document(&owned, document))
                .await
                .map_err(|e| {
                    BallotError::artifact_unavailable(name, format!("keygen task failed: {}", e))
                })??;

        Ok(Arc::new(key))
    }

    async fn fetch_bytes(&self, name: &str, kind: ArtifactKind) -> Result<Vec<u8>> {
        match tokio::time::timeout(self.fetch_timeout, self.source.fetch(name, kind)).await {
            Ok(Ok(bytes)) => {
                debug!(circuit = name, ?kind, size = bytes.len(), "artifact fetched");
                Ok(bytes)
            }
            Ok(Err(e)) => {
                warn!(circuit = name, ?kind, error = %format!("{:#}", e), "artifact fetch failed");
                Err(BallotError::artifact_unavailable(name, format!("{:#}", e)))
            }
            Err(_) => {
                warn!(circuit = name, ?kind, "artifact fetch timed out");
                Err(BallotError::artifact_unavailable(
                    name,
                    format!("fetch timed out after {:?}", self.fetch_timeout),
                ))
            }
        }
    }
}
