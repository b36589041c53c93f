//! Artifact generation
//!
//! Produces the files a distribution service hosts for one circuit. halo2_proofs
//! 0.3 doesn't support stable key serialization, so only the IPA parameters and
//! a verification key document are written; keys are derived again on load.

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use halo2_proofs::poly::commitment::Params;
use halo2curves::pasta::EqAffine;
use tracing::info;
use vote_circuit::{CIRCUIT_NAME, MIN_K};
use zkballot_verifier::VerificationKeyDocument;

use crate::artifacts::{ArtifactKind, DirectoryArtifactSource};

/// Writes `circuits/{name}/{name}_final.zkey` and
/// `circuits/{name}/{name}_verification_key.json` under `root`.
pub fn write_artifacts<P: AsRef<Path>>(
    root: P,
    name: &str,
    k: u32,
) -> Result<VerificationKeyDocument> {
    if name != CIRCUIT_NAME {
        bail!("no compiled circuit named '{}'", name);
    }
    if k < MIN_K {
        bail!("k = {} is too small for circuit '{}' (minimum {})", k, name, MIN_K);
    }

    let layout = DirectoryArtifactSource::new(root.as_ref());
    let params_path = layout.path_for(name, ArtifactKind::ProvingParams);
    let key_path = layout.path_for(name, ArtifactKind::VerificationKey);

    if let Some(dir) = params_path.parent() {
        fs::create_dir_all(dir).context("Failed to create artifact directory")?;
    }

    info!(circuit = name, k, "generating IPA parameters");
    let params = Params::<EqAffine>::new(k);
    save_params(&params, &params_path)?;

    let document = VerificationKeyDocument::for_params(name, &params)?;
    let json = document.to_json()?;
    fs::write(&key_path, json)
        .context(format!("Failed to write verification key at {:?}", key_path))?;
    info!(path = ?key_path, "saved verification key document");

    Ok(document)
}

fn save_params(params: &Params<EqAffine>, path: &Path) -> Result<()> {
    let mut file =
        fs::File::create(path).context(format!("Failed to create params file at {:?}", path))?;

    params.write(&mut file).context("Failed to write params")?;

    info!(path = ?path, "saved IPA parameters");
    Ok(())
}
