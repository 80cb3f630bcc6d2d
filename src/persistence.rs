//! File-based model bundle: a JSON topology manifest, a little-endian f32
//! weights blob and a plain-text epsilon. The three are written and read as
//! a matched set: the manifest records the blake3 digest of the blob and the
//! epsilon it was saved with, and `load` refuses a bundle whose files came
//! from different saves.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dqn::QNetwork;
use crate::error::{Error, Result};
use crate::network::{Tensor, Weights};

pub const MANIFEST_FILE: &str = "model.json";
pub const WEIGHTS_FILE: &str = "model.weights.bin";
pub const EPSILON_FILE: &str = "epsilon.txt";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u32,              // FORMAT_VERSION
    topology: Vec<usize>,      // layer widths, input first
    tensors: Vec<TensorEntry>, // layout of model.weights.bin
    // hex blake3 of model.weights.bin
    weights_blake3: String,
    // must equal epsilon.txt
    epsilon: f32,
}

/// Where one tensor lives in the weights blob, in f32 elements.
#[derive(Debug, Serialize, Deserialize)]
struct TensorEntry {
    name: String,
    shape: Vec<usize>,
    offset: usize,
    len: usize,
}

/// Everything `load` read back. Applied to a live model with
/// `TrainingScheduler::restore`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBundle {
    pub topology: Vec<usize>, // must match the live network
    pub weights: Weights,     // online network parameters
    pub epsilon: f32,         // exploration rate at save time
}

pub fn bundle_paths(dir: &Path) -> [PathBuf; 3] {
    [dir.join(MANIFEST_FILE), dir.join(WEIGHTS_FILE), dir.join(EPSILON_FILE)]
}

/// True when all three artifacts are present.
pub fn bundle_exists(dir: impl AsRef<Path>) -> bool {
    bundle_paths(dir.as_ref()).iter().all(|p| p.is_file())
}

/// Writes the online network and epsilon into `dir`.
///
/// Each artifact goes to a temporary file first and is renamed into place
/// only after all three were written. The manifest goes last. If a rename
/// fails halfway the directory holds files from two saves, which `load`
/// reports as [`Error::MalformedBundle`] instead of mixing them.
pub fn save(dir: impl AsRef<Path>, q: &QNetwork, epsilon: f32) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    // flatten every tensor into one LE f32 blob, recording offsets
    let weights = q.weights();
    let mut entries = Vec::with_capacity(weights.tensors.len());
    let mut blob = Vec::with_capacity(weights.len() * 4);
    let mut offset = 0;
    for t in &weights.tensors {
        entries.push(TensorEntry { name: t.name.clone(), shape: t.shape.clone(), offset, len: t.data.len() });
        for v in &t.data {
            blob.extend_from_slice(&v.to_le_bytes());
        }
        offset += t.data.len();
    }
    let manifest = Manifest {
        version: FORMAT_VERSION,
        topology: q.topology(),
        tensors: entries,
        weights_blake3: blake3::hash(&blob).to_hex().to_string(),
        epsilon,
    };

    // manifest is renamed last
    let [manifest_path, weights_path, eps_path] = bundle_paths(dir);
    let staged = [
        (tmp_path(&weights_path), weights_path, blob),
        (tmp_path(&eps_path), eps_path, format!("{epsilon}\n").into_bytes()),
        (tmp_path(&manifest_path), manifest_path, serde_json::to_vec_pretty(&manifest)?),
    ];

    for (tmp, _, bytes) in &staged {
        if let Err(e) = fs::write(tmp, bytes) {
            discard(&staged);
            return Err(e.into());
        }
    }
    for (tmp, dst, _) in &staged {
        if let Err(e) = fs::rename(tmp, dst) {
            discard(&staged);
            return Err(e.into());
        }
    }
    log::info!("saved model bundle to {} (epsilon={epsilon:.4})", dir.display());
    Ok(())
}

/// Reads a bundle from `dir`. Touches no live model.
pub fn load(dir: impl AsRef<Path>) -> Result<ModelBundle> {
    let dir = dir.as_ref();
    let [manifest_path, weights_path, eps_path] = bundle_paths(dir);
    for p in [&manifest_path, &weights_path, &eps_path] {
        if !p.is_file() {
            return Err(Error::IncompleteBundle { missing: p.clone() });
        }
    }

    let manifest: Manifest = serde_json::from_slice(&fs::read(&manifest_path)?)
        .map_err(|e| Error::MalformedBundle(format!("{MANIFEST_FILE}: {e}")))?;
    if manifest.version != FORMAT_VERSION {
        return Err(Error::MalformedBundle(format!(
            "{MANIFEST_FILE}: unsupported version {}",
            manifest.version
        )));
    }

    let blob = fs::read(&weights_path)?;
    // blob and manifest must come from the same save
    if blake3::hash(&blob).to_hex().as_str() != manifest.weights_blake3 {
        return Err(Error::MalformedBundle(format!("{WEIGHTS_FILE}: digest does not match {MANIFEST_FILE}")));
    }
    let values = decode_f32_le(&blob)?;
    let mut tensors = Vec::with_capacity(manifest.tensors.len());
    let mut expected_len = 0;
    for e in manifest.tensors {
        let end = e.offset.checked_add(e.len).filter(|&end| end <= values.len()).ok_or_else(|| {
            Error::MalformedBundle(format!("{WEIGHTS_FILE}: tensor {} out of range", e.name))
        })?;
        if e.shape.iter().product::<usize>() != e.len {
            return Err(Error::MalformedBundle(format!("{MANIFEST_FILE}: tensor {} shape/len mismatch", e.name)));
        }
        expected_len += e.len;
        tensors.push(Tensor { name: e.name, shape: e.shape, data: values[e.offset..end].to_vec() });
    }
    if expected_len != values.len() {
        return Err(Error::MalformedBundle(format!(
            "{WEIGHTS_FILE}: {} values, manifest describes {expected_len}",
            values.len()
        )));
    }

    // plain-text epsilon, cross-checked against the manifest
    let eps_text = fs::read_to_string(&eps_path)?;
    let epsilon: f32 = eps_text
        .trim()
        .parse()
        .map_err(|e| Error::MalformedBundle(format!("{EPSILON_FILE}: {e}")))?;
    if !epsilon.is_finite() || !(0.0..=1.0).contains(&epsilon) {
        return Err(Error::MalformedBundle(format!("{EPSILON_FILE}: {epsilon} not in [0, 1]")));
    }
    if epsilon != manifest.epsilon {
        return Err(Error::MalformedBundle(format!(
            "{EPSILON_FILE}: {epsilon} does not match {MANIFEST_FILE} ({})",
            manifest.epsilon
        )));
    }

    Ok(ModelBundle { topology: manifest.topology, weights: Weights { tensors }, epsilon })
}

// -------- helpers (module-private) --------

fn tmp_path(p: &Path) -> PathBuf {
    let mut s = p.as_os_str().to_owned();
    s.push(".tmp");
    PathBuf::from(s)
}

fn discard(staged: &[(PathBuf, PathBuf, Vec<u8>)]) {
    for (tmp, _, _) in staged {
        let _ = fs::remove_file(tmp);
    }
}

fn decode_f32_le(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::MalformedBundle(format!(
            "{WEIGHTS_FILE}: length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
