//! Content fingerprints and the on-disk fingerprint store.
//!
//! A fingerprint is a BLAKE3 digest over a task's identity, its command, the
//! contents of its resolved input files and the fingerprints of its direct
//! upstream tasks. Upstream fingerprints already cover their own upstreams,
//! so a change anywhere below a task reaches it without rehashing those files.
//!
//! Records are stored one file per task under the cache directory and are
//! replaced atomically. A missing, corrupt or foreign record simply reads as
//! "changed", which is why deleting the whole directory is always safe.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Error, Result};
use crate::fs_util::write_atomic;
use crate::package::TaskId;
use crate::patterns::{leaves_base, PatternSet};
use crate::task_graph::TaskNode;

const FORMAT_TAG: &[u8] = b"strata-fingerprint-v1";
const RECORD_VERSION: u32 = 1;
const READ_BUFFER_SIZE: usize = 8192;

/// Hex-encoded BLAKE3 digest identifying the exact state of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve hex digits, for display.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<blake3::Hash> for Fingerprint {
    fn from(hash: blake3::Hash) -> Self {
        Fingerprint(hash.to_hex().to_string())
    }
}

/// Persisted state of a task's last successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub version: u32,
    pub id: TaskId,
    pub digest: Fingerprint,
    /// Output files produced by the run, relative to the package directory.
    pub outputs: Vec<String>,
}

/// Length-prefixed field so adjacent fields can never run together.
fn write_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn hash_file(path: &Path) -> std::io::Result<blake3::Hash> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize())
}

fn compile(node: &TaskNode, patterns: &[String]) -> Result<PatternSet> {
    if let Some(outside) = patterns.iter().find(|p| leaves_base(p)) {
        return Err(Error::config(
            &node.package_dir,
            format!(
                "Pattern '{}' of {} points outside the package directory",
                outside, node.id
            ),
        ));
    }
    PatternSet::new(patterns).map_err(|e| {
        Error::config(
            &node.package_dir,
            format!("Invalid path pattern in {}: {}", node.id, e),
        )
    })
}

/// Store of fingerprint records under one cache directory.
#[derive(Debug, Clone)]
pub struct FingerprintStore {
    cache_dir: PathBuf,
}

impl FingerprintStore {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Resolves the input files of `node`, sorted by relative path.
    ///
    /// Files matching the node's output patterns are never inputs.
    pub fn resolve_inputs(&self, node: &TaskNode) -> Result<Vec<String>> {
        let outputs = compile(node, &node.outputs)?;
        let inputs = compile(node, &node.inputs)?.excluding(&outputs);
        inputs.resolve(&node.package_dir).map_err(|source| Error::InputIo {
            task: node.id.clone(),
            path: node.package_dir.clone(),
            source,
        })
    }

    /// Computes the fingerprint of `node` given the fingerprints of its
    /// direct predecessors in the current run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InputIo`] naming the task and file if an input cannot
    /// be read.
    pub fn fingerprint_of(
        &self,
        node: &TaskNode,
        upstream: &BTreeMap<TaskId, Fingerprint>,
    ) -> Result<Fingerprint> {
        let files = self.resolve_inputs(node)?;

        let file_hashes: Vec<(String, blake3::Hash)> = files
            .into_par_iter()
            .map(|relative| {
                let path = node.package_dir.join(&relative);
                hash_file(&path)
                    .map(|hash| (relative, hash))
                    .map_err(|source| Error::InputIo {
                        task: node.id.clone(),
                        path,
                        source,
                    })
            })
            .collect::<Result<_>>()?;

        let mut hasher = blake3::Hasher::new();
        write_field(&mut hasher, FORMAT_TAG);
        write_field(&mut hasher, node.id.package.as_bytes());
        write_field(&mut hasher, node.id.task.as_bytes());
        write_field(&mut hasher, node.runner.as_bytes());
        write_field(&mut hasher, node.command.as_bytes());

        hasher.update(&(file_hashes.len() as u64).to_le_bytes());
        for (relative, hash) in &file_hashes {
            write_field(&mut hasher, relative.as_bytes());
            hasher.update(hash.as_bytes());
        }

        hasher.update(&(node.outputs.len() as u64).to_le_bytes());
        for pattern in &node.outputs {
            write_field(&mut hasher, pattern.as_bytes());
        }

        hasher.update(&(upstream.len() as u64).to_le_bytes());
        for (id, fingerprint) in upstream {
            write_field(&mut hasher, id.to_string().as_bytes());
            write_field(&mut hasher, fingerprint.as_str().as_bytes());
        }

        let fingerprint = Fingerprint::from(hasher.finalize());
        debug!(
            task = %node.id,
            inputs = file_hashes.len(),
            fingerprint = fingerprint.short(),
            "computed fingerprint"
        );
        Ok(fingerprint)
    }

    /// True iff a valid record with the same digest exists and every output
    /// it recorded is still on disk.
    pub fn is_up_to_date(&self, node: &TaskNode, fingerprint: &Fingerprint) -> Result<bool> {
        let Some(record) = self.load(&node.id)? else {
            return Ok(false);
        };
        if &record.digest != fingerprint {
            return Ok(false);
        }
        let missing = record
            .outputs
            .iter()
            .find(|output| !node.package_dir.join(output).exists());
        if let Some(output) = missing {
            debug!(task = %node.id, output = %output, "recorded output is missing");
            return Ok(false);
        }
        Ok(true)
    }

    /// Persists `fingerprint` for `node` together with its resolved outputs.
    pub fn record(&self, node: &TaskNode, fingerprint: &Fingerprint) -> Result<()> {
        let outputs = compile(node, &node.outputs)?
            .resolve(&node.package_dir)
            .map_err(Error::Io)?;

        let record = FingerprintRecord {
            version: RECORD_VERSION,
            id: node.id.clone(),
            digest: fingerprint.clone(),
            outputs,
        };
        let bytes = bincode::serialize(&record).map_err(|e| Error::Cache {
            message: format!("Failed to serialize record for {}: {}", node.id, e),
        })?;

        write_atomic(&self.record_path(&node.id), &bytes)
    }

    /// Reads the record of `id`. Unreadable or mismatching records read as
    /// absent.
    pub fn load(&self, id: &TaskId) -> Result<Option<FingerprintRecord>> {
        let path = self.record_path(id);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };

        let record: FingerprintRecord = match bincode::deserialize(&content) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    task = %id,
                    path = %path.display(),
                    error = %e,
                    "ignoring corrupt fingerprint record"
                );
                return Ok(None);
            }
        };

        if record.version != RECORD_VERSION || &record.id != id {
            warn!(
                task = %id,
                path = %path.display(),
                "ignoring fingerprint record of another format or task"
            );
            return Ok(None);
        }

        Ok(Some(record))
    }

    pub fn remove(&self, id: &TaskId) -> Result<()> {
        match fs::remove_file(self.record_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Deletes the whole store.
    pub fn clear(&self) -> Result<()> {
        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir)?;
        }
        Ok(())
    }

    pub fn record_path(&self, id: &TaskId) -> PathBuf {
        let key = xxh3_64(id.to_string().as_bytes());
        self.cache_dir.join(format!(
            "{}-{}-{:016x}.bin",
            sanitize(&id.package),
            sanitize(&id.task),
            key
        ))
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
