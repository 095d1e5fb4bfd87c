//! Persisted model bundles and the load-or-train lifecycle.
//!
//! Each predictor owns one bundle file in the model directory. A bundle is
//! written whole to a temporary sibling and renamed into place, so a reader
//! sees either the previous bundle or the new one. Any failure to read a
//! bundle back (missing file, corrupt bytes, another format version, a
//! payload that fails its own consistency check) is logged and answered
//! with a full retrain; it never reaches the caller.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::error::{ArtifactLoadError, Result};

const MAGIC: [u8; 4] = *b"RPMB";

/// A fitted bundle that can be persisted by [`ArtifactStore`].
pub trait Artifact: Serialize + DeserializeOwned {
    /// File stem and identity check on load.
    const KIND: &'static str;
    /// Bump when the payload layout changes; older files are retrained.
    const FORMAT_VERSION: u32;

    fn check(&self) -> std::result::Result<(), String>;
}

#[derive(Serialize, Deserialize)]
struct Header {
    magic: [u8; 4],
    kind: String,
    format_version: u32,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, kind: &str) -> PathBuf {
        self.dir.join(format!("{kind}.bin"))
    }

    pub fn load<B: Artifact>(&self) -> std::result::Result<B, ArtifactLoadError> {
        let path = self.path_for(B::KIND);
        let shown = path.display().to_string();
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactLoadError::Missing(shown));
            }
            Err(e) => {
                return Err(ArtifactLoadError::Corrupt {
                    path: shown,
                    reason: e.to_string(),
                })
            }
        };
        let corrupt = |reason: String| ArtifactLoadError::Corrupt {
            path: shown.clone(),
            reason,
        };

        // slice decoding checks every length prefix against the bytes left
        let header: Header = bincode::deserialize(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if header.magic != MAGIC {
            return Err(corrupt("bad magic".into()));
        }
        if header.kind != B::KIND || header.format_version != B::FORMAT_VERSION {
            return Err(ArtifactLoadError::Incompatible {
                path: shown,
                reason: format!(
                    "found {} v{}, expected {} v{}",
                    header.kind,
                    header.format_version,
                    B::KIND,
                    B::FORMAT_VERSION
                ),
            });
        }
        let offset = bincode::serialized_size(&header).map_err(|e| corrupt(e.to_string()))? as usize;
        let body = &bytes[offset..];
        let bundle: B = bincode::deserialize(body).map_err(|e| corrupt(e.to_string()))?;
        let used = bincode::serialized_size(&bundle).map_err(|e| corrupt(e.to_string()))? as usize;
        if used != body.len() {
            return Err(corrupt(format!("{} trailing bytes", body.len().saturating_sub(used))));
        }
        bundle
            .check()
            .map_err(|reason| ArtifactLoadError::Inconsistent { path: shown, reason })?;
        Ok(bundle)
    }

    /// Writes the whole bundle or nothing.
    pub fn save<B: Artifact>(&self, bundle: &B) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(B::KIND);
        let tmp = self.dir.join(format!(".{}.bin.tmp", B::KIND));

        let header = Header {
            magic: MAGIC,
            kind: B::KIND.to_string(),
            format_version: B::FORMAT_VERSION,
        };
        let mut bytes = bincode::serialize(&header)?;
        bincode::serialize_into(&mut bytes, bundle)?;

        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &path)?;
        tracing::info!("saved {} bundle to {} ({} bytes)", B::KIND, path.display(), bytes.len());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Loading,
    Training,
    Ready,
}

/// How the bundle handed out by [`ModelLifecycle::resolve`] came to be.
#[derive(Debug)]
pub enum Provenance {
    Loaded,
    Retrained { cause: ArtifactLoadError },
}

#[derive(Debug)]
pub struct Resolved<B> {
    pub bundle: B,
    pub provenance: Provenance,
}

/// Load-or-train state machine for one bundle kind. `resolve` calls are
/// serialized by `gate`, so concurrent first callers wait for one training
/// run and then load its bundle. `state` is readable at any time.
pub struct ModelLifecycle<B> {
    store: ArtifactStore,
    gate: Mutex<()>,
    state: Mutex<LifecycleState>,
    _bundle: PhantomData<fn() -> B>,
}

impl<B: Artifact> ModelLifecycle<B> {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            gate: Mutex::new(()),
            state: Mutex::new(LifecycleState::Uninitialized),
            _bundle: PhantomData,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    fn set(&self, next: LifecycleState) {
        let mut state = self.state.lock();
        tracing::debug!("{} lifecycle {:?} -> {:?}", B::KIND, *state, next);
        *state = next;
    }

    /// Loads the persisted bundle, or retrains with `train` and persists the
    /// result. Only a failing `train` is returned as an error.
    pub fn resolve(&self, train: impl FnOnce() -> Result<B>) -> Result<Resolved<B>> {
        let _held = self.gate.lock();
        self.set(LifecycleState::Loading);
        let cause = match self.store.load::<B>() {
            Ok(bundle) => {
                tracing::info!("loaded cached {} bundle", B::KIND);
                self.set(LifecycleState::Ready);
                return Ok(Resolved {
                    bundle,
                    provenance: Provenance::Loaded,
                });
            }
            Err(e) => e,
        };

        tracing::warn!("{} bundle not usable ({}): {}; retraining", B::KIND, cause.kind(), cause);
        self.set(LifecycleState::Training);
        let bundle = match train() {
            Ok(b) => b,
            Err(e) => {
                self.set(LifecycleState::Uninitialized);
                return Err(e);
            }
        };
        if let Err(e) = self.store.save(&bundle) {
            tracing::error!("could not persist {} bundle: {}", B::KIND, e);
        }
        self.set(LifecycleState::Ready);
        Ok(Resolved {
            bundle,
            provenance: Provenance::Retrained { cause },
        })
    }
}
