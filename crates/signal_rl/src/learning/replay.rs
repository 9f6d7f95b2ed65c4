//! Bounded experience replay.

use crate::action::SignalAction;
use crate::error::{Error, ModelLoadError, PersistenceError, Result};
use crate::persistence::{atomic_write, PersistenceOptions};
use crate::types::{StateVector, Timestamp};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;

/// Schema version of saved experience buffers.
pub const BUFFER_SCHEMA_VERSION: u32 = 1;

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state: StateVector,
    pub action: SignalAction,
    pub reward: f64,
    pub next_state: StateVector,
    /// `true` if the episode ended with this transition.
    pub terminal: bool,
    pub timestamp: Timestamp,
}

impl Experience {
    pub fn new(
        state: StateVector,
        action: SignalAction,
        reward: f64,
        next_state: StateVector,
        terminal: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            terminal,
            timestamp: Timestamp::now(),
        }
    }

    /// Checks vector lengths and reward finiteness.
    pub fn validate(&self, state_size: usize) -> Result<()> {
        if self.state.len() != state_size {
            return Err(Error::DimensionMismatch {
                context: "experience state",
                expected: state_size,
                found: self.state.len(),
            });
        }
        if self.next_state.len() != state_size {
            return Err(Error::DimensionMismatch {
                context: "experience next_state",
                expected: state_size,
                found: self.next_state.len(),
            });
        }
        if !self.reward.is_finite() {
            return Err(Error::InvalidExperience(format!(
                "reward {} is not finite",
                self.reward
            )));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct BufferFile {
    schema_version: u32,
    state_size: usize,
    experiences: Vec<Experience>,
}

/// A ring buffer of experiences with uniform sampling.
///
/// Pushing into a full buffer evicts the oldest entry. Sampling copies entries
/// and never removes them.
#[derive(Debug, Clone)]
pub struct ExperienceBuffer {
    entries: VecDeque<Experience>,
    capacity: usize,
    rng: StdRng,
}

impl ExperienceBuffer {
    pub fn new(capacity: usize, rng: StdRng) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            rng,
        }
    }

    /// Appends an experience, evicting the oldest one at capacity.
    pub fn push(&mut self, experience: Experience) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            log::trace!("Experience buffer at capacity {}, evicted oldest", self.capacity);
        }
        self.entries.push_back(experience);
    }

    /// Draws `batch_size` distinct entries uniformly at random.
    ///
    /// Returns an empty batch when fewer than `batch_size` entries are stored.
    pub fn sample(&mut self, batch_size: usize) -> Vec<Experience> {
        if batch_size == 0 || self.entries.len() < batch_size {
            return Vec::new();
        }
        rand::seq::index::sample(&mut self.rng, self.entries.len(), batch_size)
            .into_iter()
            .map(|i| self.entries[i].clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Writes the buffer to `path` atomically.
    pub fn save_to_file(
        &self,
        path: &Path,
        state_size: usize,
        options: &PersistenceOptions,
    ) -> std::result::Result<(), PersistenceError> {
        let file = BufferFile {
            schema_version: BUFFER_SCHEMA_VERSION,
            state_size,
            experiences: self.entries.iter().cloned().collect(),
        };
        let bytes = options.to_bytes(&file)?;
        atomic_write(path, &bytes)?;
        log::info!(
            "Saved {} experiences to {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    /// Replaces the buffer contents with a saved buffer.
    ///
    /// Every experience must match `state_size`. If the file holds more entries
    /// than the capacity, only the newest are kept. Returns the number loaded.
    pub fn load_from_file(&mut self, path: &Path, state_size: usize) -> Result<usize> {
        let bytes = std::fs::read(path).map_err(ModelLoadError::Io)?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| ModelLoadError::Malformed(e.to_string()))?;
        let version = value
            .get("schema_version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ModelLoadError::Malformed("missing schema_version".into()))?;
        if version != BUFFER_SCHEMA_VERSION as u64 {
            return Err(ModelLoadError::UnsupportedSchema {
                found: version,
                supported: BUFFER_SCHEMA_VERSION,
            }
            .into());
        }
        let file: BufferFile = serde_json::from_value(value)
            .map_err(|e| ModelLoadError::Malformed(e.to_string()))?;
        if file.state_size != state_size {
            return Err(ModelLoadError::DimensionMismatch {
                field: "state_size",
                expected: state_size,
                found: file.state_size,
            }
            .into());
        }
        for experience in &file.experiences {
            experience.validate(state_size)?;
        }

        let skip = file.experiences.len().saturating_sub(self.capacity);
        self.entries = file.experiences.into_iter().skip(skip).collect();
        log::info!(
            "Loaded {} experiences from {}",
            self.entries.len(),
            path.display()
        );
        Ok(self.entries.len())
    }
}
