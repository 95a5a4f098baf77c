//! Rotating API credential pool
//!
//! One pool per source, shared by every worker of a run. The cursor only
//! moves forward; once it passes the last credential the pool is exhausted
//! for the remainder of the run. Rotation is compare-and-advance: a worker
//! only moves the cursor off the credential its own attempt used, so two
//! workers rate-limited on the same key advance it once.

use crate::config::CredentialEntry;
use crate::{HarvestError, Result};
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// One API key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: String,
    pub secret: String,
}

/// Fixed list of credentials with a synchronized rotation cursor
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    cursor: Mutex<usize>,
}

impl CredentialPool {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials,
            cursor: Mutex::new(0),
        }
    }

    /// Builds a pool from configured entries; `None` when there are none
    pub fn from_config(entries: &[CredentialEntry]) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }

        Some(Self::new(
            entries
                .iter()
                .map(|e| Credential {
                    id: e.id.clone(),
                    secret: e.secret.clone(),
                })
                .collect(),
        ))
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Index of the credential currently in use
    pub fn position(&self) -> usize {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The credential currently in use
    pub fn current(&self) -> Result<Credential> {
        let cursor = self.position();
        self.credentials
            .get(cursor)
            .cloned()
            .ok_or(HarvestError::CredentialPoolExhausted {
                pool_size: self.len(),
            })
    }

    /// Moves past the credential at `used`, unless another caller already did
    ///
    /// Returns the credential now current. Fails with
    /// `CredentialPoolExhausted` once every credential has been used.
    pub fn rotate_from(&self, used: usize) -> Result<Credential> {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        if *cursor == used && *cursor < self.credentials.len() {
            *cursor += 1;
            if let Some(next) = self.credentials.get(*cursor) {
                info!(
                    "Rotated to credential {}/{} ({})",
                    *cursor + 1,
                    self.credentials.len(),
                    next.id
                );
            }
        }

        self.credentials
            .get(*cursor)
            .cloned()
            .ok_or(HarvestError::CredentialPoolExhausted {
                pool_size: self.credentials.len(),
            })
    }
}
