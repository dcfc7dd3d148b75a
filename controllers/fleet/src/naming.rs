//! Object naming.
//!
//! Child resources get deterministic names derived from their parent so a
//! repeated composition pass lands on the same objects. Only fleet members are
//! named randomly, so concurrent scale-ups of different fleets cannot collide.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

const ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Largest multiple of the alphabet size that fits in a byte; bytes at or
/// above it are discarded so every character is equally likely.
const ACCEPT_BELOW: u8 = 252;

pub const SUFFIX_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum NamingError {
    #[error("entropy source failed: {0}")]
    Entropy(String),
}

/// `len` characters drawn uniformly from `[a-z0-9]`.
pub fn random_suffix_with<R: RngCore + ?Sized>(rng: &mut R, len: usize) -> Result<String, NamingError> {
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 16];
    while out.len() < len {
        rng.try_fill_bytes(&mut buf)
            .map_err(|e| NamingError::Entropy(e.to_string()))?;
        for b in buf {
            if b < ACCEPT_BELOW && out.len() < len {
                out.push(ALPHABET[usize::from(b % 36)] as char);
            }
        }
    }
    Ok(out)
}

pub struct NamingService {
    prefix: String,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl fmt::Debug for NamingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamingService")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl NamingService {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_rng(prefix, Box::new(OsRng))
    }

    pub fn with_rng(prefix: impl Into<String>, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            prefix: prefix.into(),
            rng: Mutex::new(rng),
        }
    }

    /// Fresh name for a fleet member. Entropy failure is returned, never
    /// papered over with a weaker source.
    pub fn fleet_member_name(&self) -> Result<String, NamingError> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let suffix = random_suffix_with(rng.as_mut(), SUFFIX_LEN)?;
        Ok(format!("{}{}", self.prefix, suffix))
    }
}

pub fn control_plane_template_name(cluster: &str) -> String {
    format!("{cluster}-control-plane")
}

/// Machine template and deployment name for one node pool
pub fn pool_name(cluster: &str, pool: &str) -> String {
    format!("{cluster}-{pool}")
}

pub fn kubeconfig_secret_name(cluster: &str) -> String {
    format!("{cluster}-kubeconfig")
}

pub fn vnet_name(cluster: &str) -> String {
    format!("{cluster}-vnet")
}
