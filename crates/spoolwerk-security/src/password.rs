// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Password hashing: PBKDF2-HMAC-SHA256 via `ring`, with a fresh random salt
// per registration drawn from the OS CSPRNG.

use std::num::NonZeroU32;

use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use spoolwerk_core::error::{Result, SpoolError};
use tracing::{debug, instrument};

/// PBKDF2 iteration count for stored credentials.
pub const PBKDF2_ITERATIONS: u32 = 65_536;

/// Length of the derived key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the per-user salt in bytes.
pub const SALT_LEN: usize = 16;

static ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// Deterministic salted key derivation for passwords.
///
/// The iteration count is fixed for the lifetime of a credential database:
/// hashes derived with one count cannot be verified with another.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: NonZeroU32,
}

impl PasswordHasher {
    /// The hasher used for stored credentials.
    pub fn new() -> Self {
        match NonZeroU32::new(PBKDF2_ITERATIONS) {
            Some(iterations) => Self { iterations },
            None => unreachable!("PBKDF2_ITERATIONS is non-zero"),
        }
    }

    /// A hasher with a custom iteration count (tests and benchmarks).
    ///
    /// A zero count is a configuration error, not something to recover from
    /// per call.
    pub fn with_iterations(iterations: u32) -> Result<Self> {
        let iterations = NonZeroU32::new(iterations).ok_or_else(|| {
            SpoolError::InvalidConfig("PBKDF2 iteration count must be non-zero".into())
        })?;
        Ok(Self { iterations })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations.get()
    }

    /// Generate a fresh random salt.
    pub fn generate_salt(&self) -> Result<[u8; SALT_LEN]> {
        let mut salt = [0u8; SALT_LEN];
        SystemRandom::new()
            .fill(&mut salt)
            .map_err(|_| SpoolError::Crypto("system RNG failed to produce a salt".into()))?;
        Ok(salt)
    }

    /// Derive the key for `password` under `salt`.
    #[instrument(skip_all, fields(iterations = self.iterations.get()))]
    pub fn derive(&self, password: &str, salt: &[u8]) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        pbkdf2::derive(ALGORITHM, self.iterations, salt, password.as_bytes(), &mut key);
        debug!("password key derived");
        key
    }

    /// Check `password` against a previously derived key.
    ///
    /// The comparison is constant-time with respect to the key contents.
    #[instrument(skip_all, fields(iterations = self.iterations.get()))]
    pub fn verify(&self, password: &str, salt: &[u8], expected: &[u8]) -> bool {
        pbkdf2::verify(ALGORITHM, self.iterations, salt, password.as_bytes(), expected).is_ok()
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}
