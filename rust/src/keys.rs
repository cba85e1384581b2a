//! Public key lookup and trust.

// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::pgp::{self, KeyId, PublicKey};
use anyhow::{bail, Context, Result};
use fn_error_context::context;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

/// How many signer ids [`KeyidStash`] remembers.
const STASH_MAX: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    Trusted,
    Untrusted,
}

/// A public key found for a signer.
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    pub key: PublicKey,
    pub trust: Trust,
    /// Where the key came from, for diagnostics.
    pub source: &'static str,
}

/// Finds the public key that made a signature.
pub trait KeyResolver {
    /// Look up `signer`. `embedded` is a key with that id shipped inside
    /// the package being verified, if there is one.
    fn find_pubkey(&self, signer: &KeyId, embedded: Option<&PublicKey>) -> Option<ResolvedKey>;
}

impl<T: KeyResolver + ?Sized> KeyResolver for &T {
    fn find_pubkey(&self, signer: &KeyId, embedded: Option<&PublicKey>) -> Option<ResolvedKey> {
        (**self).find_pubkey(signer, embedded)
    }
}

/// An in-memory set of public keys.
///
/// Keys added to the keyring are trusted unless their id is distrusted.
/// A key embedded in a package is preferred when its id matches the
/// signer; it is trusted when the keyring holds the same key, or when the
/// keyring is configured to trust embedded keys.
#[derive(Debug, Default, Clone)]
pub struct Keyring {
    keys: BTreeMap<KeyId, PublicKey>,
    distrusted: BTreeSet<KeyId>,
    trust_embedded: bool,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_trust_embedded(&mut self, trust: bool) {
        self.trust_embedded = trust;
    }

    pub fn add_key(&mut self, key: PublicKey, trust: Trust) {
        if trust == Trust::Untrusted {
            self.distrusted.insert(key.keyid);
        }
        self.keys.insert(key.keyid, key);
    }

    /// Mark `id` untrusted, whether or not the key itself is known.
    pub fn distrust(&mut self, id: KeyId) {
        self.distrusted.insert(id);
    }

    /// Add every supported key in a binary packet sequence.
    pub fn add_packets(&mut self, data: &[u8], trust: Trust) -> Result<usize, pgp::PgpError> {
        let keys = pgp::parse_pubkeys(data)?;
        let n = keys.len();
        for key in keys {
            tracing::debug!("Adding {} key {}", key.material.algo().name(), key.keyid);
            self.add_key(key, trust);
        }
        Ok(n)
    }

    /// Load a key file (armored or binary), or every key file in a directory.
    #[context("Loading keys from {}", path.display())]
    pub fn load_path(&mut self, path: &Path) -> Result<usize> {
        if !path.is_dir() {
            return self.load_file(path);
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if entry.file_type()?.is_file() {
                entries.push(entry.path());
            }
        }
        entries.sort();
        let mut n = 0;
        for p in entries {
            n += self.load_file(&p)?;
        }
        Ok(n)
    }

    fn load_file(&mut self, path: &Path) -> Result<usize> {
        let data = std::fs::read(path).with_context(|| format!("Reading {}", path.display()))?;
        let start = data
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(data.len());
        let packets = if data[start..].starts_with(b"-----BEGIN") {
            let text = std::str::from_utf8(&data).context("Armored key is not UTF-8")?;
            pgp::unarmor(text)?
        } else {
            data
        };
        let n = self
            .add_packets(&packets, Trust::Trusted)
            .with_context(|| format!("Parsing {}", path.display()))?;
        if n == 0 {
            bail!("No supported public keys in {}", path.display());
        }
        Ok(n)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, id: &KeyId) -> Option<&PublicKey> {
        self.keys.get(id)
    }

    fn trust_of(&self, id: &KeyId, in_keyring: bool) -> Trust {
        if self.distrusted.contains(id) || !(in_keyring || self.trust_embedded) {
            Trust::Untrusted
        } else {
            Trust::Trusted
        }
    }
}

impl KeyResolver for Keyring {
    fn find_pubkey(&self, signer: &KeyId, embedded: Option<&PublicKey>) -> Option<ResolvedKey> {
        if let Some(key) = embedded.filter(|k| &k.keyid == signer) {
            // Vouched for by the keyring only if the material is identical
            let known = self.keys.get(signer) == Some(key);
            return Some(ResolvedKey {
                key: key.clone(),
                trust: self.trust_of(signer, known),
                source: "package",
            });
        }
        let key = self.keys.get(signer)?;
        Some(ResolvedKey {
            key: key.clone(),
            trust: self.trust_of(signer, true),
            source: "keyring",
        })
    }
}

/// Remembers signer ids that already produced a NOKEY or NOTTRUSTED
/// verdict, so repeats can be logged quietly.
///
/// Ids are kept in a fixed size ring; the oldest are forgotten first.
#[derive(Debug, Default)]
pub struct KeyidStash {
    inner: Mutex<StashState>,
}

#[derive(Debug, Default)]
struct StashState {
    ids: Vec<u32>,
    next: usize,
}

impl KeyidStash {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`; returns true if it was already recorded.
    pub fn seen(&self, id: &KeyId) -> bool {
        let short = u32::from_be_bytes([id.0[4], id.0[5], id.0[6], id.0[7]]);
        if short == 0 {
            return false;
        }
        let mut state = match self.inner.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.ids.contains(&short) {
            return true;
        }
        let next = state.next;
        if state.ids.len() < STASH_MAX {
            state.ids.push(short);
        } else {
            state.ids[next] = short;
        }
        state.next = (next + 1) % STASH_MAX;
        false
    }
}
