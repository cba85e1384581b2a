//! Running digests over the spans a package signer covered.
//!
//! Header-only methods digest the metadata header alone; the legacy
//! methods digest the metadata header followed by the whole payload.

// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::try_fail_point;
use openssl::error::ErrorStack;
use openssl::hash::{Hasher, MessageDigest};
use openssl::md::{Md, MdRef};
use std::fmt;
use std::io::Read;
use thiserror::Error;

/// Payload read size.
const PAYLOAD_CHUNK: usize = 64 * 1024;

/// Hash algorithms, with their OpenPGP identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgo {
    Md5,
    Sha1,
    Ripemd160,
    Sha256,
    Sha384,
    Sha512,
    Sha224,
}

impl HashAlgo {
    pub fn from_pgp(id: u8) -> Option<Self> {
        let algo = match id {
            1 => HashAlgo::Md5,
            2 => HashAlgo::Sha1,
            3 => HashAlgo::Ripemd160,
            8 => HashAlgo::Sha256,
            9 => HashAlgo::Sha384,
            10 => HashAlgo::Sha512,
            11 => HashAlgo::Sha224,
            _ => return None,
        };
        Some(algo)
    }

    pub fn pgp_id(self) -> u8 {
        match self {
            HashAlgo::Md5 => 1,
            HashAlgo::Sha1 => 2,
            HashAlgo::Ripemd160 => 3,
            HashAlgo::Sha256 => 8,
            HashAlgo::Sha384 => 9,
            HashAlgo::Sha512 => 10,
            HashAlgo::Sha224 => 11,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HashAlgo::Md5 => "MD5",
            HashAlgo::Sha1 => "SHA1",
            HashAlgo::Ripemd160 => "RIPEMD160",
            HashAlgo::Sha256 => "SHA256",
            HashAlgo::Sha384 => "SHA384",
            HashAlgo::Sha512 => "SHA512",
            HashAlgo::Sha224 => "SHA224",
        }
    }

    pub(crate) fn message_digest(self) -> MessageDigest {
        match self {
            HashAlgo::Md5 => MessageDigest::md5(),
            HashAlgo::Sha1 => MessageDigest::sha1(),
            HashAlgo::Ripemd160 => MessageDigest::ripemd160(),
            HashAlgo::Sha256 => MessageDigest::sha256(),
            HashAlgo::Sha384 => MessageDigest::sha384(),
            HashAlgo::Sha512 => MessageDigest::sha512(),
            HashAlgo::Sha224 => MessageDigest::sha224(),
        }
    }

    pub(crate) fn md(self) -> &'static MdRef {
        match self {
            HashAlgo::Md5 => Md::md5(),
            HashAlgo::Sha1 => Md::sha1(),
            HashAlgo::Ripemd160 => Md::ripemd160(),
            HashAlgo::Sha256 => Md::sha256(),
            HashAlgo::Sha384 => Md::sha384(),
            HashAlgo::Sha512 => Md::sha512(),
            HashAlgo::Sha224 => Md::sha224(),
        }
    }
}

impl fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An in-progress digest that also counts the bytes fed to it.
#[derive(Clone)]
pub struct DigestContext {
    algo: HashAlgo,
    hasher: Hasher,
    nbytes: u32,
}

impl fmt::Debug for DigestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestContext")
            .field("algo", &self.algo)
            .field("nbytes", &self.nbytes)
            .finish()
    }
}

impl DigestContext {
    pub fn new(algo: HashAlgo) -> Result<Self, ErrorStack> {
        Ok(Self {
            algo,
            hasher: Hasher::new(algo.message_digest())?,
            nbytes: 0,
        })
    }

    pub fn algo(&self) -> HashAlgo {
        self.algo
    }

    /// Bytes fed so far; saturates rather than wrapping.
    pub fn nbytes(&self) -> u32 {
        self.nbytes
    }

    pub fn update(&mut self, data: &[u8]) -> Result<(), ErrorStack> {
        self.hasher.update(data)?;
        let n = u32::try_from(data.len()).unwrap_or(u32::MAX);
        self.nbytes = self.nbytes.saturating_add(n);
        Ok(())
    }

    /// An independent copy of the running state.
    pub fn dup(&self) -> Self {
        self.clone()
    }

    pub fn finish(mut self) -> Result<Vec<u8>, ErrorStack> {
        Ok(self.hasher.finish()?.to_vec())
    }
}

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("reading payload: {0}")]
    Io(#[from] std::io::Error),
    #[error("digest failed: {0}")]
    Crypto(#[from] ErrorStack),
}

/// Digest a serialized metadata header. `raw` starts with the header
/// magic; no other framing is added.
pub fn digest_metadata(raw: &[u8], algo: HashAlgo) -> Result<DigestContext, ErrorStack> {
    let mut ctx = DigestContext::new(algo)?;
    ctx.update(raw)?;
    Ok(ctx)
}

/// Digest a serialized metadata header and then everything remaining in
/// `stream`, which is left at end of file.
pub fn digest_metadata_then_payload<R: Read + ?Sized>(
    raw: &[u8],
    stream: &mut R,
    algo: HashAlgo,
) -> Result<DigestContext, DigestError> {
    let mut ctx = digest_metadata(raw, algo)?;
    feed_payload(stream, std::slice::from_mut(&mut ctx))?;
    Ok(ctx)
}

/// Read `stream` to the end, feeding every byte to each context.
/// Returns the number of payload bytes read.
pub fn feed_payload<R: Read + ?Sized>(
    stream: &mut R,
    ctxs: &mut [DigestContext],
) -> Result<u32, DigestError> {
    let mut buf = vec![0u8; PAYLOAD_CHUNK];
    let mut total: u32 = 0;
    loop {
        let n = read_payload_chunk(stream, &mut buf)?;
        if n == 0 {
            break;
        }
        for ctx in ctxs.iter_mut() {
            ctx.update(&buf[..n])?;
        }
        total = total.saturating_add(n as u32);
    }
    tracing::trace!("payload: {} bytes", total);
    Ok(total)
}

fn read_payload_chunk<R: Read + ?Sized>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    try_fail_point!("payload::read");
    loop {
        match stream.read(buf) {
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            r => return r,
        }
    }
}
