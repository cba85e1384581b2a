//! Checking a single digest or signature.
//!
//! Each check returns a [`VerifyVerdict`]: a [`Verdict`] plus the
//! human-readable line package tools print for it. Mismatches are
//! verdicts, never errors.

// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::crypto;
use crate::digest::{DigestContext, HashAlgo};
use crate::keys::{KeyResolver, Trust};
use crate::pgp::{KeyId, PgpError, PublicKey, SignatureParams};
use crate::select::SelectedMethod;
use openssl::error::ErrorStack;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Ok,
    /// The digest or signature does not match.
    Fail,
    /// The signer's public key, or the stored value, is unavailable.
    NoKey,
    /// The signature is valid but the key is not trusted.
    NotTrusted,
    /// The signature kind is not supported.
    NotFound,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Ok => "OK",
            Verdict::Fail => "BAD",
            Verdict::NoKey => "NOKEY",
            Verdict::NotTrusted => "NOTRUSTED",
            Verdict::NotFound => "UNKNOWN",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyVerdict {
    pub verdict: Verdict,
    /// One line describing what was checked and how it went.
    pub explanation: String,
    /// The key id that made the signature, for signature methods.
    pub signer: Option<KeyId>,
}

impl VerifyVerdict {
    fn new(verdict: Verdict, explanation: String) -> Self {
        Self {
            verdict,
            explanation,
            signer: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.verdict == Verdict::Ok
    }

    pub(crate) fn nothing_to_verify() -> Self {
        Self::new(Verdict::Ok, "Signature: OK (nothing to verify)".into())
    }

    /// The digest engine itself failed.
    pub(crate) fn primitive_failure(label: &str, e: &ErrorStack) -> Self {
        Self::new(Verdict::Fail, format!("{}BAD ({})", label, e))
    }
}

impl fmt::Display for VerifyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.explanation)
    }
}

pub(crate) const SIZE_LABEL: &str = "Header+Payload size: ";
pub(crate) const MD5_LABEL: &str = "MD5 digest: ";
pub(crate) const SHA1_LABEL: &str = "Header SHA1 digest: ";

/// Compare the declared size against the bytes actually digested.
pub fn verify_size(declared: Option<u32>, nbytes: u32) -> VerifyVerdict {
    match declared {
        Some(size) if nbytes > 0 => {
            if size == nbytes {
                VerifyVerdict::new(Verdict::Ok, format!("{}OK ({})", SIZE_LABEL, nbytes))
            } else {
                VerifyVerdict::new(
                    Verdict::Fail,
                    format!("{}BAD Expected({}) != ({})", SIZE_LABEL, size, nbytes),
                )
            }
        }
        _ => VerifyVerdict::new(Verdict::NoKey, format!("{}NOKEY", SIZE_LABEL)),
    }
}

fn algo_mismatch(label: &str, expected: HashAlgo, ctx: &DigestContext) -> VerifyVerdict {
    VerifyVerdict::new(
        Verdict::Fail,
        format!(
            "{}BAD (digest context is {}, expected {})",
            label,
            ctx.algo(),
            expected
        ),
    )
}

/// Compare a stored binary MD5 against the header+payload digest.
/// `ctx` is left untouched.
pub fn verify_md5(stored: Option<&[u8]>, ctx: &DigestContext) -> VerifyVerdict {
    if ctx.algo() != HashAlgo::Md5 {
        return algo_mismatch(MD5_LABEL, HashAlgo::Md5, ctx);
    }
    let stored = match stored {
        Some(s) => s,
        None => return VerifyVerdict::new(Verdict::NoKey, format!("{}NOKEY", MD5_LABEL)),
    };
    let computed = match ctx.dup().finish() {
        Ok(d) => d,
        Err(e) => return VerifyVerdict::primitive_failure(MD5_LABEL, &e),
    };
    if computed == stored {
        VerifyVerdict::new(
            Verdict::Ok,
            format!("{}OK ({})", MD5_LABEL, hex::encode(&computed)),
        )
    } else {
        VerifyVerdict::new(
            Verdict::Fail,
            format!(
                "{}BAD Expected({}) != ({})",
                MD5_LABEL,
                hex::encode(stored),
                hex::encode(&computed)
            ),
        )
    }
}

/// Compare a stored hex SHA1 against the header-only digest. The stored
/// text must match the lowercase hex exactly.
pub fn verify_sha1(stored: Option<&str>, ctx: &DigestContext) -> VerifyVerdict {
    if ctx.algo() != HashAlgo::Sha1 {
        return algo_mismatch(SHA1_LABEL, HashAlgo::Sha1, ctx);
    }
    let stored = match stored {
        Some(s) => s,
        None => return VerifyVerdict::new(Verdict::NoKey, format!("{}NOKEY", SHA1_LABEL)),
    };
    let computed = match ctx.dup().finish() {
        Ok(d) => hex::encode(d),
        Err(e) => return VerifyVerdict::primitive_failure(SHA1_LABEL, &e),
    };
    if computed == stored {
        VerifyVerdict::new(Verdict::Ok, format!("{}OK ({})", SHA1_LABEL, computed))
    } else {
        VerifyVerdict::new(
            Verdict::Fail,
            format!("{}BAD Expected({}) != ({})", SHA1_LABEL, stored, computed),
        )
    }
}

/// A signature tag that is recognized but cannot be checked.
pub fn verify_unknown(tag: u32) -> VerifyVerdict {
    VerifyVerdict::new(Verdict::NotFound, format!("Signature: UNKNOWN ({})", tag))
}

/// The signature entry could not even be decoded.
pub fn malformed_signature(method: SelectedMethod, e: &PgpError) -> VerifyVerdict {
    let name = method.pubkey_algo().map(|a| a.name()).unwrap_or("?");
    VerifyVerdict::new(
        Verdict::Fail,
        format!("Header {} signature: BAD ({})", name, e),
    )
}

/// "Header V4 RSA/SHA256 signature: "
pub(crate) fn signature_label(params: &SignatureParams) -> String {
    let pubkey = match params.pubkey() {
        Some(a) => a.name().to_string(),
        None => format!("#{}", params.pubkey_algo),
    };
    let hash = match params.hash() {
        Some(h) => h.name().to_string(),
        None => format!("#{}", params.hash_algo),
    };
    format!("Header V{} {}/{} signature: ", params.version, pubkey, hash)
}

/// A signature verdict; the explanation always ends with the key id.
pub(crate) fn signature_verdict(
    params: &SignatureParams,
    verdict: Verdict,
    detail: Option<&str>,
) -> VerifyVerdict {
    let detail = detail.map(|d| format!(" ({})", d)).unwrap_or_default();
    VerifyVerdict {
        verdict,
        explanation: format!(
            "{}{}{}, key ID {}",
            signature_label(params),
            verdict.as_str(),
            detail,
            params.signer.short()
        ),
        signer: Some(params.signer),
    }
}

/// Extend a copy of `ctx` with the packet's hashed material and finish it.
fn finish_signed(ctx: &DigestContext, params: &SignatureParams) -> Result<Vec<u8>, ErrorStack> {
    let mut signed = ctx.dup();
    signed.update(&params.hashed)?;
    if let Some(trailer) = params.v4_trailer() {
        signed.update(&trailer)?;
    }
    signed.finish()
}

/// Check a header-only signature.
///
/// `ctx` holds the digest of the signed bytes and is not consumed; a copy
/// is extended with the packet's hashed material. The algorithms named in
/// the packet must agree with `method` and `ctx` before any key is looked up.
pub fn verify_signature(
    method: SelectedMethod,
    params: &SignatureParams,
    ctx: &DigestContext,
    embedded: Option<&PublicKey>,
    resolver: &dyn KeyResolver,
) -> VerifyVerdict {
    let fail = |detail: &str| signature_verdict(params, Verdict::Fail, Some(detail));
    let expected = match method.pubkey_algo() {
        Some(a) => a,
        None => return verify_unknown(method.sigtag()),
    };
    if params.pubkey() != Some(expected) {
        return fail(&format!("not a {} signature", expected.name()));
    }
    let hash = match params.hash() {
        Some(h) if h == ctx.algo() => h,
        _ => return fail(&format!("digest context is {}", ctx.algo())),
    };

    let digest = match finish_signed(ctx, params) {
        Ok(d) => d,
        Err(e) => return fail(&e.to_string()),
    };
    if digest.get(..2) != Some(&params.signhash16[..]) {
        return fail("digest mismatch");
    }

    let resolved = match resolver.find_pubkey(&params.signer, embedded) {
        Some(k) => k,
        None => return signature_verdict(params, Verdict::NoKey, None),
    };
    if resolved.key.material.algo() != expected {
        return fail(&format!(
            "{} key {}",
            resolved.key.material.algo().name(),
            resolved.source
        ));
    }
    match crypto::verify_digest(&resolved.key.material, hash, &digest, &params.mpis) {
        Ok(true) if resolved.trust == Trust::Untrusted => {
            signature_verdict(params, Verdict::NotTrusted, None)
        }
        Ok(true) => signature_verdict(params, Verdict::Ok, None),
        Ok(false) => signature_verdict(params, Verdict::Fail, None),
        Err(e) => {
            tracing::debug!("signature check: {}", e);
            signature_verdict(params, Verdict::Fail, None)
        }
    }
}
