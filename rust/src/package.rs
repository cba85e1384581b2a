/*
 * Copyright (C) 2021 Red Hat, Inc.
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! Reading a whole package and verifying it.

use crate::digest::{
    digest_metadata, digest_metadata_then_payload, feed_payload, DigestContext, DigestError,
    HashAlgo,
};
use crate::header::{Header, RawHeader};
use crate::keys::KeyResolver;
use crate::pgp::{self, KeyId, PublicKey, SignatureParams};
use crate::sections::{
    read_lead, read_metadata_header, read_signature_header, MetadataHeader, SignatureHeader,
};
use crate::select::{select, SelectedMethod, VerifyFlags};
use crate::tags::{rpmtag, sigtag};
use crate::verify::{self, Verdict, VerifyVerdict};
use crate::PackageError;
use openssl::error::ErrorStack;
use std::io::Read;

/// Hook consulted before logging a NOKEY or NOTTRUSTED verdict; returns
/// true when the signer was already reported.
pub type RepeatHook<'a> = &'a dyn Fn(&KeyId) -> bool;

/// Reads packages and verifies them under a fixed policy.
pub struct PackageReader<'a> {
    flags: VerifyFlags,
    resolver: &'a dyn KeyResolver,
    repeated: Option<RepeatHook<'a>>,
}

/// Read a package and verify its strongest permitted digest or signature.
///
/// The stream is consumed up to the end of the metadata header, or to
/// the end of the payload when the chosen method covers it. The returned
/// metadata header has the legacy signature tags merged in.
pub fn read_and_verify<R: Read + ?Sized>(
    stream: &mut R,
    flags: VerifyFlags,
    resolver: &dyn KeyResolver,
) -> Result<(MetadataHeader, VerifyVerdict), PackageError> {
    PackageReader::new(flags, resolver).read_and_verify(stream)
}

/// Verify every digest and signature a package carries; see
/// [`PackageReader::check_signatures`].
pub fn check_signatures<R: Read + ?Sized>(
    stream: &mut R,
    flags: VerifyFlags,
    resolver: &dyn KeyResolver,
) -> Result<CheckReport, PackageError> {
    PackageReader::new(flags, resolver).check_signatures(stream)
}

impl<'a> PackageReader<'a> {
    pub fn new(flags: VerifyFlags, resolver: &'a dyn KeyResolver) -> Self {
        Self {
            flags,
            resolver,
            repeated: None,
        }
    }

    /// Demote repeated NOKEY and NOTTRUSTED warnings for the same signer;
    /// see [`crate::KeyidStash`].
    pub fn on_repeated_verdict(mut self, hook: RepeatHook<'a>) -> Self {
        self.repeated = Some(hook);
        self
    }

    pub fn flags(&self) -> VerifyFlags {
        self.flags
    }

    /// See [`read_and_verify`].
    pub fn read_and_verify<R: Read + ?Sized>(
        &self,
        stream: &mut R,
    ) -> Result<(MetadataHeader, VerifyVerdict), PackageError> {
        read_lead(stream)?;
        let sigh = read_signature_header(stream)?;
        let method = select(&sigh, self.flags);
        let (mut h, raw) = read_metadata_header(stream)?;
        let verdict = match method {
            Some(SelectedMethod::Size) => {
                let payload = feed_payload(stream, &mut []).map_err(payload_error)?;
                verify::verify_size(sigh.get_u32(sigtag::SIZE), raw.len().saturating_add(payload))
            }
            Some(SelectedMethod::Md5) => {
                match digest_metadata_then_payload(raw.as_bytes(), stream, HashAlgo::Md5) {
                    Ok(ctx) => verify::verify_md5(sigh.get_bin(sigtag::MD5), &ctx),
                    Err(DigestError::Io(e)) => return Err(e.into()),
                    Err(DigestError::Crypto(e)) => {
                        VerifyVerdict::primitive_failure(verify::MD5_LABEL, &e)
                    }
                }
            }
            Some(m) => self.verify_header_only(m, &sigh, &h, &raw),
            None => VerifyVerdict::nothing_to_verify(),
        };
        self.log_verdict(&verdict);
        h.merge_legacy_sigs(&sigh);
        Ok((h, verdict))
    }

    /// Verify every digest and signature the package carries, reading the
    /// payload at most once.
    pub fn check_signatures<R: Read + ?Sized>(
        &self,
        stream: &mut R,
    ) -> Result<CheckReport, PackageError> {
        read_lead(stream)?;
        let sigh = read_signature_header(stream)?;
        let (h, raw) = read_metadata_header(stream)?;
        let wants = |m: SelectedMethod| m.permitted(self.flags) && sigh.is_entry(m.sigtag());

        let mut md5: Option<Result<DigestContext, ErrorStack>> = None;
        let mut payload_len = 0;
        if wants(SelectedMethod::Md5) || wants(SelectedMethod::Size) {
            let mut ctxs = Vec::new();
            if wants(SelectedMethod::Md5) {
                match digest_metadata(raw.as_bytes(), HashAlgo::Md5) {
                    Ok(ctx) => ctxs.push(ctx),
                    Err(e) => md5 = Some(Err(e)),
                }
            }
            match feed_payload(stream, &mut ctxs) {
                Ok(n) => {
                    payload_len = n;
                    md5 = ctxs.pop().map(Ok).or(md5);
                }
                Err(DigestError::Io(e)) => return Err(e.into()),
                Err(DigestError::Crypto(e)) => md5 = Some(Err(e)),
            }
        }

        let mut results = Vec::new();
        for (tag, _) in sigh.iter() {
            let method = SelectedMethod::from_sigtag(tag);
            let verdict = match method {
                Some(m) if !m.permitted(self.flags) => continue,
                Some(SelectedMethod::Size) => verify::verify_size(
                    sigh.get_u32(tag),
                    raw.len().saturating_add(payload_len),
                ),
                Some(SelectedMethod::Md5) => match &md5 {
                    Some(Ok(ctx)) => verify::verify_md5(sigh.get_bin(tag), ctx),
                    Some(Err(e)) => VerifyVerdict::primitive_failure(verify::MD5_LABEL, e),
                    None => continue,
                },
                Some(m) => self.verify_header_only(m, &sigh, &h, &raw),
                None if sigtag::is_unsupported_signature(tag) => {
                    if self.flags.contains(VerifyFlags::NOSIGNATURES) {
                        continue;
                    }
                    verify::verify_unknown(tag)
                }
                None => continue,
            };
            self.log_verdict(&verdict);
            results.push(CheckResult {
                tag,
                method,
                verdict,
            });
        }
        Ok(CheckReport { results })
    }

    /// Methods that cover the metadata header alone.
    fn verify_header_only(
        &self,
        method: SelectedMethod,
        sigh: &SignatureHeader,
        h: &MetadataHeader,
        raw: &RawHeader,
    ) -> VerifyVerdict {
        let immutable = raw.immutable();
        if method == SelectedMethod::Sha1 {
            return match digest_metadata(&immutable, HashAlgo::Sha1) {
                Ok(ctx) => verify::verify_sha1(sigh.get_string(sigtag::SHA1), &ctx),
                Err(e) => VerifyVerdict::primitive_failure(verify::SHA1_LABEL, &e),
            };
        }
        let params = match sigh.get_bin(method.sigtag()).map(SignatureParams::parse) {
            Some(Ok(params)) => params,
            Some(Err(e)) => return verify::malformed_signature(method, &e),
            None => {
                let e = pgp::PgpError::Malformed("signature entry: not binary".into());
                return verify::malformed_signature(method, &e);
            }
        };
        let hash = match params.hash() {
            Some(hash) => hash,
            None => {
                return verify::signature_verdict(
                    &params,
                    Verdict::Fail,
                    Some("unsupported hash algorithm"),
                )
            }
        };
        let ctx = match digest_metadata(&immutable, hash) {
            Ok(ctx) => ctx,
            Err(e) => {
                return verify::signature_verdict(&params, Verdict::Fail, Some(&e.to_string()))
            }
        };
        let embedded = embedded_pubkey(h, sigh, &params.signer);
        verify::verify_signature(method, &params, &ctx, embedded.as_ref(), self.resolver)
    }

    fn log_verdict(&self, v: &VerifyVerdict) {
        match v.verdict {
            Verdict::Ok => tracing::debug!("{}", v.explanation),
            Verdict::NoKey | Verdict::NotTrusted => {
                let repeated = match (self.repeated, v.signer.as_ref()) {
                    (Some(hook), Some(id)) => hook(id),
                    _ => false,
                };
                if repeated {
                    tracing::debug!("{}", v.explanation);
                } else {
                    tracing::warn!("{}", v.explanation);
                }
            }
            Verdict::NotFound => tracing::warn!("{}", v.explanation),
            Verdict::Fail => tracing::error!("{}", v.explanation),
        }
    }
}

fn payload_error(e: DigestError) -> PackageError {
    match e {
        DigestError::Io(e) => PackageError::Io(e),
        DigestError::Crypto(e) => PackageError::malformed(e.to_string()),
    }
}

/// The public key a package ships for its own signer, if any. The
/// metadata header is consulted first, then the signature header; in
/// each the most recently added key wins.
fn embedded_pubkey(h: &Header, sigh: &Header, signer: &KeyId) -> Option<PublicKey> {
    let armored = h
        .get_string_array(rpmtag::PUBKEYS)
        .or_else(|| sigh.get_string_array(sigtag::PUBKEYS))?
        .last()?;
    let keys = pgp::unarmor(armored).and_then(|packets| pgp::parse_pubkeys(&packets));
    match keys {
        Ok(keys) => keys.into_iter().find(|k| &k.keyid == signer),
        Err(e) => {
            tracing::debug!("Ignoring embedded public key: {}", e);
            None
        }
    }
}

/// The outcome of one method in [`PackageReader::check_signatures`].
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub tag: u32,
    /// `None` for signature kinds that cannot be checked.
    pub method: Option<SelectedMethod>,
    pub verdict: VerifyVerdict,
}

impl CheckResult {
    fn name(&self) -> &'static str {
        self.method.map(|m| m.short_name()).unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub results: Vec<CheckResult>,
}

impl CheckReport {
    /// True unless some method produced a failing verdict. Unsupported
    /// signature kinds do not count against the package.
    pub fn is_ok(&self) -> bool {
        self.results
            .iter()
            .all(|r| matches!(r.verdict.verdict, Verdict::Ok | Verdict::NotFound))
    }

    /// One line such as `sha1 rsa md5 OK`, or
    /// `sha1 RSA md5 NOT OK (MISSING KEYS: RSA#1a2b3c4d)`.
    /// Passing methods are lowercase, failing ones uppercase.
    pub fn summary(&self) -> String {
        let mut words = Vec::new();
        let mut missing = Vec::new();
        let mut untrusted = Vec::new();
        for r in &self.results {
            let name = r.name();
            match r.verdict.verdict {
                Verdict::Ok | Verdict::NotFound => words.push(name.to_string()),
                v => {
                    let upper = name.to_uppercase();
                    let keyid = r.verdict.signer.map(|id| format!("{}#{}", upper, id.short()));
                    match (v, keyid) {
                        (Verdict::NoKey, Some(k)) => missing.push(k),
                        (Verdict::NotTrusted, Some(k)) => untrusted.push(k),
                        _ => {}
                    }
                    words.push(upper);
                }
            }
        }
        let mut line = words.join(" ");
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(if self.is_ok() { "OK" } else { "NOT OK" });
        if !missing.is_empty() {
            line.push_str(&format!(" (MISSING KEYS: {})", missing.join(", ")));
        }
        if !untrusted.is_empty() {
            line.push_str(&format!(" (UNTRUSTED KEYS: {})", untrusted.join(", ")));
        }
        line
    }

    /// One explanation per method.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|r| r.verdict.explanation.as_str())
    }
}
