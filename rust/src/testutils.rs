/*
 * Copyright (C) 2018 Red Hat, Inc.
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! # Test utility functions
//!
//! Builders for synthetic packages and throwaway signing keys.

use crate::digest::HashAlgo;
use crate::header::{TagType, ENTRY_SIZE, HEADER_MAGIC};
use crate::lead::{LEAD_MAGIC, LEAD_SIZE, SIGTYPE_HEADERSIG};
use crate::pgp::{Curve, KeyId, PublicKey, PKT_PUBLIC_KEY, PKT_SIGNATURE};
use crate::tags::rpmtag;
use anyhow::Result;
use base64::Engine;
use openssl::bn::BigNumContext;
use openssl::dsa::{Dsa, DsaSig};
use openssl::ec::{EcGroup, EcKey, PointConversionForm};
use openssl::ecdsa::EcdsaSig;
use openssl::pkey::{PKey, Private};
use openssl::pkey_ctx::PkeyCtx;
use openssl::rsa::{Padding, Rsa};

/// Stands in for a compressed archive.
pub(crate) const PAYLOAD: &[u8] = b"\x1f\x8b\x08\x00 not really a cpio archive \x00\x01\x02\x03";

/// Key creation and signature time.
const CREATED: u32 = 1_600_000_000;

/// A binary package lead for `name`.
pub(crate) fn lead_bytes(name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LEAD_SIZE);
    buf.extend_from_slice(&LEAD_MAGIC);
    buf.extend_from_slice(&[3, 0]);
    // type: binary, arch 1
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes());
    let mut n = [0u8; 66];
    let len = name.len().min(65);
    n[..len].copy_from_slice(&name.as_bytes()[..len]);
    buf.extend_from_slice(&n);
    // os 1
    buf.extend_from_slice(&1u16.to_be_bytes());
    buf.extend_from_slice(&SIGTYPE_HEADERSIG.to_be_bytes());
    buf.resize(LEAD_SIZE, 0);
    buf
}

#[derive(Debug, Clone)]
struct Entry {
    tag: u32,
    ty: TagType,
    count: u32,
    data: Vec<u8>,
}

/// Serializes header blobs the way package builders lay them out: the
/// region entry first, signed entries sorted by tag, the region trailer
/// closing the signed data, then any entries appended afterwards.
#[derive(Debug, Clone, Default)]
pub(crate) struct HeaderBuilder {
    region: Option<u32>,
    entries: Vec<Entry>,
    appended: Vec<Entry>,
}

impl HeaderBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn region(mut self, tag: u32) -> Self {
        self.region = Some(tag);
        self
    }

    fn push(mut self, tag: u32, ty: TagType, count: u32, data: Vec<u8>) -> Self {
        self.entries.push(Entry {
            tag,
            ty,
            count,
            data,
        });
        self
    }

    pub(crate) fn string(self, tag: u32, s: &str) -> Self {
        let mut data = s.as_bytes().to_vec();
        data.push(0);
        self.push(tag, TagType::String, 1, data)
    }

    pub(crate) fn bin(self, tag: u32, b: &[u8]) -> Self {
        self.push(tag, TagType::Bin, b.len() as u32, b.to_vec())
    }

    pub(crate) fn u32s(self, tag: u32, v: &[u32]) -> Self {
        let data = v.iter().flat_map(|n| n.to_be_bytes()).collect();
        self.push(tag, TagType::Int32, v.len() as u32, data)
    }

    pub(crate) fn string_array(self, tag: u32, v: &[&str]) -> Self {
        let mut data = Vec::new();
        for s in v {
            data.extend_from_slice(s.as_bytes());
            data.push(0);
        }
        self.push(tag, TagType::StringArray, v.len() as u32, data)
    }

    /// An entry added after signing, outside the immutable region.
    pub(crate) fn append_unsigned_string(mut self, tag: u32, s: &str) -> Self {
        let mut data = s.as_bytes().to_vec();
        data.push(0);
        self.appended.push(Entry {
            tag,
            ty: TagType::String,
            count: 1,
            data,
        });
        self
    }

    pub(crate) fn build(mut self) -> Vec<u8> {
        self.entries.sort_by_key(|e| e.tag);
        let mut index = Vec::new();
        let mut signed = Vec::new();
        let mut data = Vec::new();
        for e in &self.entries {
            place(e, &mut signed, &mut data);
        }
        if let Some(tag) = self.region {
            let ril = (signed.len() + 1) as i32;
            let trailer_offset = data.len() as i32;
            data.extend_from_slice(&tag.to_be_bytes());
            data.extend_from_slice(&TagType::Bin.raw().to_be_bytes());
            data.extend_from_slice(&(-(ril * ENTRY_SIZE as i32)).to_be_bytes());
            data.extend_from_slice(&(ENTRY_SIZE as u32).to_be_bytes());
            index.push((tag, TagType::Bin.raw(), trailer_offset, ENTRY_SIZE as u32));
        }
        index.extend(signed);
        for e in &self.appended {
            place(e, &mut index, &mut data);
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(&HEADER_MAGIC);
        buf.extend_from_slice(&(index.len() as u32).to_be_bytes());
        buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
        for (tag, ty, offset, count) in index {
            buf.extend_from_slice(&tag.to_be_bytes());
            buf.extend_from_slice(&ty.to_be_bytes());
            buf.extend_from_slice(&offset.to_be_bytes());
            buf.extend_from_slice(&count.to_be_bytes());
        }
        buf.extend_from_slice(&data);
        buf
    }
}

/// Append the data of `e`, aligned for its type, and index it.
fn place(e: &Entry, index: &mut Vec<(u32, u32, i32, u32)>, data: &mut Vec<u8>) {
    while data.len() % e.ty.align() != 0 {
        data.push(0);
    }
    index.push((e.tag, e.ty.raw(), data.len() as i32, e.count));
    data.extend_from_slice(&e.data);
}

/// A signature header blob followed by its padding.
pub(crate) fn signature_section(b: HeaderBuilder) -> Vec<u8> {
    let mut buf = b.build();
    while buf.len() % 8 != 0 {
        buf.push(0);
    }
    buf
}

/// The metadata entries of a small noarch package, with its region.
pub(crate) fn metadata_builder() -> HeaderBuilder {
    HeaderBuilder::new()
        .region(rpmtag::HEADERIMMUTABLE)
        .string(rpmtag::NAME, "hello")
        .string(rpmtag::VERSION, "1.0")
        .string(rpmtag::RELEASE, "1")
        .string(rpmtag::OS, "linux")
        .string(rpmtag::ARCH, "noarch")
        .u32s(rpmtag::ARCHIVESIZE, &[PAYLOAD.len() as u32])
}

pub(crate) fn metadata_blob() -> Vec<u8> {
    metadata_builder().build()
}

/// Assemble a complete package.
pub(crate) fn package(sig: HeaderBuilder, meta: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut buf = lead_bytes("hello-1.0-1");
    buf.extend_from_slice(&signature_section(sig));
    buf.extend_from_slice(meta);
    buf.extend_from_slice(payload);
    buf
}

/// An OpenPGP multiprecision integer.
fn mpi(v: &[u8]) -> Vec<u8> {
    let start = v.iter().position(|&b| b != 0).unwrap_or(v.len());
    let v = &v[start..];
    let bits = match v.first() {
        Some(b) => (v.len() - 1) * 8 + (8 - b.leading_zeros() as usize),
        None => 0,
    };
    let mut out = (bits as u16).to_be_bytes().to_vec();
    out.extend_from_slice(v);
    out
}

/// An old format packet with a two byte length.
fn old_packet(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0x80 | (tag << 2) | 1];
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// A freshly generated signing key and its V4 public key packet.
pub(crate) struct TestKey {
    pkey: PKey<Private>,
    algo: u8,
    body: Vec<u8>,
    pub(crate) keyid: KeyId,
}

impl TestKey {
    fn new(pkey: PKey<Private>, algo: u8, material: Vec<u8>) -> Self {
        let mut body = vec![4];
        body.extend_from_slice(&CREATED.to_be_bytes());
        body.push(algo);
        body.extend_from_slice(&material);
        let mut h = openssl::sha::Sha1::new();
        h.update(&[0x99]);
        h.update(&(body.len() as u16).to_be_bytes());
        h.update(&body);
        let fpr = h.finish();
        let mut id = [0u8; 8];
        id.copy_from_slice(&fpr[12..]);
        Self {
            pkey,
            algo,
            body,
            keyid: KeyId(id),
        }
    }

    pub(crate) fn rsa() -> Result<Self> {
        let rsa = Rsa::generate(2048)?;
        let mut material = mpi(&rsa.n().to_vec());
        material.extend(mpi(&rsa.e().to_vec()));
        Ok(Self::new(PKey::from_rsa(rsa)?, 1, material))
    }

    pub(crate) fn dsa() -> Result<Self> {
        let dsa = Dsa::generate(1024)?;
        let mut material = Vec::new();
        for v in [dsa.p(), dsa.q(), dsa.g(), dsa.pub_key()] {
            material.extend(mpi(&v.to_vec()));
        }
        Ok(Self::new(PKey::from_dsa(dsa)?, 17, material))
    }

    pub(crate) fn ecdsa() -> Result<Self> {
        let curve = Curve::P256;
        let group = EcGroup::from_curve_name(curve.nid())?;
        let ec = EcKey::generate(&group)?;
        let mut bnctx = BigNumContext::new()?;
        let point = ec
            .public_key()
            .to_bytes(&group, PointConversionForm::UNCOMPRESSED, &mut bnctx)?;
        let mut material = vec![curve.oid().len() as u8];
        material.extend_from_slice(curve.oid());
        material.extend(mpi(&point));
        Ok(Self::new(PKey::from_ec_key(ec)?, 19, material))
    }

    /// The public key packet.
    pub(crate) fn packet(&self) -> Vec<u8> {
        old_packet(PKT_PUBLIC_KEY, &self.body)
    }

    pub(crate) fn public_key(&self) -> PublicKey {
        PublicKey::parse_body(&self.body).unwrap()
    }

    /// The packet as bare base64, as stored in package headers.
    pub(crate) fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.packet())
    }

    pub(crate) fn armored(&self) -> String {
        let b64 = self.base64();
        let mut out = String::from("-----BEGIN PGP PUBLIC KEY BLOCK-----\nVersion: test\n\n");
        for chunk in b64.as_bytes().chunks(64) {
            out.push_str(std::str::from_utf8(chunk).unwrap());
            out.push('\n');
        }
        // The checksum is not verified on reading.
        out.push_str("=AAAA\n-----END PGP PUBLIC KEY BLOCK-----\n");
        out
    }

    /// Raw signature values over `digest`.
    fn sign_digest(&self, hash: HashAlgo, digest: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut ctx = PkeyCtx::new(&self.pkey)?;
        ctx.sign_init()?;
        if self.algo == 1 {
            ctx.set_rsa_padding(Padding::PKCS1)?;
            ctx.set_signature_md(hash.md())?;
        }
        let mut sig = Vec::new();
        ctx.sign_to_vec(digest, &mut sig)?;
        let values = match self.algo {
            1 => vec![sig],
            17 => {
                let s = DsaSig::from_der(&sig)?;
                vec![s.r().to_vec(), s.s().to_vec()]
            }
            _ => {
                let s = EcdsaSig::from_der(&sig)?;
                vec![s.r().to_vec(), s.s().to_vec()]
            }
        };
        Ok(values)
    }

    fn finish_packet(
        &self,
        mut body: Vec<u8>,
        hash: HashAlgo,
        data: &[u8],
        hashed: &[u8],
        trailer: &[u8],
    ) -> Result<Vec<u8>> {
        let mut h = openssl::hash::Hasher::new(hash.message_digest())?;
        h.update(data)?;
        h.update(hashed)?;
        h.update(trailer)?;
        let digest = h.finish()?;
        body.extend_from_slice(&digest[..2]);
        for v in self.sign_digest(hash, &digest)? {
            body.extend(mpi(&v));
        }
        Ok(old_packet(PKT_SIGNATURE, &body))
    }

    /// A V4 signature packet over `data`, with the issuer unhashed.
    pub(crate) fn sign(&self, hash: HashAlgo, data: &[u8]) -> Result<Vec<u8>> {
        let mut hashed_sub = vec![5, 2];
        hashed_sub.extend_from_slice(&CREATED.to_be_bytes());
        let mut body = vec![4, 0, self.algo, hash.pgp_id()];
        body.extend_from_slice(&(hashed_sub.len() as u16).to_be_bytes());
        body.extend_from_slice(&hashed_sub);
        let hashed = body.clone();
        let mut trailer = vec![4, 0xff];
        trailer.extend_from_slice(&(hashed.len() as u32).to_be_bytes());
        let mut unhashed_sub = vec![9, 16];
        unhashed_sub.extend_from_slice(&self.keyid.0);
        body.extend_from_slice(&(unhashed_sub.len() as u16).to_be_bytes());
        body.extend_from_slice(&unhashed_sub);
        self.finish_packet(body, hash, data, &hashed, &trailer)
    }

    /// A V3 signature packet over `data`.
    pub(crate) fn sign_v3(&self, hash: HashAlgo, data: &[u8]) -> Result<Vec<u8>> {
        let mut hashed = vec![0];
        hashed.extend_from_slice(&CREATED.to_be_bytes());
        let mut body = vec![3, 5];
        body.extend_from_slice(&hashed);
        body.extend_from_slice(&self.keyid.0);
        body.extend_from_slice(&[self.algo, hash.pgp_id()]);
        self.finish_packet(body, hash, data, &hashed, &[])
    }
}
