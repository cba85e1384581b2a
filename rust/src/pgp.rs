//! Just enough OpenPGP to check package signatures.
//!
//! Signature packets come from the signature header; public keys come
//! from keyring files or from the package itself. Only the fields needed
//! to recompute a digest and check it against a key are decoded.

// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::digest::HashAlgo;
use base64::Engine;
use openssl::nid::Nid;
use openssl::sha::Sha1;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const PKT_SIGNATURE: u8 = 2;
pub const PKT_PUBLIC_KEY: u8 = 6;
pub const PKT_PUBLIC_SUBKEY: u8 = 14;

const SUBPKT_ISSUER: u8 = 16;
const SUBPKT_ISSUER_FINGERPRINT: u8 = 33;

const OID_P256: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
const OID_P384: &[u8] = &[0x2B, 0x81, 0x04, 0x00, 0x22];
const OID_P521: &[u8] = &[0x2B, 0x81, 0x04, 0x00, 0x23];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PgpError {
    #[error("truncated {0}")]
    Truncated(&'static str),
    #[error("unsupported {0}")]
    Unsupported(String),
    #[error("malformed {0}")]
    Malformed(String),
}

/// The 64 bit OpenPGP key id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub [u8; 8]);

impl KeyId {
    /// The low 32 bits in hex, as package tools print key ids.
    pub fn short(&self) -> String {
        hex::encode(&self.0[4..])
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self)
    }
}

impl FromStr for KeyId {
    type Err = PgpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| PgpError::Malformed(format!("key id: {}", e)))?;
        let id: [u8; 8] = bytes
            .try_into()
            .map_err(|_| PgpError::Malformed(format!("key id {:?}: expected 16 hex digits", s)))?;
        Ok(KeyId(id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubkeyAlgo {
    Rsa,
    Dsa,
    Ecdsa,
}

impl PubkeyAlgo {
    pub fn from_pgp(id: u8) -> Option<Self> {
        match id {
            1 | 2 | 3 => Some(PubkeyAlgo::Rsa),
            17 => Some(PubkeyAlgo::Dsa),
            19 => Some(PubkeyAlgo::Ecdsa),
            _ => None,
        }
    }

    pub fn pgp_id(self) -> u8 {
        match self {
            PubkeyAlgo::Rsa => 1,
            PubkeyAlgo::Dsa => 17,
            PubkeyAlgo::Ecdsa => 19,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PubkeyAlgo::Rsa => "RSA",
            PubkeyAlgo::Dsa => "DSA",
            PubkeyAlgo::Ecdsa => "ECDSA",
        }
    }

    fn signature_mpis(self) -> usize {
        match self {
            PubkeyAlgo::Rsa => 1,
            PubkeyAlgo::Dsa | PubkeyAlgo::Ecdsa => 2,
        }
    }
}

/// Bounds-checked reads from a packet body.
struct Reader<'a> {
    buf: &'a [u8],
    what: &'static str,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, what }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PgpError> {
        if n > self.buf.len() {
            return Err(PgpError::Truncated(self.what));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], PgpError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, PgpError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, PgpError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, PgpError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    /// A multiprecision integer: a bit count, then the big endian value.
    fn mpi(&mut self) -> Result<&'a [u8], PgpError> {
        let bits = usize::from(self.u16()?);
        self.take((bits + 7) / 8)
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// One packet: its tag and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub tag: u8,
    pub body: &'a [u8],
}

/// Split the first packet off `data`.
pub fn next_packet(data: &[u8]) -> Result<(Packet<'_>, &[u8]), PgpError> {
    let mut r = Reader::new(data, "packet header");
    let b0 = r.u8()?;
    if b0 & 0x80 == 0 {
        return Err(PgpError::Malformed(format!("packet header byte 0x{:02x}", b0)));
    }
    let (tag, len) = if b0 & 0x40 != 0 {
        let tag = b0 & 0x3f;
        let l0 = usize::from(r.u8()?);
        let len = match l0 {
            0..=191 => l0,
            192..=223 => ((l0 - 192) << 8) + usize::from(r.u8()?) + 192,
            255 => r.u32()? as usize,
            _ => return Err(PgpError::Unsupported("partial body length".into())),
        };
        (tag, len)
    } else {
        let tag = (b0 >> 2) & 0x0f;
        let len = match b0 & 0x03 {
            0 => usize::from(r.u8()?),
            1 => usize::from(r.u16()?),
            2 => r.u32()? as usize,
            _ => r.buf.len(),
        };
        (tag, len)
    };
    r.what = "packet body";
    let body = r.take(len)?;
    Ok((Packet { tag, body }, r.rest()))
}

/// The decoded contents of a signature packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    pub version: u8,
    pub sigtype: u8,
    /// Raw OpenPGP public key algorithm id.
    pub pubkey_algo: u8,
    /// Raw OpenPGP hash algorithm id.
    pub hash_algo: u8,
    pub signer: KeyId,
    /// First two bytes of the expected digest.
    pub signhash16: [u8; 2],
    /// Packet bytes appended to the signed data before digesting.
    pub hashed: Vec<u8>,
    /// The signature values: `[m^d]` for RSA, `[r, s]` for DSA and ECDSA.
    pub mpis: Vec<Vec<u8>>,
}

impl SignatureParams {
    /// Decode a signature header entry, which holds a single packet.
    pub fn parse(pkt: &[u8]) -> Result<Self, PgpError> {
        let (packet, _) = next_packet(pkt)?;
        if packet.tag != PKT_SIGNATURE {
            return Err(PgpError::Malformed(format!(
                "packet: tag {} is not a signature",
                packet.tag
            )));
        }
        Self::parse_body(packet.body)
    }

    pub fn parse_body(body: &[u8]) -> Result<Self, PgpError> {
        let mut r = Reader::new(body, "signature packet");
        let version = r.u8()?;
        let (sigtype, pubkey_algo, hash_algo, signer, hashed) = match version {
            3 => {
                let hashlen = r.u8()?;
                if hashlen != 5 {
                    return Err(PgpError::Malformed(format!(
                        "V3 signature: hashed length {}",
                        hashlen
                    )));
                }
                let hashed = r.take(5)?.to_vec();
                let signer = KeyId(r.array()?);
                let pubkey_algo = r.u8()?;
                let hash_algo = r.u8()?;
                (hashed[0], pubkey_algo, hash_algo, signer, hashed)
            }
            4 => {
                let sigtype = r.u8()?;
                let pubkey_algo = r.u8()?;
                let hash_algo = r.u8()?;
                let hashed_len = usize::from(r.u16()?);
                let hashed_sub = r.take(hashed_len)?;
                let hashed = body[..6 + hashed_len].to_vec();
                let unhashed_len = usize::from(r.u16()?);
                let unhashed_sub = r.take(unhashed_len)?;
                let signer = match issuer(hashed_sub)? {
                    Some(id) => id,
                    None => issuer(unhashed_sub)?.ok_or_else(|| {
                        PgpError::Malformed("V4 signature: no issuer".into())
                    })?,
                };
                (sigtype, pubkey_algo, hash_algo, signer, hashed)
            }
            v => return Err(PgpError::Unsupported(format!("V{} signature", v))),
        };
        let signhash16 = r.array()?;
        let nmpis = PubkeyAlgo::from_pgp(pubkey_algo)
            .map(|a| a.signature_mpis())
            .unwrap_or(0);
        let mut mpis = Vec::with_capacity(nmpis);
        for _ in 0..nmpis {
            mpis.push(r.mpi()?.to_vec());
        }
        Ok(Self {
            version,
            sigtype,
            pubkey_algo,
            hash_algo,
            signer,
            signhash16,
            hashed,
            mpis,
        })
    }

    pub fn pubkey(&self) -> Option<PubkeyAlgo> {
        PubkeyAlgo::from_pgp(self.pubkey_algo)
    }

    pub fn hash(&self) -> Option<HashAlgo> {
        HashAlgo::from_pgp(self.hash_algo)
    }

    /// The final bytes of a V4 digest: version, 0xff and the hashed length.
    pub fn v4_trailer(&self) -> Option<[u8; 6]> {
        if self.version != 4 {
            return None;
        }
        let len = (self.hashed.len() as u32).to_be_bytes();
        Some([self.version, 0xff, len[0], len[1], len[2], len[3]])
    }
}

/// Find the issuer key id among signature subpackets.
fn issuer(sub: &[u8]) -> Result<Option<KeyId>, PgpError> {
    let mut r = Reader::new(sub, "signature subpacket");
    while !r.is_empty() {
        let l0 = usize::from(r.u8()?);
        let len = match l0 {
            0..=191 => l0,
            192..=254 => ((l0 - 192) << 8) + usize::from(r.u8()?) + 192,
            _ => r.u32()? as usize,
        };
        let body = r.take(len)?;
        let (ty, data) = match body.split_first() {
            Some((ty, data)) => (ty & 0x7f, data),
            None => return Err(PgpError::Malformed("signature subpacket: empty".into())),
        };
        match ty {
            SUBPKT_ISSUER if data.len() == 8 => {
                return Ok(Some(KeyId(Reader::new(data, "issuer").array()?)))
            }
            // Version byte, then a 20 byte V4 fingerprint ending in the key id
            SUBPKT_ISSUER_FINGERPRINT if data.len() == 21 && data[0] == 4 => {
                return Ok(Some(KeyId(Reader::new(&data[13..], "issuer").array()?)))
            }
            _ => {}
        }
    }
    Ok(None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    P256,
    P384,
    P521,
}

impl Curve {
    fn from_oid(oid: &[u8]) -> Option<Self> {
        match oid {
            OID_P256 => Some(Curve::P256),
            OID_P384 => Some(Curve::P384),
            OID_P521 => Some(Curve::P521),
            _ => None,
        }
    }

    pub fn oid(self) -> &'static [u8] {
        match self {
            Curve::P256 => OID_P256,
            Curve::P384 => OID_P384,
            Curve::P521 => OID_P521,
        }
    }

    pub(crate) fn nid(self) -> Nid {
        match self {
            Curve::P256 => Nid::X9_62_PRIME256V1,
            Curve::P384 => Nid::SECP384R1,
            Curve::P521 => Nid::SECP521R1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Rsa {
        n: Vec<u8>,
        e: Vec<u8>,
    },
    Dsa {
        p: Vec<u8>,
        q: Vec<u8>,
        g: Vec<u8>,
        y: Vec<u8>,
    },
    Ecdsa {
        curve: Curve,
        /// SEC1 encoded public point.
        point: Vec<u8>,
    },
}

impl KeyMaterial {
    pub fn algo(&self) -> PubkeyAlgo {
        match self {
            KeyMaterial::Rsa { .. } => PubkeyAlgo::Rsa,
            KeyMaterial::Dsa { .. } => PubkeyAlgo::Dsa,
            KeyMaterial::Ecdsa { .. } => PubkeyAlgo::Ecdsa,
        }
    }

    fn parse(r: &mut Reader<'_>, algo: u8) -> Result<Self, PgpError> {
        let material = match PubkeyAlgo::from_pgp(algo) {
            Some(PubkeyAlgo::Rsa) => KeyMaterial::Rsa {
                n: r.mpi()?.to_vec(),
                e: r.mpi()?.to_vec(),
            },
            Some(PubkeyAlgo::Dsa) => KeyMaterial::Dsa {
                p: r.mpi()?.to_vec(),
                q: r.mpi()?.to_vec(),
                g: r.mpi()?.to_vec(),
                y: r.mpi()?.to_vec(),
            },
            Some(PubkeyAlgo::Ecdsa) => {
                let oid_len = usize::from(r.u8()?);
                let oid = r.take(oid_len)?;
                let curve = Curve::from_oid(oid).ok_or_else(|| {
                    PgpError::Unsupported(format!("ECDSA curve {}", hex::encode(oid)))
                })?;
                KeyMaterial::Ecdsa {
                    curve,
                    point: r.mpi()?.to_vec(),
                }
            }
            None => {
                return Err(PgpError::Unsupported(format!(
                    "public key algorithm {}",
                    algo
                )))
            }
        };
        Ok(material)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub version: u8,
    pub created: u32,
    pub keyid: KeyId,
    pub material: KeyMaterial,
}

impl PublicKey {
    /// Decode a public key or public subkey packet body.
    pub fn parse_body(body: &[u8]) -> Result<Self, PgpError> {
        let mut r = Reader::new(body, "public key packet");
        let version = r.u8()?;
        let created = r.u32()?;
        let (material, keyid) = match version {
            4 => {
                let algo = r.u8()?;
                let material = KeyMaterial::parse(&mut r, algo)?;
                let fpr = v4_fingerprint(body);
                (material, KeyId(Reader::new(&fpr[12..], "fingerprint").array()?))
            }
            2 | 3 => {
                let _validity_days = r.u16()?;
                let algo = r.u8()?;
                let material = KeyMaterial::parse(&mut r, algo)?;
                // The key id of an old RSA key is the low 64 bits of the modulus
                let keyid = match &material {
                    KeyMaterial::Rsa { n, .. } if n.len() >= 8 => {
                        KeyId(Reader::new(&n[n.len() - 8..], "modulus").array()?)
                    }
                    _ => {
                        return Err(PgpError::Unsupported(format!(
                            "V{} {} key",
                            version,
                            material.algo().name()
                        )))
                    }
                };
                (material, keyid)
            }
            v => return Err(PgpError::Unsupported(format!("V{} public key", v))),
        };
        Ok(Self {
            version,
            created,
            keyid,
            material,
        })
    }
}

fn v4_fingerprint(body: &[u8]) -> [u8; 20] {
    let mut h = Sha1::new();
    h.update(&[0x99]);
    h.update(&(body.len() as u16).to_be_bytes());
    h.update(body);
    h.finish()
}

/// Decode every supported primary key and subkey in a packet sequence.
/// User ids, certifications and keys of unsupported algorithms are skipped.
pub fn parse_pubkeys(mut data: &[u8]) -> Result<Vec<PublicKey>, PgpError> {
    let mut keys = Vec::new();
    while !data.is_empty() {
        let (packet, rest) = next_packet(data)?;
        data = rest;
        if !matches!(packet.tag, PKT_PUBLIC_KEY | PKT_PUBLIC_SUBKEY) {
            continue;
        }
        match PublicKey::parse_body(packet.body) {
            Ok(key) => keys.push(key),
            Err(PgpError::Unsupported(what)) => tracing::debug!("Skipping {}", what),
            Err(e) => return Err(e),
        }
    }
    Ok(keys)
}

/// Decode an ASCII armored block, or bare base64 as stored in package
/// headers, into packet bytes. The armor checksum is not verified.
pub fn unarmor(text: &str) -> Result<Vec<u8>, PgpError> {
    let text = text.trim();
    let b64: String = if text.starts_with("-----BEGIN PGP") {
        let mut body = String::new();
        let mut in_headers = true;
        for line in text.lines().skip(1) {
            let line = line.trim();
            if in_headers {
                // Armor headers end with a blank line; base64 never contains ':'
                if line.is_empty() || !line.contains(':') {
                    in_headers = false;
                    body.push_str(line);
                }
                continue;
            }
            if line.starts_with("-----END") || line.starts_with('=') {
                break;
            }
            body.push_str(line);
        }
        body
    } else {
        text.split_whitespace().collect()
    };
    base64::engine::general_purpose::STANDARD
        .decode(b64.as_bytes())
        .map_err(|e| PgpError::Malformed(format!("armor: {}", e)))
}
