//! Public key signature checks, backed by OpenSSL.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::digest::HashAlgo;
use crate::pgp::KeyMaterial;
use openssl::bn::{BigNum, BigNumContext};
use openssl::dsa::{Dsa, DsaSig};
use openssl::ec::{EcGroup, EcKey, EcPoint};
use openssl::ecdsa::EcdsaSig;
use openssl::error::ErrorStack;
use openssl::pkey::PKey;
use openssl::pkey_ctx::PkeyCtx;
use openssl::rsa::{Padding, Rsa};

fn bn(v: &[u8]) -> Result<BigNum, ErrorStack> {
    BigNum::from_slice(v)
}

/// Check the signature values `sig` over an already computed `digest`.
///
/// `Ok(false)` means the signature does not match; errors come from
/// OpenSSL rejecting the key or signature encoding.
pub(crate) fn verify_digest(
    key: &KeyMaterial,
    hash: HashAlgo,
    digest: &[u8],
    sig: &[Vec<u8>],
) -> Result<bool, ErrorStack> {
    match key {
        KeyMaterial::Rsa { n, e } => {
            let [m] = sig else {
                return Ok(false);
            };
            let rsa = Rsa::from_public_components(bn(n)?, bn(e)?)?;
            // MPIs drop leading zeros; PKCS#1 wants the full modulus width.
            let size = rsa.size() as usize;
            if m.len() > size {
                return Ok(false);
            }
            let mut padded = vec![0u8; size - m.len()];
            padded.extend_from_slice(m);
            let pkey = PKey::from_rsa(rsa)?;
            let mut ctx = PkeyCtx::new(&pkey)?;
            ctx.verify_init()?;
            ctx.set_rsa_padding(Padding::PKCS1)?;
            ctx.set_signature_md(hash.md())?;
            ctx.verify(digest, &padded)
        }
        KeyMaterial::Dsa { p, q, g, y } => {
            let [r, s] = sig else {
                return Ok(false);
            };
            let dsa = Dsa::from_public_components(bn(p)?, bn(q)?, bn(g)?, bn(y)?)?;
            let der = DsaSig::from_private_components(bn(r)?, bn(s)?)?.to_der()?;
            let pkey = PKey::from_dsa(dsa)?;
            let mut ctx = PkeyCtx::new(&pkey)?;
            ctx.verify_init()?;
            ctx.verify(digest, &der)
        }
        KeyMaterial::Ecdsa { curve, point } => {
            let [r, s] = sig else {
                return Ok(false);
            };
            let group = EcGroup::from_curve_name(curve.nid())?;
            let mut bnctx = BigNumContext::new()?;
            let point = EcPoint::from_bytes(&group, point, &mut bnctx)?;
            let key = EcKey::from_public_key(&group, &point)?;
            EcdsaSig::from_private_components(bn(r)?, bn(s)?)?.verify(digest, &key)
        }
    }
}
