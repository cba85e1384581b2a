//! Readers for the sections that precede the payload.

// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::header::{read_blob, read_full, BlobKind, Header, RawHeader};
use crate::PackageError;
use std::io::Read;

pub use crate::lead::{read_lead, LeadRecord};

/// Digests and signatures, keyed by signature tag.
pub type SignatureHeader = Header;
/// Package metadata, keyed by metadata tag.
pub type MetadataHeader = Header;

/// Read the signature header and the padding that aligns the metadata
/// header to 8 bytes.
pub fn read_signature_header<R: Read + ?Sized>(r: &mut R) -> Result<SignatureHeader, PackageError> {
    let raw = read_blob(r, BlobKind::Signature)?;
    let sigh = Header::load(&raw)?;
    let size = raw.len() as usize;
    let pad = (8 - size % 8) % 8;
    if pad > 0 {
        let mut block = [0u8; 8];
        let n = read_full(r, &mut block[..pad])?;
        if n != pad {
            return Err(PackageError::malformed(format!(
                "sigh pad({}): BAD, read {} bytes",
                pad, n
            )));
        }
    }
    tracing::debug!("Signature: size({})+pad({})", size, pad);
    Ok(sigh)
}

/// Read the metadata header, returning it together with its exact
/// serialized bytes for digesting.
pub fn read_metadata_header<R: Read + ?Sized>(
    r: &mut R,
) -> Result<(MetadataHeader, RawHeader), PackageError> {
    let raw = read_blob(r, BlobKind::Metadata)?;
    let h = Header::load(&raw)?;
    Ok((h, raw))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tags::{rpmtag, sigtag};
    use crate::testutils::{metadata_blob, signature_section, HeaderBuilder};
    use anyhow::Result;

    #[test]
    fn padding_consumed() -> Result<()> {
        // 16 + 2 * 16 + 5 + 16 bytes: needs 3 bytes of padding
        let b = HeaderBuilder::new()
            .region(rpmtag::HEADERSIGNATURES)
            .string(sigtag::SHA1, "abcd");
        let sig = signature_section(b);
        assert_eq!(sig.len() % 8, 0);
        let meta = metadata_blob();
        let mut data = sig.clone();
        data.extend_from_slice(&meta);
        let mut r = &data[..];
        let sigh = read_signature_header(&mut r)?;
        assert_eq!(sigh.get_string(sigtag::SHA1), Some("abcd"));
        let (h, raw) = read_metadata_header(&mut r)?;
        assert_eq!(raw.as_bytes(), &meta[..]);
        assert_eq!(h.get_string(rpmtag::NAME), Some("hello"));
        assert!(r.is_empty());
        Ok(())
    }

    #[test]
    fn short_padding() {
        let b = HeaderBuilder::new().string(sigtag::SHA1, "abcd");
        let sig = signature_section(b);
        let e = read_signature_header(&mut &sig[..sig.len() - 1]).unwrap_err();
        assert!(e.to_string().contains("sigh pad"), "{}", e);
    }
}
