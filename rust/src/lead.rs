//! The legacy lead that starts every package file.
//!
//! Apart from the magic and the signature type nothing in the lead is
//! relied upon; the metadata header carries the authoritative values.

// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::header::read_full;
use crate::PackageError;
use binread::{BinRead, BinReaderExt};
use std::io::{Cursor, Read};

pub const LEAD_SIZE: usize = 96;
pub const LEAD_MAGIC: [u8; 4] = [0xED, 0xAB, 0xEE, 0xDB];
/// The signature header follows the lead.
pub const SIGTYPE_HEADERSIG: u16 = 5;
const NAME_SIZE: usize = 66;

#[derive(BinRead, Debug, Clone, PartialEq, Eq)]
#[br(big)]
pub struct LeadRecord {
    pub magic: [u8; 4],
    pub major: u8,
    pub minor: u8,
    /// 0 for binary packages, 1 for source packages.
    pub kind: u16,
    pub archnum: u16,
    #[br(count = NAME_SIZE)]
    name: Vec<u8>,
    pub osnum: u16,
    #[br(pad_after = 16)]
    pub signature_type: u16,
}

impl LeadRecord {
    /// The NUL-padded package name recorded at build time.
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn is_source(&self) -> bool {
        self.kind == 1
    }
}

/// Read and check the lead.
///
/// A stream too short to hold a lead yields [`PackageError::NotFound`];
/// a lead with the wrong magic or an unsupported version or signature
/// type is [`PackageError::Malformed`].
pub fn read_lead<R: Read + ?Sized>(r: &mut R) -> Result<LeadRecord, PackageError> {
    let mut buf = [0u8; LEAD_SIZE];
    let n = read_full(r, &mut buf)?;
    if n != LEAD_SIZE {
        return Err(PackageError::NotFound(format!(
            "lead size({}): BAD, read({})",
            LEAD_SIZE, n
        )));
    }
    let lead: LeadRecord = Cursor::new(&buf[..]).read_be()?;
    if lead.magic != LEAD_MAGIC {
        return Err(PackageError::malformed(format!(
            "lead magic: BAD, read {}",
            hex::encode(lead.magic)
        )));
    }
    if !matches!(lead.major, 3 | 4) {
        return Err(PackageError::malformed(format!(
            "lead version({}): UNSUPPORTED",
            lead.major
        )));
    }
    if lead.signature_type != SIGTYPE_HEADERSIG {
        return Err(PackageError::malformed(format!(
            "sigh type({}): UNSUPPORTED",
            lead.signature_type
        )));
    }
    tracing::debug!("lead: {} v{}.{}", lead.name(), lead.major, lead.minor);
    Ok(lead)
}
