//! Picking the strongest verification method a package offers.

// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::pgp::PubkeyAlgo;
use crate::sections::SignatureHeader;
use crate::tags::sigtag;
use bitflags::bitflags;

bitflags! {
    /// Verification policy. Every bit disables something; the empty set
    /// allows all methods.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VerifyFlags: u32 {
        /// The payload must be left unread, so neither header+payload
        /// method can be used.
        const NEEDPAYLOAD = 1 << 1;
        const NOSHA1HEADER = 1 << 8;
        const NODSAHEADER = 1 << 10;
        const NORSAHEADER = 1 << 11;
        const NOECDSAHEADER = 1 << 12;
        const NOMD5 = 1 << 17;
        const NOSIZE = 1 << 20;

        const NODIGESTS = Self::NOSHA1HEADER.bits() | Self::NOMD5.bits() | Self::NOSIZE.bits();
        const NOSIGNATURES = Self::NODSAHEADER.bits()
            | Self::NORSAHEADER.bits()
            | Self::NOECDSAHEADER.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectedMethod {
    /// Declared size of metadata header plus payload.
    Size,
    /// MD5 over metadata header plus payload.
    Md5,
    /// SHA1 over the metadata header.
    Sha1,
    Rsa,
    Dsa,
    Ecdsa,
}

impl SelectedMethod {
    /// Strongest first.
    pub const PRIORITY: [SelectedMethod; 6] = [
        SelectedMethod::Ecdsa,
        SelectedMethod::Dsa,
        SelectedMethod::Rsa,
        SelectedMethod::Sha1,
        SelectedMethod::Md5,
        SelectedMethod::Size,
    ];

    pub fn sigtag(self) -> u32 {
        match self {
            SelectedMethod::Size => sigtag::SIZE,
            SelectedMethod::Md5 => sigtag::MD5,
            SelectedMethod::Sha1 => sigtag::SHA1,
            SelectedMethod::Rsa => sigtag::RSA,
            SelectedMethod::Dsa => sigtag::DSA,
            SelectedMethod::Ecdsa => sigtag::ECDSA,
        }
    }

    pub fn from_sigtag(tag: u32) -> Option<Self> {
        Self::PRIORITY.iter().copied().find(|m| m.sigtag() == tag)
    }

    pub fn needs_payload(self) -> bool {
        matches!(self, SelectedMethod::Size | SelectedMethod::Md5)
    }

    /// The public key algorithm of a signature method.
    pub fn pubkey_algo(self) -> Option<PubkeyAlgo> {
        match self {
            SelectedMethod::Rsa => Some(PubkeyAlgo::Rsa),
            SelectedMethod::Dsa => Some(PubkeyAlgo::Dsa),
            SelectedMethod::Ecdsa => Some(PubkeyAlgo::Ecdsa),
            _ => None,
        }
    }

    fn disabled_by(self) -> VerifyFlags {
        match self {
            SelectedMethod::Size => VerifyFlags::NOSIZE,
            SelectedMethod::Md5 => VerifyFlags::NOMD5,
            SelectedMethod::Sha1 => VerifyFlags::NOSHA1HEADER,
            SelectedMethod::Rsa => VerifyFlags::NORSAHEADER,
            SelectedMethod::Dsa => VerifyFlags::NODSAHEADER,
            SelectedMethod::Ecdsa => VerifyFlags::NOECDSAHEADER,
        }
    }

    pub fn permitted(self, flags: VerifyFlags) -> bool {
        !flags.intersects(self.disabled_by())
            && !(self.needs_payload() && flags.contains(VerifyFlags::NEEDPAYLOAD))
    }

    /// Short lowercase name used in summary reports.
    pub fn short_name(self) -> &'static str {
        match self {
            SelectedMethod::Size => "size",
            SelectedMethod::Md5 => "md5",
            SelectedMethod::Sha1 => "sha1",
            SelectedMethod::Rsa => "rsa",
            SelectedMethod::Dsa => "dsa",
            SelectedMethod::Ecdsa => "ecdsa",
        }
    }
}

/// Choose the single method to verify: the first of
/// [`SelectedMethod::PRIORITY`] that policy permits and the signature
/// header carries. `None` means there is nothing to verify.
pub fn select(sigh: &SignatureHeader, flags: VerifyFlags) -> Option<SelectedMethod> {
    let method = SelectedMethod::PRIORITY
        .iter()
        .copied()
        .find(|m| m.permitted(flags) && sigh.is_entry(m.sigtag()));
    tracing::debug!("selected {:?} with flags {:?}", method, flags);
    method
}
