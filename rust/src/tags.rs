//! Tag numbers used in signature and metadata headers.
//!
//! The two headers number their tags independently; `sigtag::SIZE` and
//! `rpmtag::NAME` are both 1000.
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// Tags of the metadata header.
pub mod rpmtag {
    /// Legacy region tag, accepted wherever a region tag is expected.
    pub const HEADERIMAGE: u32 = 61;
    pub const HEADERSIGNATURES: u32 = 62;
    pub const HEADERIMMUTABLE: u32 = 63;

    /// First tag number reserved for signature entries.
    pub const SIGBASE: u32 = 256;
    pub const SIGSIZE: u32 = 257;
    pub const SIGPGP: u32 = 259;
    pub const SIGMD5: u32 = 261;
    pub const SIGGPG: u32 = 262;
    pub const PUBKEYS: u32 = 266;
    pub const DSAHEADER: u32 = 267;
    pub const RSAHEADER: u32 = 268;
    pub const SHA1HEADER: u32 = 269;
    pub const ECDSAHEADER: u32 = 278;

    /// First tag number of the package metadata proper.
    pub const TAGBASE: u32 = 1000;
    pub const NAME: u32 = 1000;
    pub const VERSION: u32 = 1001;
    pub const RELEASE: u32 = 1002;
    pub const OS: u32 = 1021;
    pub const ARCH: u32 = 1022;
    pub const ARCHIVESIZE: u32 = 1046;
}

/// Tags of the signature header.
pub mod sigtag {
    use super::rpmtag;

    /// Size of the metadata header plus payload.
    pub const SIZE: u32 = 1000;
    pub const LEMD5_1: u32 = 1001;
    pub const PGP: u32 = 1002;
    pub const LEMD5_2: u32 = 1003;
    /// MD5 of the metadata header plus payload.
    pub const MD5: u32 = 1004;
    pub const GPG: u32 = 1005;
    pub const PGP5: u32 = 1006;
    /// Uncompressed payload size.
    pub const PAYLOADSIZE: u32 = 1007;

    pub const PUBKEYS: u32 = rpmtag::PUBKEYS;
    pub const DSA: u32 = rpmtag::DSAHEADER;
    pub const RSA: u32 = rpmtag::RSAHEADER;
    /// Hex SHA1 of the metadata header.
    pub const SHA1: u32 = rpmtag::SHA1HEADER;
    pub const ECDSA: u32 = rpmtag::ECDSAHEADER;

    /// Signature kinds that may appear in old packages but cannot be checked here.
    pub fn is_unsupported_signature(tag: u32) -> bool {
        matches!(tag, LEMD5_1 | PGP | LEMD5_2 | GPG | PGP5)
    }
}
