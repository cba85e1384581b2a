/*
 * Copyright (C) 2019 Red Hat, Inc.
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! Verification policy files, in YAML or JSON.
//!
//! ```yaml
//! keyring:
//!   - /etc/pki/rpm-gpg
//! untrusted-keys:
//!   - "0x1a2b3c4d5e6f7081"
//! trust-embedded-keys: false
//! disable: [md5, size]
//! no-payload: true
//! ```

use crate::keys::Keyring;
use crate::pgp::KeyId;
use crate::select::VerifyFlags;
use anyhow::{bail, Context, Result};
use fn_error_context::context;
use serde_derive::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    YAML,
    JSON,
}

impl InputFormat {
    pub fn detect_from_filename<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let filename = filename.as_ref();
        match filename.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(InputFormat::YAML),
            Some("json") => Ok(InputFormat::JSON),
            _ => bail!("Unrecognized config extension: {}", filename.display()),
        }
    }
}

/// Parse a YAML or JSON document.
pub fn parse_stream<T, R>(fmt: &InputFormat, input: &mut R) -> Result<T>
where
    T: serde::de::DeserializeOwned,
    R: io::Read,
{
    let parsed: T = match fmt {
        InputFormat::JSON => serde_json::from_reader(input)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?,
        InputFormat::YAML => serde_yaml::from_reader(input)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?,
    };
    Ok(parsed)
}

/// A digest or signature kind that policy can switch off.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    Sha1Header,
    RsaHeader,
    DsaHeader,
    EcdsaHeader,
    Md5,
    Size,
    /// All of the digests.
    Digests,
    /// All of the signatures.
    Signatures,
}

impl Method {
    fn flags(self) -> VerifyFlags {
        match self {
            Method::Sha1Header => VerifyFlags::NOSHA1HEADER,
            Method::RsaHeader => VerifyFlags::NORSAHEADER,
            Method::DsaHeader => VerifyFlags::NODSAHEADER,
            Method::EcdsaHeader => VerifyFlags::NOECDSAHEADER,
            Method::Md5 => VerifyFlags::NOMD5,
            Method::Size => VerifyFlags::NOSIZE,
            Method::Digests => VerifyFlags::NODIGESTS,
            Method::Signatures => VerifyFlags::NOSIGNATURES,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "kebab-case")]
pub struct VerifyConfig {
    /// Key files, or directories of key files.
    #[serde(default)]
    pub keyring: Vec<PathBuf>,
    /// Key ids whose signatures are never trusted.
    #[serde(default)]
    pub untrusted_keys: Vec<String>,
    #[serde(default)]
    pub trust_embedded_keys: bool,
    #[serde(default)]
    pub disable: Vec<Method>,
    /// Only use methods that leave the payload unread.
    #[serde(default)]
    pub no_payload: bool,
}

impl VerifyConfig {
    pub fn parse<R: io::Read>(fmt: InputFormat, input: &mut R) -> Result<Self> {
        let config: Self = parse_stream(&fmt, input)?;
        for id in &config.untrusted_keys {
            id.parse::<KeyId>()
                .with_context(|| format!("Invalid untrusted key id {:?}", id))?;
        }
        Ok(config)
    }

    /// Load a config file; relative keyring paths are resolved against
    /// the directory holding it.
    #[context("Loading config {}", filename.display())]
    pub fn from_path(filename: &Path) -> Result<Self> {
        let fmt = InputFormat::detect_from_filename(filename)?;
        let f = std::fs::File::open(filename)?;
        let mut f = io::BufReader::new(f);
        let mut config = Self::parse(fmt, &mut f).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Parsing {}: {:#}", filename.display(), e),
            )
        })?;
        if let Some(parent) = filename.parent() {
            for p in config.keyring.iter_mut() {
                if p.is_relative() {
                    *p = parent.join(&*p);
                }
            }
        }
        Ok(config)
    }

    /// Fold in settings given on the command line.
    pub fn merge(&mut self, other: VerifyConfig) {
        self.keyring.extend(other.keyring);
        self.untrusted_keys.extend(other.untrusted_keys);
        self.trust_embedded_keys |= other.trust_embedded_keys;
        self.disable.extend(other.disable);
        self.no_payload |= other.no_payload;
    }

    pub fn verify_flags(&self) -> VerifyFlags {
        let mut flags = self
            .disable
            .iter()
            .fold(VerifyFlags::empty(), |acc, m| acc | m.flags());
        if self.no_payload {
            flags |= VerifyFlags::NEEDPAYLOAD;
        }
        flags
    }

    pub fn load_keyring(&self) -> Result<Keyring> {
        let mut keyring = Keyring::new();
        keyring.set_trust_embedded(self.trust_embedded_keys);
        for path in &self.keyring {
            let n = keyring.load_path(path)?;
            tracing::debug!("Loaded {} keys from {}", n, path.display());
        }
        for id in &self.untrusted_keys {
            let id: KeyId = id
                .parse()
                .with_context(|| format!("Invalid untrusted key id {:?}", id))?;
            keyring.distrust(id);
        }
        Ok(keyring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyResolver, Trust};
    use crate::testutils::TestKey;
    use indoc::indoc;

    static VALID_YAML: &str = indoc! {r#"
        keyring:
          - keys
        untrusted-keys:
          - "0x0102030405060708"
        disable: [md5, signatures]
        no-payload: true
    "#};

    #[test]
    fn basic_valid() -> Result<()> {
        let config = VerifyConfig::parse(InputFormat::YAML, &mut VALID_YAML.as_bytes())?;
        assert_eq!(config.keyring, vec![PathBuf::from("keys")]);
        assert!(!config.trust_embedded_keys);
        assert_eq!(
            config.verify_flags(),
            VerifyFlags::NOMD5 | VerifyFlags::NOSIGNATURES | VerifyFlags::NEEDPAYLOAD
        );
        Ok(())
    }

    #[test]
    fn json() -> Result<()> {
        let input = r#"{"trust-embedded-keys": true, "disable": ["digests"]}"#;
        let config = VerifyConfig::parse(InputFormat::JSON, &mut input.as_bytes())?;
        assert!(config.trust_embedded_keys);
        assert_eq!(config.verify_flags(), VerifyFlags::NODIGESTS);
        assert!(config.keyring.is_empty());
        Ok(())
    }

    #[test]
    fn invalid() {
        let unknown = "keyring: []\nunknown-field: true\n";
        let e = VerifyConfig::parse(InputFormat::YAML, &mut unknown.as_bytes()).unwrap_err();
        match e.downcast_ref::<io::Error>() {
            Some(ioe) if ioe.kind() == io::ErrorKind::InvalidInput => {}
            _ => panic!("Expected invalid config, not {}", e),
        }
        let bad_method = "disable: [crc32]\n";
        assert!(VerifyConfig::parse(InputFormat::YAML, &mut bad_method.as_bytes()).is_err());
        let bad_id = "untrusted-keys: [abcd]\n";
        assert!(VerifyConfig::parse(InputFormat::YAML, &mut bad_id.as_bytes()).is_err());
        assert!(InputFormat::detect_from_filename("policy.toml").is_err());
    }

    #[test]
    fn from_path() -> Result<()> {
        let td = tempfile::tempdir()?;
        let key = TestKey::rsa()?;
        std::fs::create_dir(td.path().join("keys"))?;
        std::fs::write(td.path().join("keys/RPM-GPG-KEY-test"), key.armored())?;
        let path = td.path().join("policy.yaml");
        std::fs::write(&path, VALID_YAML)?;

        let config = VerifyConfig::from_path(&path)?;
        assert_eq!(config.keyring, vec![td.path().join("keys")]);
        let keyring = config.load_keyring()?;
        assert_eq!(keyring.len(), 1);
        let found = keyring.find_pubkey(&key.keyid, None).unwrap();
        assert_eq!(found.trust, Trust::Trusted);
        let untrusted: KeyId = "0102030405060708".parse()?;
        let embedded = TestKey::ecdsa()?.public_key();
        let found = keyring.find_pubkey(&untrusted, Some(&embedded));
        assert!(found.is_none());

        let e = VerifyConfig::from_path(&td.path().join("missing.yaml")).unwrap_err();
        assert!(format!("{:#}", e).contains("Loading config"), "{:#}", e);
        Ok(())
    }

    #[test]
    fn merge() {
        let mut config = VerifyConfig {
            disable: vec![Method::Md5],
            ..Default::default()
        };
        config.merge(VerifyConfig {
            disable: vec![Method::Size],
            trust_embedded_keys: true,
            ..Default::default()
        });
        assert!(config.trust_embedded_keys);
        assert_eq!(config.verify_flags(), VerifyFlags::NOMD5 | VerifyFlags::NOSIZE);
    }
}
