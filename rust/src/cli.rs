//! Command line entrypoint.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::config::{Method, VerifyConfig};
use crate::keys::{KeyidStash, Keyring};
use crate::package::PackageReader;
use crate::pgp::KeyId;
use crate::select::VerifyFlags;
use anyhow::{Context, Result};
use clap::Parser;
use fn_error_context::context;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[clap(name = "rpmpkg-verify")]
#[clap(rename_all = "kebab-case")]
/// Verify the digests and signatures of package files
struct Opt {
    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, clap::Subcommand)]
#[clap(rename_all = "kebab-case")]
enum Cmd {
    /// Check the strongest digest or signature each package carries
    Verify {
        #[clap(flatten)]
        opts: CheckOpts,
    },
    /// Check every digest and signature each package carries
    Checksig {
        #[clap(flatten)]
        opts: CheckOpts,
        /// Print one line per digest or signature
        #[clap(long, short)]
        verbose: bool,
    },
    /// Print the metadata header of a package as JSON
    Dump {
        /// Path to package
        path: PathBuf,
    },
}

#[derive(Debug, clap::Args)]
#[clap(rename_all = "kebab-case")]
struct CheckOpts {
    /// Policy file, in YAML or JSON
    #[clap(long)]
    config: Option<PathBuf>,

    /// Public key file, or directory of key files; may be repeated
    #[clap(long)]
    keyring: Vec<PathBuf>,

    /// Trust public keys shipped inside the packages themselves
    #[clap(long)]
    trust_embedded: bool,

    /// Skip digests
    #[clap(long)]
    nodigest: bool,

    /// Skip signatures
    #[clap(long)]
    nosignature: bool,

    /// Do not read package payloads
    #[clap(long)]
    nopayload: bool,

    /// Package files
    #[clap(required = true)]
    packages: Vec<PathBuf>,
}

impl CheckOpts {
    /// The config file, if any, with command line settings folded in.
    fn policy(&self) -> Result<(VerifyFlags, Keyring)> {
        let mut config = match self.config.as_deref() {
            Some(p) => VerifyConfig::from_path(p)?,
            None => VerifyConfig::default(),
        };
        let mut disable = Vec::new();
        if self.nodigest {
            disable.push(Method::Digests);
        }
        if self.nosignature {
            disable.push(Method::Signatures);
        }
        config.merge(VerifyConfig {
            keyring: self.keyring.clone(),
            trust_embedded_keys: self.trust_embedded,
            disable,
            no_payload: self.nopayload,
            ..Default::default()
        });
        let keyring = config.load_keyring()?;
        tracing::debug!("{} public keys loaded", keyring.len());
        Ok((config.verify_flags(), keyring))
    }
}

#[context("Opening {}", path.display())]
fn open_package(path: &Path) -> Result<BufReader<std::fs::File>> {
    Ok(BufReader::new(std::fs::File::open(path)?))
}

/// What to do with one package; returns whether it passed.
fn for_each_package(
    opts: &CheckOpts,
    out: &mut dyn Write,
    mut f: impl FnMut(&PackageReader, &Path, &mut BufReader<std::fs::File>, &mut dyn Write) -> Result<bool>,
) -> Result<i32> {
    let (flags, keyring) = opts.policy()?;
    let stash = KeyidStash::new();
    let repeated = |id: &KeyId| stash.seen(id);
    let reader = PackageReader::new(flags, &keyring).on_repeated_verdict(&repeated);
    let mut failed = false;
    for path in &opts.packages {
        let span = tracing::info_span!("package", path = %path.display());
        let _guard = span.enter();
        let mut stream = open_package(path)?;
        if !f(&reader, path, &mut stream, out)? {
            failed = true;
        }
    }
    Ok(if failed { 1 } else { 0 })
}

fn verify(opts: &CheckOpts, out: &mut dyn Write) -> Result<i32> {
    for_each_package(opts, out, |reader, path, stream, out| {
        match reader.read_and_verify(stream) {
            Ok((_, v)) => {
                writeln!(out, "{}: {}", path.display(), v)?;
                Ok(v.is_ok())
            }
            Err(e) if e.is_not_found() => {
                writeln!(out, "{}: skipped, {}", path.display(), e)?;
                Ok(true)
            }
            Err(e) => {
                writeln!(out, "{}: {}", path.display(), e)?;
                Ok(false)
            }
        }
    })
}

fn checksig(opts: &CheckOpts, verbose: bool, out: &mut dyn Write) -> Result<i32> {
    for_each_package(opts, out, |reader, path, stream, out| {
        let report = match reader.check_signatures(stream) {
            Ok(r) => r,
            Err(e) if e.is_not_found() => {
                writeln!(out, "{}: skipped, {}", path.display(), e)?;
                return Ok(true);
            }
            Err(e) => {
                writeln!(out, "{}: {}", path.display(), e)?;
                return Ok(false);
            }
        };
        if verbose {
            writeln!(out, "{}:", path.display())?;
            for line in report.lines() {
                writeln!(out, "    {}", line)?;
            }
        } else {
            writeln!(out, "{}: {}", path.display(), report.summary())?;
        }
        Ok(report.is_ok())
    })
}

fn dump(path: &Path, out: &mut dyn Write) -> Result<i32> {
    let mut stream = open_package(path)?;
    // Nothing is verified, and the payload stays unread
    let (h, _) = crate::read_and_verify(&mut stream, VerifyFlags::all(), &Keyring::new())
        .with_context(|| format!("Reading {}", path.display()))?;
    serde_json::to_writer_pretty(&mut *out, &h)?;
    writeln!(out)?;
    Ok(0)
}

fn run(opt: Opt, out: &mut dyn Write) -> Result<i32> {
    match opt.cmd {
        Cmd::Verify { opts } => verify(&opts, out),
        Cmd::Checksig { opts, verbose } => checksig(&opts, verbose, out),
        Cmd::Dump { path } => dump(&path, out),
    }
}

/// Primary entrypoint; returns the process exit code.
pub fn main(argv: &[&str]) -> Result<i32> {
    let opt = Opt::parse_from(argv.iter());
    let stdout = std::io::stdout();
    let mut stdout = stdout.lock();
    let r = run(opt, &mut stdout)?;
    stdout.flush()?;
    Ok(r)
}
