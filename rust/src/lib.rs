/*
 * Copyright (C) 2018 Red Hat, Inc.
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! Read RPM package files and verify their digests and signatures.
//!
//! A package starts with a fixed lead, followed by a signature header,
//! a metadata header and the (compressed) payload. [`read_and_verify`]
//! reads the first three, checks the strongest digest or signature the
//! caller's policy allows, and hands back the metadata header with the
//! legacy signature tags merged in.

// pub(crate) utilities
mod crypto;
mod error;
mod failpoints;
#[cfg(test)]
mod testutils;

pub mod cli;
pub mod config;
pub mod digest;
pub mod header;
pub mod keys;
pub mod lead;
pub mod package;
pub mod pgp;
pub mod sections;
pub mod select;
pub mod tags;
pub mod verify;

pub use error::PackageError;
pub use keys::{KeyResolver, Keyring, KeyidStash, Trust};
pub use package::{check_signatures, read_and_verify, CheckReport, PackageReader};
pub use select::{select, SelectedMethod, VerifyFlags};
pub use verify::{Verdict, VerifyVerdict};
