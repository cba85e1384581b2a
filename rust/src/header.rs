//! Functions for loading RPM header blobs.
//!
//! The signature header and the metadata header share one on-disk
//! layout: an 8 byte magic, the index entry count `il` and data length
//! `dl` (both big endian), `il` index entries of 16 bytes each, and then
//! `dl` bytes of data the entries point into.

// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::tags::{rpmtag, sigtag};
use crate::PackageError;
use binread::{BinRead, BinReaderExt};
use serde_derive::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

pub const HEADER_MAGIC: [u8; 8] = [0x8E, 0xAD, 0xE8, 0x01, 0x00, 0x00, 0x00, 0x00];
/// Magic plus the `il` and `dl` words.
pub(crate) const INTRO_SIZE: usize = 16;
/// One index entry; a region trailer has the same size.
pub(crate) const ENTRY_SIZE: usize = 16;
/// String and binary entries at least this large are not merged from the
/// signature header.
const MERGE_MAX_LEN: usize = 16 * 1024;

/// Like `Read::read_exact`, but a short read is not an error: the number of
/// bytes actually read is returned so callers can report it.
pub(crate) fn read_full<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        match r.read(&mut buf[n..]) {
            Ok(0) => break,
            Ok(k) => n += k,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(n)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u32)]
pub enum TagType {
    Null = 0,
    Char = 1,
    Int8 = 2,
    Int16 = 3,
    Int32 = 4,
    Int64 = 5,
    String = 6,
    Bin = 7,
    StringArray = 8,
    I18nString = 9,
}

impl TagType {
    pub fn from_raw(v: u32) -> Option<Self> {
        let t = match v {
            0 => TagType::Null,
            1 => TagType::Char,
            2 => TagType::Int8,
            3 => TagType::Int16,
            4 => TagType::Int32,
            5 => TagType::Int64,
            6 => TagType::String,
            7 => TagType::Bin,
            8 => TagType::StringArray,
            9 => TagType::I18nString,
            _ => return None,
        };
        Some(t)
    }

    pub fn raw(self) -> u32 {
        self as u32
    }

    /// Required alignment of the data, relative to the start of the data area.
    pub fn align(self) -> usize {
        match self {
            TagType::Int16 => 2,
            TagType::Int32 => 4,
            TagType::Int64 => 8,
            _ => 1,
        }
    }
}

#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(big)]
struct BlobIntro {
    magic: [u8; 8],
    il: u32,
    dl: u32,
}

/// A single index entry as stored on disk.
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(big)]
pub struct EntryInfo {
    pub tag: u32,
    pub ty: u32,
    pub offset: i32,
    pub count: u32,
}

impl EntryInfo {
    fn describe(&self) -> String {
        format!(
            "tag {} type {} offset {} count {}",
            self.tag, self.ty, self.offset, self.count
        )
    }
}

/// Which of the two headers a blob is; they differ in their limits and
/// in the tag that marks their immutable region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Signature,
    Metadata,
}

impl BlobKind {
    fn label(self) -> &'static str {
        match self {
            BlobKind::Signature => "sigh",
            BlobKind::Metadata => "hdr",
        }
    }

    fn tags_in_range(self, il: u32) -> bool {
        match self {
            BlobKind::Signature => il <= 32,
            BlobKind::Metadata => il & 0xff00_0000 == 0,
        }
    }

    fn data_in_range(self, dl: u32) -> bool {
        match self {
            BlobKind::Signature => dl <= 8192,
            BlobKind::Metadata => dl & 0xc000_0000 == 0,
        }
    }

    fn is_region_tag(self, tag: u32) -> bool {
        let expected = match self {
            BlobKind::Signature => rpmtag::HEADERSIGNATURES,
            BlobKind::Metadata => rpmtag::HEADERIMMUTABLE,
        };
        tag == expected || tag == rpmtag::HEADERIMAGE
    }
}

/// The immutable region of a header: the entries and data that were
/// present when the package was built and signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub tag: u32,
    /// Number of index entries covered, including the region tag itself.
    pub entries: u32,
    /// Number of data bytes covered, including the trailer.
    pub data_len: u32,
}

/// A header blob exactly as it was read, with its index decoded.
#[derive(Debug, Clone)]
pub struct RawHeader {
    kind: BlobKind,
    bytes: Vec<u8>,
    index: Vec<EntryInfo>,
    dl: u32,
    region: Option<Region>,
}

impl RawHeader {
    /// The complete serialized header, magic included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> u32 {
        // Bounded by the il/dl limits checked when reading.
        self.bytes.len() as u32
    }

    /// True for a header without index entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn region(&self) -> Option<Region> {
        self.region
    }

    pub fn entries(&self) -> &[EntryInfo] {
        &self.index
    }

    fn data(&self) -> &[u8] {
        &self.bytes[INTRO_SIZE + self.index.len() * ENTRY_SIZE..]
    }

    /// The bytes covered by header-only digests and signatures.
    ///
    /// When the immutable region spans the whole header this is the blob
    /// itself. Otherwise the region is re-serialized with its own entry
    /// count and data length, dropping entries appended after signing.
    pub fn immutable(&self) -> Cow<'_, [u8]> {
        let il = self.index.len() as u32;
        match self.region {
            Some(r) if r.entries < il || r.data_len < self.dl => {
                let ril = r.entries as usize;
                let rdl = r.data_len as usize;
                let mut buf = Vec::with_capacity(INTRO_SIZE + ril * ENTRY_SIZE + rdl);
                buf.extend_from_slice(&HEADER_MAGIC);
                buf.extend_from_slice(&r.entries.to_be_bytes());
                buf.extend_from_slice(&r.data_len.to_be_bytes());
                buf.extend_from_slice(&self.bytes[INTRO_SIZE..INTRO_SIZE + ril * ENTRY_SIZE]);
                buf.extend_from_slice(&self.data()[..rdl]);
                Cow::Owned(buf)
            }
            _ => Cow::Borrowed(&self.bytes),
        }
    }

    fn check_entries(&self) -> Result<(), PackageError> {
        let label = self.kind.label();
        for (i, e) in self.index.iter().enumerate() {
            let ty = TagType::from_raw(e.ty);
            let ok = match ty {
                Some(ty) => {
                    e.offset >= 0
                        && (e.offset as u32) <= self.dl
                        && (e.offset as usize) % ty.align() == 0
                }
                None => false,
            };
            if !ok {
                return Err(PackageError::malformed(format!(
                    "{} tag[{}]: BAD, {}",
                    label,
                    i,
                    e.describe()
                )));
            }
        }
        Ok(())
    }

    fn find_region(&self) -> Result<Option<Region>, PackageError> {
        let first = match self.index.first() {
            Some(e) => *e,
            None => return Ok(None),
        };
        if !(self.kind.is_region_tag(first.tag)
            && first.ty == TagType::Bin.raw()
            && first.count as usize == ENTRY_SIZE)
        {
            return Ok(None);
        }
        let label = self.kind.label();
        let data = self.data();
        let start = usize::try_from(first.offset)
            .ok()
            .filter(|o| o + ENTRY_SIZE <= data.len())
            .ok_or_else(|| {
                PackageError::malformed(format!(
                    "{} region offset: BAD, {}",
                    label,
                    first.describe()
                ))
            })?;
        let trailer: EntryInfo = Cursor::new(&data[start..start + ENTRY_SIZE]).read_be()?;
        if !(self.kind.is_region_tag(trailer.tag)
            && trailer.ty == TagType::Bin.raw()
            && trailer.count as usize == ENTRY_SIZE)
        {
            return Err(PackageError::malformed(format!(
                "{} region trailer: BAD, {}",
                label,
                trailer.describe()
            )));
        }
        // The trailer offset is the negated size of the region's index.
        let span = -i64::from(trailer.offset);
        let il = self.index.len() as i64;
        if span <= 0 || span % ENTRY_SIZE as i64 != 0 || span / ENTRY_SIZE as i64 > il {
            return Err(PackageError::malformed(format!(
                "{} region size: BAD, ril({}) > il({})",
                label,
                span / ENTRY_SIZE as i64,
                il
            )));
        }
        Ok(Some(Region {
            tag: first.tag,
            entries: (span / ENTRY_SIZE as i64) as u32,
            data_len: (start + ENTRY_SIZE) as u32,
        }))
    }
}

/// Read one header blob, validating its structure.
pub(crate) fn read_blob<R: Read + ?Sized>(
    r: &mut R,
    kind: BlobKind,
) -> Result<RawHeader, PackageError> {
    let label = kind.label();
    let mut intro_buf = [0u8; INTRO_SIZE];
    let n = read_full(r, &mut intro_buf)?;
    if n != INTRO_SIZE {
        return Err(PackageError::malformed(format!(
            "{} size({}): BAD, read returned {}",
            label, INTRO_SIZE, n
        )));
    }
    let intro: BlobIntro = Cursor::new(&intro_buf[..]).read_be()?;
    if intro.magic != HEADER_MAGIC {
        return Err(PackageError::malformed(format!(
            "{} magic: BAD, read {}",
            label,
            hex::encode(intro.magic)
        )));
    }
    if !kind.tags_in_range(intro.il) {
        return Err(PackageError::malformed(format!(
            "{} tags: BAD, no. of tags({}) out of range",
            label, intro.il
        )));
    }
    if !kind.data_in_range(intro.dl) {
        return Err(PackageError::malformed(format!(
            "{} data: BAD, no. of bytes({}) out of range",
            label, intro.dl
        )));
    }
    let nb = intro.il as usize * ENTRY_SIZE + intro.dl as usize;
    // The sizes are unchecked until read, so grow with the data.
    let mut bytes = intro_buf.to_vec();
    let n = (&mut *r).take(nb as u64).read_to_end(&mut bytes)?;
    if n != nb {
        return Err(PackageError::malformed(format!(
            "{} blob({}): BAD, read returned {}",
            label, nb, n
        )));
    }
    let mut cursor = Cursor::new(&bytes[INTRO_SIZE..INTRO_SIZE + intro.il as usize * ENTRY_SIZE]);
    let mut index = Vec::with_capacity(intro.il as usize);
    for _ in 0..intro.il {
        index.push(cursor.read_be::<EntryInfo>()?);
    }
    let mut raw = RawHeader {
        kind,
        bytes,
        index,
        dl: intro.dl,
        region: None,
    };
    raw.check_entries()?;
    raw.region = raw.find_region()?;
    tracing::trace!(
        "{}: il({}) dl({}) region {:?}",
        label,
        raw.index.len(),
        raw.dl,
        raw.region
    );
    Ok(raw)
}

/// A decoded tag value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum TagValue {
    Null,
    Char(Vec<u8>),
    Int8(Vec<u8>),
    Int16(Vec<u16>),
    Int32(Vec<u32>),
    Int64(Vec<u64>),
    String(String),
    Bin(Vec<u8>),
    StringArray(Vec<String>),
    I18nString(Vec<String>),
}

fn be_uint(c: &[u8]) -> u64 {
    c.iter().fold(0, |acc, b| (acc << 8) | u64::from(*b))
}

/// Split a NUL-terminated string off the front of `buf`.
fn cstr(buf: &[u8]) -> Option<(String, &[u8])> {
    let end = buf.iter().position(|&b| b == 0)?;
    let s = String::from_utf8_lossy(&buf[..end]).into_owned();
    Some((s, &buf[end + 1..]))
}

impl TagValue {
    fn parse(info: &EntryInfo, data: &[u8]) -> Option<Self> {
        let ty = TagType::from_raw(info.ty)?;
        let offset = usize::try_from(info.offset).ok()?;
        let rest = data.get(offset..)?;
        let count = info.count as usize;
        let fixed = |width: usize| rest.get(..count.checked_mul(width)?);
        let v = match ty {
            TagType::Null => TagValue::Null,
            TagType::Char => TagValue::Char(fixed(1)?.to_vec()),
            TagType::Int8 => TagValue::Int8(fixed(1)?.to_vec()),
            TagType::Bin => TagValue::Bin(fixed(1)?.to_vec()),
            TagType::Int16 => {
                TagValue::Int16(fixed(2)?.chunks_exact(2).map(|c| be_uint(c) as u16).collect())
            }
            TagType::Int32 => {
                TagValue::Int32(fixed(4)?.chunks_exact(4).map(|c| be_uint(c) as u32).collect())
            }
            TagType::Int64 => TagValue::Int64(fixed(8)?.chunks_exact(8).map(be_uint).collect()),
            TagType::String => {
                if count != 1 {
                    return None;
                }
                TagValue::String(cstr(rest)?.0)
            }
            TagType::StringArray | TagType::I18nString => {
                let mut strings = Vec::new();
                let mut rest = rest;
                for _ in 0..count {
                    let (s, next) = cstr(rest)?;
                    strings.push(s);
                    rest = next;
                }
                if ty == TagType::StringArray {
                    TagValue::StringArray(strings)
                } else {
                    TagValue::I18nString(strings)
                }
            }
        };
        Some(v)
    }

    pub fn tag_type(&self) -> TagType {
        match self {
            TagValue::Null => TagType::Null,
            TagValue::Char(_) => TagType::Char,
            TagValue::Int8(_) => TagType::Int8,
            TagValue::Int16(_) => TagType::Int16,
            TagValue::Int32(_) => TagType::Int32,
            TagValue::Int64(_) => TagType::Int64,
            TagValue::String(_) => TagType::String,
            TagValue::Bin(_) => TagType::Bin,
            TagValue::StringArray(_) => TagType::StringArray,
            TagValue::I18nString(_) => TagType::I18nString,
        }
    }

    /// Whether this value may be copied from the signature header into
    /// the metadata header.
    fn mergeable(&self) -> bool {
        match self {
            TagValue::Char(v) | TagValue::Int8(v) => v.len() == 1,
            TagValue::Int16(v) => v.len() == 1,
            TagValue::Int32(v) => v.len() == 1,
            TagValue::Int64(v) => v.len() == 1,
            TagValue::String(s) => s.len() < MERGE_MAX_LEN,
            TagValue::Bin(b) => b.len() < MERGE_MAX_LEN,
            TagValue::Null | TagValue::StringArray(_) | TagValue::I18nString(_) => false,
        }
    }
}

/// A decoded header: a mapping from tag number to value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Header {
    entries: BTreeMap<u32, TagValue>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every entry of a structurally valid blob.
    pub fn load(raw: &RawHeader) -> Result<Self, PackageError> {
        let label = raw.kind.label();
        let data = raw.data();
        let mut entries = BTreeMap::new();
        for (i, info) in raw.entries().iter().enumerate() {
            let value = TagValue::parse(info, data).ok_or_else(|| {
                PackageError::malformed(format!("{} tag[{}]: BAD, {}", label, i, info.describe()))
            })?;
            if entries.insert(info.tag, value).is_some() {
                return Err(PackageError::malformed(format!(
                    "{} tag[{}]: BAD, duplicate tag {}",
                    label, i, info.tag
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_entry(&self, tag: u32) -> bool {
        self.entries.contains_key(&tag)
    }

    pub fn get(&self, tag: u32) -> Option<&TagValue> {
        self.entries.get(&tag)
    }

    /// Iterate over entries in ascending tag order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &TagValue)> {
        self.entries.iter().map(|(t, v)| (*t, v))
    }

    /// Add an entry unless the tag is already present.
    pub fn put(&mut self, tag: u32, value: TagValue) -> bool {
        match self.entries.entry(tag) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(v) => {
                v.insert(value);
                true
            }
        }
    }

    pub fn get_bin(&self, tag: u32) -> Option<&[u8]> {
        match self.get(tag)? {
            TagValue::Bin(b) => Some(b),
            _ => None,
        }
    }

    pub fn get_string(&self, tag: u32) -> Option<&str> {
        match self.get(tag)? {
            TagValue::String(s) => Some(s),
            TagValue::I18nString(v) => v.first().map(|s| s.as_str()),
            _ => None,
        }
    }

    pub fn get_string_array(&self, tag: u32) -> Option<&[String]> {
        match self.get(tag)? {
            TagValue::StringArray(v) | TagValue::I18nString(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_u32_array(&self, tag: u32) -> Option<&[u32]> {
        match self.get(tag)? {
            TagValue::Int32(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_u32(&self, tag: u32) -> Option<u32> {
        self.get_u32_array(tag)?.first().copied()
    }

    /// Copy the signature header entries that have a home in the metadata
    /// header: size and MD5 under their legacy metadata tags, and anything
    /// in the reserved signature range as-is. Existing entries always win.
    pub fn merge_legacy_sigs(&mut self, sigh: &Header) {
        for (tag, value) in sigh.iter() {
            let tag = match tag {
                sigtag::SIZE => rpmtag::SIGSIZE,
                sigtag::MD5 => rpmtag::SIGMD5,
                sigtag::PAYLOADSIZE => rpmtag::ARCHIVESIZE,
                t if (rpmtag::SIGBASE..rpmtag::TAGBASE).contains(&t) => t,
                _ => continue,
            };
            if value.mergeable() && self.put(tag, value.clone()) {
                tracing::trace!("merged signature tag {}", tag);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutils::HeaderBuilder;
    use anyhow::Result;

    fn load(kind: BlobKind, blob: &[u8]) -> Result<(Header, RawHeader)> {
        let raw = read_blob(&mut &blob[..], kind)?;
        let h = Header::load(&raw)?;
        Ok((h, raw))
    }

    #[test]
    fn typed_entries() -> Result<()> {
        let blob = HeaderBuilder::new()
            .region(rpmtag::HEADERIMMUTABLE)
            .string(rpmtag::NAME, "hello")
            .u32s(rpmtag::ARCHIVESIZE, &[4096])
            .string_array(rpmtag::PUBKEYS, &["a", "bc"])
            .bin(rpmtag::SIGMD5, &[1, 2, 3])
            .build();
        let (h, raw) = load(BlobKind::Metadata, &blob)?;
        assert_eq!(raw.as_bytes(), &blob[..]);
        assert_eq!(h.get_string(rpmtag::NAME), Some("hello"));
        assert_eq!(h.get_u32(rpmtag::ARCHIVESIZE), Some(4096));
        assert_eq!(
            h.get_string_array(rpmtag::PUBKEYS),
            Some(&["a".to_string(), "bc".to_string()][..])
        );
        assert_eq!(h.get_bin(rpmtag::SIGMD5), Some(&[1u8, 2, 3][..]));
        // Wrong type lookups are absent, not errors
        assert_eq!(h.get_u32(rpmtag::NAME), None);
        assert!(!h.is_entry(rpmtag::VERSION));
        let region = raw.region().unwrap();
        assert_eq!(region.tag, rpmtag::HEADERIMMUTABLE);
        assert_eq!(region.entries, 5);
        assert!(matches!(raw.immutable(), Cow::Borrowed(_)));
        Ok(())
    }

    #[test]
    fn no_region_digests_everything() -> Result<()> {
        let blob = HeaderBuilder::new().string(rpmtag::NAME, "x").build();
        let (_, raw) = load(BlobKind::Metadata, &blob)?;
        assert_eq!(raw.region(), None);
        assert_eq!(&*raw.immutable(), &blob[..]);
        Ok(())
    }

    #[test]
    fn appended_entries_outside_region() -> Result<()> {
        let signed = HeaderBuilder::new()
            .region(rpmtag::HEADERIMMUTABLE)
            .string(rpmtag::NAME, "hello")
            .build();
        let blob = HeaderBuilder::new()
            .region(rpmtag::HEADERIMMUTABLE)
            .string(rpmtag::NAME, "hello")
            .append_unsigned_string(rpmtag::ARCH, "noarch")
            .build();
        let (h, raw) = load(BlobKind::Metadata, &blob)?;
        assert_eq!(h.get_string(rpmtag::ARCH), Some("noarch"));
        assert_eq!(raw.region().unwrap().entries, 2);
        similar_asserts::assert_eq!(hex::encode(&*raw.immutable()), hex::encode(&signed));
        Ok(())
    }

    #[test]
    fn bad_magic() {
        let mut blob = HeaderBuilder::new().string(rpmtag::NAME, "x").build();
        blob[0] = 0;
        let e = load(BlobKind::Metadata, &blob).unwrap_err();
        assert!(e.to_string().contains("hdr magic: BAD"), "{}", e);
    }

    #[test]
    fn signature_limits() {
        let mut b = HeaderBuilder::new();
        for i in 0..33 {
            b = b.u32s(rpmtag::SIGBASE + i, &[i]);
        }
        let blob = b.build();
        let e = read_blob(&mut &blob[..], BlobKind::Signature).unwrap_err();
        assert!(e.to_string().contains("no. of tags(33) out of range"), "{}", e);
        // The metadata header has no such small limit
        assert!(read_blob(&mut &blob[..], BlobKind::Metadata).is_ok());
    }

    #[test]
    fn truncated() {
        let blob = HeaderBuilder::new().string(rpmtag::NAME, "hello").build();
        for len in [0, 10, blob.len() - 1] {
            let e = read_blob(&mut &blob[..len], BlobKind::Metadata).unwrap_err();
            assert!(matches!(e, PackageError::Malformed(_)), "{}", e);
        }
    }

    #[test]
    fn oversized_intro() {
        let mut blob = HEADER_MAGIC.to_vec();
        blob.extend_from_slice(&0x00ff_ffffu32.to_be_bytes());
        blob.extend_from_slice(&0x3fff_ffffu32.to_be_bytes());
        blob.extend_from_slice(&[0u8; 20]);
        let e = read_blob(&mut &blob[..], BlobKind::Metadata).unwrap_err();
        assert_eq!(e.to_string(), "hdr blob(1342177263): BAD, read returned 20");
    }

    #[test]
    fn entry_out_of_bounds() {
        let mut blob = HeaderBuilder::new().string(rpmtag::NAME, "hello").build();
        // offset of the first entry
        blob[INTRO_SIZE + 8..INTRO_SIZE + 12].copy_from_slice(&1000i32.to_be_bytes());
        let e = read_blob(&mut &blob[..], BlobKind::Metadata).unwrap_err();
        assert!(e.to_string().contains("tag[0]: BAD"), "{}", e);
    }

    #[test]
    fn unterminated_string() -> Result<()> {
        let mut blob = HeaderBuilder::new().string(rpmtag::NAME, "hello").build();
        let last = blob.len() - 1;
        blob[last] = b'!';
        let raw = read_blob(&mut &blob[..], BlobKind::Metadata)?;
        assert!(Header::load(&raw).is_err());
        Ok(())
    }

    #[test]
    fn bad_region_trailer() {
        let mut blob = HeaderBuilder::new()
            .region(rpmtag::HEADERIMMUTABLE)
            .string(rpmtag::NAME, "hello")
            .build();
        // The trailer is the last 16 bytes of data; corrupt its tag.
        let pos = blob.len() - ENTRY_SIZE;
        blob[pos..pos + 4].copy_from_slice(&1000u32.to_be_bytes());
        let e = read_blob(&mut &blob[..], BlobKind::Metadata).unwrap_err();
        assert!(e.to_string().contains("region trailer: BAD"), "{}", e);
    }

    #[test]
    fn merge() -> Result<()> {
        let sigh_blob = HeaderBuilder::new()
            .region(rpmtag::HEADERSIGNATURES)
            .u32s(sigtag::SIZE, &[1234])
            .bin(sigtag::MD5, &[0xaa; 16])
            .u32s(sigtag::PAYLOADSIZE, &[99])
            .string(sigtag::SHA1, "abcd")
            .string_array(sigtag::PUBKEYS, &["key"])
            .u32s(rpmtag::SIGBASE + 20, &[1, 2])
            .build();
        let (sigh, _) = load(BlobKind::Signature, &sigh_blob)?;
        let mut h = Header::new();
        h.put(rpmtag::SHA1HEADER, TagValue::String("existing".into()));
        h.merge_legacy_sigs(&sigh);
        assert_eq!(h.get_u32(rpmtag::SIGSIZE), Some(1234));
        assert_eq!(h.get_bin(rpmtag::SIGMD5), Some(&[0xaa; 16][..]));
        assert_eq!(h.get_u32(rpmtag::ARCHIVESIZE), Some(99));
        assert_eq!(h.get_string(rpmtag::SHA1HEADER), Some("existing"));
        assert!(!h.is_entry(rpmtag::PUBKEYS));
        assert!(!h.is_entry(rpmtag::SIGBASE + 20));
        assert!(!h.is_entry(rpmtag::HEADERSIGNATURES));
        Ok(())
    }
}
