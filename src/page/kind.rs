//! `PageKind` — the page envelope and dispatcher (spec §4.6/§6): every
//! page variant wrapped in `{tag: u8, binaryEncodingVersion: u8, body,
//! crc32: u32}`.
//!
//! Grounded on `index::mod::Index`'s tag-dispatched enum-of-variants
//! (one `IndexType` byte mirrored by one enum arm per concrete index
//! type) generalized to the page envelope's {tag, version, body} framing.
//! The trailing CRC is not a wire field the distilled spec names; it
//! follows `buffer::page_cache::PageBuffer::checksum`'s practice of
//! guarding a decoded buffer before the bit-packed codecs run over it,
//! carried here as the outermost four bytes so a corrupt buffer is
//! rejected before any tag-specific decoder even runs.

use crate::collaborators::DecompressionResult;
use crate::common::PageKey;
use crate::config::PageStoreConfig;
use crate::error::{PageError, Result};
use crate::page::bitmap_chunk::BitmapChunkPage;
use crate::page::hot::{HotIndirectNode, HotLeafPage};
use crate::page::kv_leaf::KeyValueLeafPage;
use crate::page::meta::{CasPage, DeweyIdPage, NamePage, NodeIndirectPage, PathPage, PathSummaryPage, RevisionRootPage, UberPage};
use crate::page::overflow::OverflowPage;

/// Current binary encoding version this crate's encoders emit (mirrors
/// [`crate::config::CURRENT_BINARY_ENCODING_VERSION`]; duplicated here as
/// the literal the dispatcher checks against, since the config default
/// and "what this decoder understands" are conceptually different knobs
/// even though they share a value today).
pub const CURRENT_VERSION: u8 = crate::config::CURRENT_BINARY_ENCODING_VERSION;

/// One-byte page-kind tags (spec §6 table). Tag 7 is reserved: the spec's
/// table has a gap between Path-summary (6) and CAS (8) and names nothing
/// for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageKindTag {
    UnifiedLeaf = 1,
    Name = 2,
    Uber = 3,
    Indirect = 4,
    RevisionRoot = 5,
    PathSummary = 6,
    Cas = 8,
    Overflow = 9,
    Path = 10,
    DeweyId = 11,
    HotLeaf = 12,
    HotIndirect = 13,
    BitmapChunk = 14,
}

impl PageKindTag {
    pub fn from_byte(byte: u8) -> Result<Self> {
        Ok(match byte {
            1 => PageKindTag::UnifiedLeaf,
            2 => PageKindTag::Name,
            3 => PageKindTag::Uber,
            4 => PageKindTag::Indirect,
            5 => PageKindTag::RevisionRoot,
            6 => PageKindTag::PathSummary,
            8 => PageKindTag::Cas,
            9 => PageKindTag::Overflow,
            10 => PageKindTag::Path,
            11 => PageKindTag::DeweyId,
            12 => PageKindTag::HotLeaf,
            13 => PageKindTag::HotIndirect,
            14 => PageKindTag::BitmapChunk,
            other => {
                return Err(PageError::CorruptPage {
                    reason: format!("unknown page kind tag {}", other),
                })
            }
        })
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Every page variant this crate can encode/decode, tagged by the variant
/// it wraps. `Indirect` is fixed to [`NodeIndirectPage`] (the one level of
/// `IndirectPage` indirection the document tree needs above unified leaf
/// pages); the HOT indirect variant carries its identity alongside the
/// node since [`HotIndirectNode`] itself has no page-key field.
pub enum PageKind {
    UnifiedLeaf(KeyValueLeafPage),
    Name(NamePage),
    Uber(UberPage),
    Indirect(NodeIndirectPage),
    RevisionRoot(RevisionRootPage),
    PathSummary(PathSummaryPage),
    Cas(CasPage),
    Overflow(OverflowPage),
    Path(PathPage),
    DeweyId(DeweyIdPage),
    HotLeaf(HotLeafPage),
    HotIndirect { page_key: PageKey, revision: u32, node: HotIndirectNode },
    BitmapChunk(BitmapChunkPage),
}

impl PageKind {
    pub fn tag(&self) -> PageKindTag {
        match self {
            PageKind::UnifiedLeaf(_) => PageKindTag::UnifiedLeaf,
            PageKind::Name(_) => PageKindTag::Name,
            PageKind::Uber(_) => PageKindTag::Uber,
            PageKind::Indirect(_) => PageKindTag::Indirect,
            PageKind::RevisionRoot(_) => PageKindTag::RevisionRoot,
            PageKind::PathSummary(_) => PageKindTag::PathSummary,
            PageKind::Cas(_) => PageKindTag::Cas,
            PageKind::Overflow(_) => PageKindTag::Overflow,
            PageKind::Path(_) => PageKindTag::Path,
            PageKind::DeweyId(_) => PageKindTag::DeweyId,
            PageKind::HotLeaf(_) => PageKindTag::HotLeaf,
            PageKind::HotIndirect { .. } => PageKindTag::HotIndirect,
            PageKind::BitmapChunk(_) => PageKindTag::BitmapChunk,
        }
    }

    fn body_bytes(&self) -> Vec<u8> {
        match self {
            PageKind::UnifiedLeaf(p) => p.encode(&PageStoreConfig::default()),
            PageKind::Name(p) => p.encode(),
            PageKind::Uber(p) => p.encode(),
            PageKind::Indirect(p) => p.encode(),
            PageKind::RevisionRoot(p) => p.encode(),
            PageKind::PathSummary(p) => p.encode(),
            PageKind::Cas(p) => p.encode(),
            PageKind::Overflow(p) => p.encode(),
            PageKind::Path(p) => p.encode(),
            PageKind::DeweyId(p) => p.encode(),
            PageKind::HotLeaf(p) => p.encode(),
            PageKind::HotIndirect { page_key, revision, node } => {
                let mut out = Vec::new();
                crate::page::varint::write_varint(&mut out, page_key.value());
                out.extend_from_slice(&revision.to_le_bytes());
                out.extend_from_slice(&node.encode());
                out
            }
            PageKind::BitmapChunk(p) => p.encode(),
        }
    }

    /// Encodes the tagged, versioned envelope with a trailing CRC-32 over
    /// `{tag, version, body}` (spec §4.6 addition; see module docs).
    ///
    /// `config` applies only to the `UnifiedLeaf` variant's body codec;
    /// every other variant has a fixed body format and ignores it. Pass
    /// the store's real config when encoding a `UnifiedLeaf` page.
    pub fn encode(&self, config: &PageStoreConfig) -> Vec<u8> {
        let body = match self {
            PageKind::UnifiedLeaf(p) => p.encode(config),
            _ => self.body_bytes(),
        };
        let mut out = Vec::with_capacity(2 + body.len() + 4);
        out.push(self.tag().to_byte());
        out.push(CURRENT_VERSION);
        out.extend_from_slice(&body);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&out);
        out.extend_from_slice(&hasher.finalize().to_le_bytes());
        out
    }

    /// Everything a decoder might need to reconstruct any page variant.
    /// Most fields are only consulted by the variant they apply to.
    pub fn decode(buf: &[u8], ctx: &DecodeContext) -> Result<Self> {
        if buf.len() < 2 + 4 {
            return Err(PageError::CorruptPage {
                reason: "page envelope shorter than tag+version+crc".to_string(),
            });
        }
        let (envelope, crc_bytes) = buf.split_at(buf.len() - 4);
        let expected_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap());
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(envelope);
        if hasher.finalize() != expected_crc {
            return Err(PageError::CorruptPage {
                reason: "page checksum mismatch".to_string(),
            });
        }

        let tag = PageKindTag::from_byte(envelope[0])?;
        let version = envelope[1];
        if version != CURRENT_VERSION {
            return Err(PageError::VersionUnsupported {
                tag: envelope[0],
                version,
            });
        }
        let body = &envelope[2..];

        Ok(match tag {
            PageKindTag::UnifiedLeaf => {
                PageKind::UnifiedLeaf(KeyValueLeafPage::decode(body, ctx.page_key, ctx.config, ctx.heap_capacity)?)
            }
            PageKindTag::Name => PageKind::Name(NamePage::decode(body, ctx.page_key)?),
            PageKindTag::Uber => PageKind::Uber(UberPage::decode(body, ctx.page_key, ctx.database_tag, ctx.resource_tag)?),
            PageKindTag::Indirect => {
                PageKind::Indirect(NodeIndirectPage::decode(body, ctx.page_key, ctx.database_tag, ctx.resource_tag)?)
            }
            PageKindTag::RevisionRoot => {
                PageKind::RevisionRoot(RevisionRootPage::decode(body, ctx.page_key, ctx.database_tag, ctx.resource_tag)?)
            }
            PageKindTag::PathSummary => PageKind::PathSummary(PathSummaryPage::decode(body, ctx.page_key)?),
            PageKindTag::Cas => PageKind::Cas(CasPage::decode(body, ctx.page_key)?),
            PageKindTag::Overflow => PageKind::Overflow(OverflowPage::decode(body, ctx.page_key)?),
            PageKindTag::Path => PageKind::Path(PathPage::decode(body, ctx.page_key)?),
            PageKindTag::DeweyId => PageKind::DeweyId(DeweyIdPage::decode(body, ctx.page_key)?),
            PageKindTag::HotLeaf => {
                PageKind::HotLeaf(HotLeafPage::decode(body, ctx.page_key, ctx.heap_capacity, ctx.hot_max_entries)?)
            }
            PageKindTag::HotIndirect => {
                let mut cursor = 0usize;
                let (decoded_key, n) = crate::page::varint::read_varint(body, cursor)?;
                cursor += n;
                if decoded_key != ctx.page_key.value() {
                    return Err(PageError::CorruptPage {
                        reason: format!("decoded hot indirect page key {} does not match expected {}", decoded_key, ctx.page_key),
                    });
                }
                let revision = crate::page::varint::read_u32(body, &mut cursor)?;
                let node = HotIndirectNode::decode(&body[cursor..])?;
                PageKind::HotIndirect {
                    page_key: ctx.page_key,
                    revision,
                    node,
                }
            }
            PageKindTag::BitmapChunk => PageKind::BitmapChunk(BitmapChunkPage::decode(body, ctx.page_key)?),
        })
    }

    /// Decodes an envelope the same way [`Self::decode`] does, but when it
    /// carries a `UnifiedLeaf` body, adopts the decompression buffer as
    /// the page's heap via [`KeyValueLeafPage::decode_zero_copy`] instead
    /// of copying it, and stores the buffer's releaser (if any) on the
    /// page to fire on its first `close()` (spec §4.6, §9
    /// "Memory-segment pooling ... OwnedByDecompressionBuffer").
    ///
    /// Every other variant has no zero-copy-eligible region and decodes
    /// exactly as [`Self::decode`] would.
    pub fn decode_from_decompression(mut result: DecompressionResult, ctx: &DecodeContext) -> Result<Self> {
        let buf = result.bytes.clone();
        if buf.len() < 2 + 4 {
            return Err(PageError::CorruptPage {
                reason: "page envelope shorter than tag+version+crc".to_string(),
            });
        }
        let tag_byte = buf[0];
        if PageKindTag::from_byte(tag_byte)? != PageKindTag::UnifiedLeaf {
            return Self::decode(buf.as_ref(), ctx);
        }

        let envelope_len = buf.len() - 4;
        let expected_crc = u32::from_le_bytes(buf[envelope_len..].try_into().unwrap());
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf[..envelope_len]);
        if hasher.finalize() != expected_crc {
            return Err(PageError::CorruptPage {
                reason: "page checksum mismatch".to_string(),
            });
        }
        let version = buf[1];
        if version != CURRENT_VERSION {
            return Err(PageError::VersionUnsupported { tag: tag_byte, version });
        }

        let body = buf.slice(2..envelope_len);
        let releaser = result.transfer_ownership();
        Ok(PageKind::UnifiedLeaf(KeyValueLeafPage::decode_zero_copy(
            &body,
            ctx.page_key,
            ctx.config,
            ctx.heap_capacity,
            releaser,
        )?))
    }
}

/// Parameters a decoder needs across every page variant; only the fields
/// relevant to the decoded tag are actually read.
pub struct DecodeContext<'a> {
    pub page_key: PageKey,
    pub config: &'a PageStoreConfig,
    pub heap_capacity: usize,
    pub hot_max_entries: usize,
    pub database_tag: u64,
    pub resource_tag: u64,
}
