//! `OverflowPage` — opaque payload for a record too large to inline
//! (spec §4.4 "Overflow"). Grounded on `storage/page.rs::Page` (id + raw
//! byte vec + dirty flag), generalized to an immutable payload: once a
//! record is promoted to overflow, in-place mutation goes through a new
//! revision (a new `OverflowPage` behind a fresh `PageReference`), never
//! through this page.

use crate::common::{NodeKey, PageKey};

/// Holds the serialized bytes of one record that exceeded the inline
/// record-size ceiling of its owning leaf page.
#[derive(Debug, Clone)]
pub struct OverflowPage {
    page_key: PageKey,
    node_key: NodeKey,
    revision: u32,
    payload: Vec<u8>,
}

impl OverflowPage {
    pub fn new(page_key: PageKey, node_key: NodeKey, revision: u32, payload: Vec<u8>) -> Self {
        Self {
            page_key,
            node_key,
            revision,
            payload,
        }
    }

    pub fn page_key(&self) -> PageKey {
        self.page_key
    }

    pub fn node_key(&self) -> NodeKey {
        self.node_key
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 4 + 4 + self.payload.len());
        out.extend_from_slice(&self.node_key.value().to_le_bytes());
        out.extend_from_slice(&self.revision.to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(buf: &[u8], page_key: PageKey) -> crate::error::Result<Self> {
        if buf.len() < 16 {
            return Err(crate::error::PageError::CorruptPage {
                reason: "overflow page header truncated".to_string(),
            });
        }
        let node_key = NodeKey::new(u64::from_le_bytes(buf[0..8].try_into().unwrap()));
        let revision = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let len = u32::from_le_bytes(buf[12..16].try_into().unwrap()) as usize;
        let payload = buf.get(16..16 + len).ok_or_else(|| crate::error::PageError::CorruptPage {
            reason: "overflow payload shorter than declared length".to_string(),
        })?;
        Ok(Self {
            page_key,
            node_key,
            revision,
            payload: payload.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let page = OverflowPage::new(PageKey::new(4), NodeKey::new(99), 2, b"big record bytes".to_vec());
        let bytes = page.encode();
        let decoded = OverflowPage::decode(&bytes, PageKey::new(4)).unwrap();
        assert_eq!(decoded.node_key(), NodeKey::new(99));
        assert_eq!(decoded.revision(), 2);
        assert_eq!(decoded.payload(), b"big record bytes");
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let page = OverflowPage::new(PageKey::new(4), NodeKey::new(1), 0, vec![1, 2, 3]);
        let mut bytes = page.encode();
        bytes.truncate(bytes.len() - 1);
        assert!(OverflowPage::decode(&bytes, PageKey::new(4)).is_err());
    }
}
