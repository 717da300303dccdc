//! Page-local FSST-style string compression (spec §4.4 "FSST string
//! compression"). Grounded on `index::btree_optimized`'s
//! `PrefixAnalyzer`/`PrefixCompressedString` (build a small dictionary from
//! sample keys, substitute, measure savings before committing to it), here
//! generalized from a single shared prefix to a trained substring symbol
//! table with a one-byte escape, matching the spec's trial-then-adopt
//! shape.

use crate::error::{PageError, Result};

const ESCAPE: u8 = 0xFF;
const MAX_SYMBOLS: usize = 254;
const MAX_SYMBOL_LEN: usize = 8;
const MIN_SYMBOL_LEN: usize = 2;

/// A trained symbol table: each entry is a byte string of 2-8 bytes,
/// addressed by its index (0..=253) in the encoded stream. Code `0xFF` is
/// the escape: the following raw byte is a literal, not a symbol index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsstTable {
    symbols: Vec<Vec<u8>>,
}

impl FsstTable {
    /// Train a table from sample strings. Returns `None` if there are
    /// fewer than `min_samples` samples (spec: a trial table is not even
    /// built below that threshold).
    pub fn train(samples: &[&[u8]], min_samples: usize) -> Option<Self> {
        if samples.len() < min_samples {
            return None;
        }

        let mut counts: std::collections::HashMap<Vec<u8>, usize> = std::collections::HashMap::new();
        for sample in samples {
            for len in MIN_SYMBOL_LEN..=MAX_SYMBOL_LEN.min(sample.len()) {
                for window in sample.windows(len) {
                    *counts.entry(window.to_vec()).or_insert(0) += 1;
                }
            }
        }

        let mut scored: Vec<(Vec<u8>, usize)> = counts
            .into_iter()
            .filter(|(_, freq)| *freq >= 2)
            .collect();
        scored.sort_by(|a, b| {
            let score_a = a.1 * (a.0.len() - 1);
            let score_b = b.1 * (b.0.len() - 1);
            score_b.cmp(&score_a).then_with(|| b.0.len().cmp(&a.0.len()))
        });
        scored.truncate(MAX_SYMBOLS);

        if scored.is_empty() {
            return None;
        }

        let mut symbols: Vec<Vec<u8>> = scored.into_iter().map(|(s, _)| s).collect();
        // Longest-first so greedy matching during compress prefers the
        // longest applicable substitution.
        symbols.sort_by(|a, b| b.len().cmp(&a.len()));
        Some(Self { symbols })
    }

    fn find_match(&self, input: &[u8]) -> Option<u8> {
        self.symbols
            .iter()
            .position(|sym| input.starts_with(sym.as_slice()))
            .map(|idx| idx as u8)
    }

    pub fn compress(&self, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(input.len());
        let mut cursor = 0;
        while cursor < input.len() {
            if let Some(code) = self.find_match(&input[cursor..]) {
                out.push(code);
                cursor += self.symbols[code as usize].len();
            } else {
                out.push(ESCAPE);
                out.push(input[cursor]);
                cursor += 1;
            }
        }
        out
    }

    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len());
        let mut cursor = 0;
        while cursor < input.len() {
            let code = input[cursor];
            if code == ESCAPE {
                let literal = *input.get(cursor + 1).ok_or_else(|| PageError::CorruptPage {
                    reason: "fsst stream truncated after escape byte".to_string(),
                })?;
                out.push(literal);
                cursor += 2;
            } else {
                let symbol = self.symbols.get(code as usize).ok_or_else(|| PageError::CorruptPage {
                    reason: format!("fsst stream references unknown symbol {}", code),
                })?;
                out.extend_from_slice(symbol);
                cursor += 1;
            }
        }
        Ok(out)
    }

    /// Fraction of bytes saved compressing `samples`, used to decide
    /// adoption (spec: adopt only when savings >= 15%).
    pub fn savings_ratio(&self, samples: &[&[u8]]) -> f32 {
        let original: usize = samples.iter().map(|s| s.len()).sum();
        if original == 0 {
            return 0.0;
        }
        let compressed: usize = samples.iter().map(|s| self.compress(s).len()).sum();
        1.0 - (compressed as f32 / original as f32)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.symbols.len() as u8);
        for symbol in &self.symbols {
            out.push(symbol.len() as u8);
            out.extend_from_slice(symbol);
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let count = *buf.first().ok_or_else(|| PageError::CorruptPage {
            reason: "fsst table buffer empty".to_string(),
        })? as usize;
        let mut cursor = 1;
        let mut symbols = Vec::with_capacity(count);
        for _ in 0..count {
            let len = *buf.get(cursor).ok_or_else(|| PageError::CorruptPage {
                reason: "fsst table truncated before symbol length".to_string(),
            })? as usize;
            cursor += 1;
            let symbol = buf.get(cursor..cursor + len).ok_or_else(|| PageError::CorruptPage {
                reason: "fsst table truncated mid-symbol".to_string(),
            })?;
            symbols.push(symbol.to_vec());
            cursor += len;
        }
        Ok((Self { symbols }, cursor))
    }
}

/// Trial-compress `samples` and adopt the trained table only if it clears
/// `adoption_threshold` fractional savings (spec default 0.15).
pub fn trial_adopt(samples: &[&[u8]], min_samples: usize, adoption_threshold: f32) -> Option<FsstTable> {
    let table = FsstTable::train(samples, min_samples)?;
    if table.savings_ratio(samples) >= adoption_threshold {
        Some(table)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repeated_samples() -> Vec<Vec<u8>> {
        (0..40)
            .map(|i| format!("https://example.com/resource/{}", i).into_bytes())
            .collect()
    }

    #[test]
    fn trains_and_round_trips() {
        let owned = repeated_samples();
        let samples: Vec<&[u8]> = owned.iter().map(|s| s.as_slice()).collect();
        let table = FsstTable::train(&samples, 16).expect("enough samples to train");
        for sample in &samples {
            let compressed = table.compress(sample);
            let decompressed = table.decompress(&compressed).unwrap();
            assert_eq!(&decompressed, sample);
        }
    }

    #[test]
    fn below_min_samples_does_not_train() {
        let owned = repeated_samples();
        let samples: Vec<&[u8]> = owned.iter().take(3).map(|s| s.as_slice()).collect();
        assert!(FsstTable::train(&samples, 16).is_none());
    }

    #[test]
    fn trial_adopt_rejects_low_savings_corpus() {
        let owned: Vec<Vec<u8>> = (0..20u8).map(|b| vec![b, b.wrapping_add(1), b.wrapping_add(2)]).collect();
        let samples: Vec<&[u8]> = owned.iter().map(|s| s.as_slice()).collect();
        assert!(trial_adopt(&samples, 16, 0.15).is_none());
    }

    #[test]
    fn trial_adopt_accepts_highly_repetitive_corpus() {
        let owned = repeated_samples();
        let samples: Vec<&[u8]> = owned.iter().map(|s| s.as_slice()).collect();
        assert!(trial_adopt(&samples, 16, 0.15).is_some());
    }

    #[test]
    fn encode_decode_round_trips_table() {
        let owned = repeated_samples();
        let samples: Vec<&[u8]> = owned.iter().map(|s| s.as_slice()).collect();
        let table = FsstTable::train(&samples, 16).unwrap();
        let bytes = table.encode();
        let (decoded, consumed) = FsstTable::decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, table);
    }

    #[test]
    fn decompress_rejects_truncated_escape() {
        let table = FsstTable { symbols: vec![b"ab".to_vec()] };
        assert!(table.decompress(&[ESCAPE]).is_err());
    }
}
