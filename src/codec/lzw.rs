//! TIFF LZW decoding: MSB-first codes of 9 to 12 bits with early change

use crate::error::{CodecError, CodecErrorKind};

const CLEAR_CODE: u16 = 256;
const EOI_CODE: u16 = 257;
const MIN_BITS: u32 = 9;
const MAX_BITS: u32 = 12;
const TABLE_SIZE: usize = 1 << MAX_BITS;

#[derive(Debug, Clone, Copy)]
struct Entry {
    prefix: u16,
    suffix: u8,
    first: u8,
    len: u16,
}

struct CodeTable {
    entries: Vec<Entry>,
}

impl CodeTable {
    fn new() -> Self {
        let mut table = CodeTable {
            entries: Vec::with_capacity(TABLE_SIZE),
        };
        table.reset();
        table
    }

    fn reset(&mut self) {
        self.entries.clear();
        for byte in 0..=255u8 {
            self.entries.push(Entry {
                prefix: 0,
                suffix: byte,
                first: byte,
                len: 1,
            });
        }
        // Clear and EOI occupy 256 and 257 but never expand to data
        let marker = Entry {
            prefix: 0,
            suffix: 0,
            first: 0,
            len: 0,
        };
        self.entries.push(marker);
        self.entries.push(marker);
    }

    fn next_code(&self) -> usize {
        self.entries.len()
    }

    fn add(&mut self, prefix: u16, suffix: u8) {
        if self.entries.len() >= TABLE_SIZE {
            return;
        }
        let base = self.entries[prefix as usize];
        self.entries.push(Entry {
            prefix,
            suffix,
            first: base.first,
            len: base.len + 1,
        });
    }

    fn write(&self, code: u16, out: &mut Vec<u8>) {
        let len = self.entries[code as usize].len as usize;
        let start = out.len();
        out.resize(start + len, 0);
        let mut current = code;
        for slot in out[start..].iter_mut().rev() {
            let entry = self.entries[current as usize];
            *slot = entry.suffix;
            current = entry.prefix;
        }
    }
}

struct CodeReader<'a> {
    data: &'a [u8],
    index: usize,
    buffer: u32,
    bits: u32,
}

impl<'a> CodeReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        CodeReader {
            data,
            index: 0,
            buffer: 0,
            bits: 0,
        }
    }

    fn read(&mut self, width: u32) -> Option<u16> {
        while self.bits < width {
            let byte = *self.data.get(self.index)?;
            self.index += 1;
            self.buffer = (self.buffer << 8) | byte as u32;
            self.bits += 8;
        }
        self.bits -= width;
        Some(((self.buffer >> self.bits) & ((1 << width) - 1)) as u16)
    }

    fn bit_position(&self) -> usize {
        self.index * 8 - self.bits as usize
    }
}

/// Decode up to `expected_len` bytes.
///
/// Decoding stops at EOI, at the end of the input, or once the buffer is
/// full; a short result is left for the caller's size check.
pub fn decode(input: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
    let mut table = CodeTable::new();
    let mut reader = CodeReader::new(input);
    let mut width = MIN_BITS;
    let mut previous: Option<u16> = None;
    let mut out = Vec::with_capacity(expected_len.min(input.len().saturating_mul(4)));

    while out.len() < expected_len {
        let at = reader.bit_position();
        let Some(code) = reader.read(width) else {
            break;
        };
        if code == EOI_CODE {
            break;
        }
        if code == CLEAR_CODE {
            table.reset();
            width = MIN_BITS;
            previous = None;
            continue;
        }

        let next = table.next_code();
        match previous {
            None => {
                if code > 255 {
                    return Err(invalid(code, next, at));
                }
                table.write(code, &mut out);
            }
            Some(prev) => {
                let code_index = code as usize;
                if code_index < next {
                    table.write(code, &mut out);
                    let first = table.entries[code_index].first;
                    table.add(prev, first);
                } else if code_index == next {
                    let first = table.entries[prev as usize].first;
                    table.add(prev, first);
                    table.write(code, &mut out);
                } else {
                    return Err(invalid(code, next, at));
                }
            }
        }
        previous = Some(code);

        if table.next_code() + 1 >= 1 << width && width < MAX_BITS {
            width += 1;
        }
    }

    out.truncate(expected_len);
    Ok(out)
}

fn invalid(code: u16, next: usize, bit: usize) -> CodecError {
    CodecError::new(
        CodecErrorKind::InvalidLzwCode,
        format!(
            "code {} at bit {} but the next free code is {}",
            code, bit, next
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encoder following libtiff's code-width switch, for round-trip tests only
    fn encode(data: &[u8]) -> Vec<u8> {
        use std::collections::HashMap;

        let mut codes: Vec<(u16, u32)> = vec![(CLEAR_CODE, MIN_BITS)];
        let mut dict: HashMap<Vec<u8>, u16> = HashMap::new();
        let mut next = 258u16;
        let mut width = MIN_BITS;
        let mut current: Vec<u8> = Vec::new();
        let lookup = |dict: &HashMap<Vec<u8>, u16>, s: &[u8]| -> u16 {
            if s.len() == 1 {
                s[0] as u16
            } else {
                dict[s]
            }
        };
        for &byte in data {
            let mut candidate = current.clone();
            candidate.push(byte);
            if candidate.len() == 1 || dict.contains_key(&candidate) {
                current = candidate;
                continue;
            }
            codes.push((lookup(&dict, &current), width));
            dict.insert(candidate, next);
            next += 1;
            if next as u32 >= 1 << width && width < MAX_BITS {
                width += 1;
            }
            if next >= 4094 {
                codes.push((CLEAR_CODE, width));
                dict.clear();
                next = 258;
                width = MIN_BITS;
            }
            current = vec![byte];
        }
        if !current.is_empty() {
            codes.push((lookup(&dict, &current), width));
        }
        codes.push((EOI_CODE, width));

        let mut out = Vec::new();
        let mut acc = 0u64;
        let mut bits = 0u32;
        for (code, w) in codes {
            acc = (acc << w) | code as u64;
            bits += w;
            while bits >= 8 {
                bits -= 8;
                out.push((acc >> bits) as u8);
            }
        }
        if bits > 0 {
            out.push((acc << (8 - bits)) as u8);
        }
        out
    }

    #[test]
    fn test_golden_sequence() {
        // Clear 7 258 8 8 258 6 6 EOI, all 9-bit codes
        let encoded = [
            0x80, 0x01, 0xE0, 0x40, 0x80, 0x44, 0x08, 0x0C, 0x06, 0x80, 0x80,
        ];
        let decoded = decode(&encoded, 9).unwrap();
        assert_eq!(decoded, vec![7, 7, 7, 8, 8, 7, 7, 6, 6]);
    }

    #[test]
    fn test_round_trip_through_all_code_widths() {
        // Enough distinct strings to push the table past 511, 1023 and 2047 entries and clear it
        let mut state = 12345u32;
        let data: Vec<u8> = (0..40_000)
            .map(|_| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                ((state >> 16) % 23) as u8
            })
            .collect();
        let encoded = encode(&data);
        assert_eq!(decode(&encoded, data.len()).unwrap(), data);
    }

    #[test]
    fn test_output_truncated_to_expected() {
        let encoded = encode(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(decode(&encoded, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_undefined_code_rejected() {
        // Clear, 65, then code 300 while the next free code is 258
        let codes = [(256u16, 9u32), (65, 9), (300, 9)];
        let mut acc = 0u64;
        let mut bits = 0;
        for (code, w) in codes {
            acc = (acc << w) | code as u64;
            bits += w;
        }
        acc <<= 32 - bits;
        let bytes = (acc as u32).to_be_bytes();
        let err = decode(&bytes, 10).unwrap_err();
        assert_eq!(err.kind, CodecErrorKind::InvalidLzwCode);
    }

    #[test]
    fn test_stream_without_clear_code() {
        // Some writers omit the leading Clear; 9-bit codes 65 66 EOI
        let codes = [65u16, 66, 257];
        let mut acc = 0u64;
        for code in codes {
            acc = (acc << 9) | code as u64;
        }
        acc <<= 32 - 27;
        let bytes = (acc as u32).to_be_bytes();
        assert_eq!(decode(&bytes, 2).unwrap(), b"AB".to_vec());
    }
}
