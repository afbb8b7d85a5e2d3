//! CCITT bilevel decoding: Modified Huffman, T.4 (Group 3) and T.6 (Group 4).
//!
//! Rows are tracked as lists of changing elements, the pixel positions where
//! the color flips. Even entries turn white into black, odd entries turn black
//! back into white. The decoded buffer holds one bit per pixel, MSB first,
//! with a 1 bit for every pixel covered by a black run.

use std::sync::OnceLock;

use crate::codec::fax_tables::{BLACK_CODES, WHITE_CODES};
use crate::error::{CodecError, CodecErrorKind};

const LOOKUP_BITS: u32 = 13;
const EOL_BITS: u32 = 12;
const EOL_CODE: u32 = 0b0000_0000_0001;

/// Which CCITT coding scheme a strip uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaxVariant {
    /// TIFF compression 2: 1-D rows, each starting on a byte boundary, no EOL codes
    ModifiedHuffman,
    /// TIFF compression 3: EOL before each row; mixed 1-D/2-D when `two_dimensional`
    Group3 { two_dimensional: bool },
    /// TIFF compression 4: every row 2-D against the previous one
    Group4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Pass,
    Horizontal,
    Vertical(i8),
    Extension,
    EndOfLine,
}

const MODE_CODES: [(u32, u32, Mode); 11] = [
    (1, 0b1, Mode::Vertical(0)),
    (3, 0b011, Mode::Vertical(1)),
    (3, 0b010, Mode::Vertical(-1)),
    (3, 0b001, Mode::Horizontal),
    (4, 0b0001, Mode::Pass),
    (6, 0b000011, Mode::Vertical(2)),
    (6, 0b000010, Mode::Vertical(-2)),
    (7, 0b0000011, Mode::Vertical(3)),
    (7, 0b0000010, Mode::Vertical(-3)),
    (7, 0b0000001, Mode::Extension),
    (EOL_BITS, EOL_CODE, Mode::EndOfLine),
];

#[derive(Debug, Clone, Copy)]
struct RunCode {
    len: u8,
    run: u16,
}

struct RunLookup {
    white: Vec<Option<RunCode>>,
    black: Vec<Option<RunCode>>,
}

/// Direct-indexed tables keyed by the next 13 bits of input
fn run_lookup() -> &'static RunLookup {
    static LOOKUP: OnceLock<RunLookup> = OnceLock::new();
    LOOKUP.get_or_init(|| {
        let build = |codes: &[(u8, u16, u16)]| {
            let mut table = vec![None; 1 << LOOKUP_BITS];
            for &(len, code, run) in codes {
                let shift = LOOKUP_BITS - len as u32;
                let start = (code as usize) << shift;
                for slot in &mut table[start..start + (1 << shift)] {
                    *slot = Some(RunCode { len, run });
                }
            }
            table
        };
        RunLookup {
            white: build(WHITE_CODES),
            black: build(BLACK_CODES),
        }
    })
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        BitReader { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.pos)
    }

    /// Next `n` (at most 24) bits, zero-padded past the end of the input
    fn peek(&self, n: u32) -> u32 {
        let byte = self.pos / 8;
        let mut window = 0u64;
        for i in 0..4 {
            window = (window << 8) | self.data.get(byte + i).copied().unwrap_or(0) as u64;
        }
        let skip = (self.pos % 8) as u32;
        ((window >> (32 - skip - n)) & ((1u64 << n) - 1)) as u32
    }

    fn consume(&mut self, n: u32) {
        self.pos += n as usize;
    }

    fn read_bit(&mut self) -> Option<u32> {
        if self.remaining() == 0 {
            return None;
        }
        let bit = self.peek(1);
        self.consume(1);
        Some(bit)
    }

    fn align_to_byte(&mut self) {
        self.pos = self.pos.div_ceil(8) * 8;
    }

    /// Skip fill bits and an EOL code if one starts here
    fn skip_eol(&mut self) -> bool {
        let remaining = self.remaining();
        let mut zeros = 0;
        while zeros < remaining && self.bit_at(self.pos + zeros) == 0 {
            zeros += 1;
        }
        if zeros >= EOL_BITS as usize - 1 && zeros < remaining {
            self.pos += zeros + 1;
            true
        } else {
            false
        }
    }

    fn bit_at(&self, pos: usize) -> u8 {
        (self.data[pos / 8] >> (7 - pos % 8)) & 1
    }
}

fn end_of_data(reader: &BitReader) -> CodecError {
    CodecError::new(
        CodecErrorKind::UnexpectedEndOfData,
        format!("input exhausted at bit {}", reader.pos),
    )
}

fn read_mode(reader: &mut BitReader) -> Result<Mode, CodecError> {
    let remaining = reader.remaining();
    if remaining == 0 {
        return Err(end_of_data(reader));
    }
    for &(len, code, mode) in &MODE_CODES {
        if reader.peek(len) == code {
            if len as usize > remaining {
                return Err(end_of_data(reader));
            }
            reader.consume(len);
            return Ok(mode);
        }
    }
    Err(CodecError::new(
        CodecErrorKind::InvalidCcittCode,
        format!("no mode code matches at bit {}", reader.pos),
    ))
}

/// One complete run, makeup codes included
fn read_run(reader: &mut BitReader, black: bool) -> Result<u32, CodecError> {
    let lookup = run_lookup();
    let table = if black { &lookup.black } else { &lookup.white };
    let mut total = 0u32;
    loop {
        let remaining = reader.remaining();
        if remaining == 0 {
            return Err(end_of_data(reader));
        }
        match table[reader.peek(LOOKUP_BITS) as usize] {
            Some(code) if code.len as usize <= remaining => {
                reader.consume(code.len as u32);
                total = total.saturating_add(code.run as u32);
                if code.run < 64 {
                    return Ok(total);
                }
            }
            Some(_) => return Err(end_of_data(reader)),
            None if remaining < LOOKUP_BITS as usize => return Err(end_of_data(reader)),
            None if reader.peek(EOL_BITS) == EOL_CODE => {
                return Err(CodecError::new(
                    CodecErrorKind::UnexpectedEndOfLine,
                    format!("end-of-line code inside a run at bit {}", reader.pos),
                ))
            }
            None => {
                return Err(CodecError::new(
                    CodecErrorKind::InvalidCcittCode,
                    format!(
                        "no {} run code matches at bit {}",
                        if black { "black" } else { "white" },
                        reader.pos
                    ),
                ))
            }
        }
    }
}

/// Record a color change; a change at the position of the previous one cancels it
fn push_change(changes: &mut Vec<u32>, position: u32) {
    if changes.last() == Some(&position) {
        changes.pop();
    } else {
        changes.push(position);
    }
}

fn overrun(width: u32, reached: u32) -> CodecError {
    CodecError::new(
        CodecErrorKind::UnexpectedEndOfLine,
        format!("runs reach pixel {} in a row of {}", reached, width),
    )
}

fn decode_1d_row(
    reader: &mut BitReader,
    width: u32,
    changes: &mut Vec<u32>,
) -> Result<(), CodecError> {
    let mut a0 = 0u32;
    let mut black = false;
    while a0 < width {
        let run = read_run(reader, black)?;
        a0 = a0.saturating_add(run);
        if a0 > width {
            return Err(overrun(width, a0));
        }
        if a0 < width {
            push_change(changes, a0);
        }
        black = !black;
    }
    Ok(())
}

fn decode_2d_row(
    reader: &mut BitReader,
    width: u32,
    reference: &[u32],
    changes: &mut Vec<u32>,
) -> Result<(), CodecError> {
    // a0 starts on an imaginary white pixel before the row
    let mut a0: i64 = -1;
    let mut black = false;
    let mut ref_index = 0;
    let width_i = width as i64;

    while a0 < width_i {
        while ref_index < reference.len() && reference[ref_index] as i64 <= a0 {
            ref_index += 1;
        }
        // b1 must be a change towards the color opposite to the current one
        let mut b1_index = ref_index;
        if (b1_index % 2 == 1) != black {
            b1_index += 1;
        }
        let b1 = reference.get(b1_index).copied().unwrap_or(width) as i64;
        let b2 = reference.get(b1_index + 1).copied().unwrap_or(width) as i64;

        match read_mode(reader)? {
            Mode::Pass => a0 = b2,
            Mode::Horizontal => {
                let start = a0.max(0);
                let first = read_run(reader, black)? as i64;
                let second = read_run(reader, !black)? as i64;
                let a1 = start + first;
                let a2 = a1 + second;
                if a2 > width_i {
                    return Err(overrun(width, a2.min(u32::MAX as i64) as u32));
                }
                if a1 < width_i {
                    push_change(changes, a1 as u32);
                }
                if a2 < width_i {
                    push_change(changes, a2 as u32);
                }
                a0 = a2;
            }
            Mode::Vertical(delta) => {
                let a1 = b1 + delta as i64;
                if a1 < a0.max(0) || a1 > width_i {
                    return Err(CodecError::new(
                        CodecErrorKind::InvalidCcittCode,
                        format!("vertical code moves to pixel {} from {}", a1, a0),
                    ));
                }
                if a1 < width_i {
                    push_change(changes, a1 as u32);
                }
                a0 = a1;
                black = !black;
            }
            Mode::Extension => {
                return Err(CodecError::new(
                    CodecErrorKind::InvalidCcittCode,
                    format!("uncompressed mode extension at bit {}", reader.pos),
                ))
            }
            Mode::EndOfLine if a0 < 0 => {
                return Err(CodecError::new(
                    CodecErrorKind::UnexpectedEndOfData,
                    format!("end of block at bit {}", reader.pos),
                ))
            }
            Mode::EndOfLine => {
                return Err(CodecError::new(
                    CodecErrorKind::UnexpectedEndOfLine,
                    format!("end-of-line code after pixel {} of {}", a0, width),
                ))
            }
        }
    }
    Ok(())
}

fn render_row(changes: &[u32], width: u32, row: &mut [u8]) {
    for pair in changes.chunks(2) {
        let start = pair[0];
        let end = pair.get(1).copied().unwrap_or(width).min(width);
        for x in start..end {
            row[(x / 8) as usize] |= 0x80 >> (x % 8);
        }
    }
}

/// Decode `rows` rows of `width` pixels
pub fn decode(
    input: &[u8],
    width: u32,
    rows: u32,
    variant: FaxVariant,
) -> Result<Vec<u8>, CodecError> {
    let row_bytes = width.div_ceil(8) as usize;
    let mut out = Vec::with_capacity(row_bytes.min(input.len().saturating_mul(8)));
    let mut reader = BitReader::new(input);
    let mut reference: Vec<u32> = Vec::new();
    let mut current: Vec<u32> = Vec::new();

    for row in 0..rows {
        current.clear();
        let decoded = match variant {
            FaxVariant::ModifiedHuffman => {
                reader.align_to_byte();
                decode_1d_row(&mut reader, width, &mut current)
            }
            FaxVariant::Group3 { two_dimensional } => {
                reader.skip_eol();
                let one_dimensional = if two_dimensional {
                    reader.read_bit().ok_or_else(|| end_of_data(&reader))? == 1
                } else {
                    true
                };
                if one_dimensional {
                    decode_1d_row(&mut reader, width, &mut current)
                } else {
                    decode_2d_row(&mut reader, width, &reference, &mut current)
                }
            }
            FaxVariant::Group4 => decode_2d_row(&mut reader, width, &reference, &mut current),
        };
        decoded.map_err(|e| CodecError::new(e.kind, format!("row {}: {}", row, e.detail)))?;

        let start = out.len();
        out.resize(start + row_bytes, 0);
        render_row(&current, width, &mut out[start..]);
        std::mem::swap(&mut reference, &mut current);
    }

    Ok(out)
}
