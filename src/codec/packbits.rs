//! PackBits (Apple Macintosh) byte-oriented run-length decoding

use crate::error::{CodecError, CodecErrorKind};

/// Decode exactly `expected_len` bytes of PackBits data.
///
/// A run that would write past `expected_len` is corrupt; input that ends
/// before `expected_len` bytes were produced is truncated. Trailing input
/// after the buffer is full is ignored.
pub fn decode(input: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
    // A two-byte replicate run expands to at most 128 bytes
    let mut out = Vec::with_capacity(expected_len.min(input.len().saturating_mul(64)));
    let mut pos = 0;

    while out.len() < expected_len {
        let Some(&control) = input.get(pos) else {
            return Err(CodecError::new(
                CodecErrorKind::UnexpectedEndOfData,
                format!("input ended after {} of {} bytes", out.len(), expected_len),
            ));
        };
        pos += 1;
        let n = control as i8;

        if n >= 0 {
            let count = n as usize + 1;
            let literal = input.get(pos..pos + count).ok_or_else(|| {
                CodecError::new(
                    CodecErrorKind::UnexpectedEndOfData,
                    format!("literal run of {} at input byte {} is cut short", count, pos - 1),
                )
            })?;
            check_room(out.len(), count, expected_len, pos - 1)?;
            out.extend_from_slice(literal);
            pos += count;
        } else if n != -128 {
            let count = (-(n as i16)) as usize + 1;
            let Some(&value) = input.get(pos) else {
                return Err(CodecError::new(
                    CodecErrorKind::UnexpectedEndOfData,
                    format!("replicate run at input byte {} has no value", pos - 1),
                ));
            };
            check_room(out.len(), count, expected_len, pos - 1)?;
            out.resize(out.len() + count, value);
            pos += 1;
        }
        // -128 is a no-op
    }

    Ok(out)
}

fn check_room(written: usize, count: usize, expected_len: usize, at: usize) -> Result<(), CodecError> {
    if written + count > expected_len {
        return Err(CodecError::new(
            CodecErrorKind::CorruptRunLength,
            format!(
                "run of {} at input byte {} overflows {} byte buffer",
                count, at, expected_len
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiff_reference_sequence() {
        let encoded = [
            0xFE, 0xAA, 0x02, 0x80, 0x00, 0x2A, 0xFD, 0xAA, 0x03, 0x80, 0x00, 0x2A, 0x22, 0xF7,
            0xAA,
        ];
        let expected = [
            0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0xAA, 0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0x22,
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
        ];
        assert_eq!(decode(&encoded, expected.len()).unwrap(), expected);
    }

    #[test]
    fn test_noop_control_byte() {
        assert_eq!(decode(&[0x80, 0x00, 0x07], 1).unwrap(), vec![7]);
    }

    #[test]
    fn test_run_overflow_is_corrupt() {
        let err = decode(&[0xFD, 0x11], 2).unwrap_err();
        assert_eq!(err.kind, CodecErrorKind::CorruptRunLength);

        let err = decode(&[0x03, 1, 2, 3, 4], 3).unwrap_err();
        assert_eq!(err.kind, CodecErrorKind::CorruptRunLength);
    }

    #[test]
    fn test_short_input() {
        let err = decode(&[0x01, 0x05], 2).unwrap_err();
        assert_eq!(err.kind, CodecErrorKind::UnexpectedEndOfData);

        let err = decode(&[0x00, 0x05], 2).unwrap_err();
        assert_eq!(err.kind, CodecErrorKind::UnexpectedEndOfData);
    }

    #[test]
    fn test_trailing_input_ignored() {
        assert_eq!(decode(&[0xFF, 9, 0x00, 1], 2).unwrap(), vec![9, 9]);
    }
}
