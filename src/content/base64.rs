/*
 * base64.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Tagliacarte, a cross-platform email client.
 *
 * Tagliacarte is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tagliacarte is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tagliacarte.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Base64 decoder for Content-Transfer-Encoding (RFC 2045).

use std::sync::OnceLock;

use super::DecodeError;

fn decode_table() -> &'static [i8; 256] {
    static TABLE: OnceLock<[i8; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t = [-1i8; 256];
        t[32] = -2; // space
        t[9] = -2; // tab
        t[13] = -2; // \r
        t[10] = -2; // \n
        for i in 0..26u8 {
            t[(b'A' + i) as usize] = i as i8;
            t[(b'a' + i) as usize] = (26 + i) as i8;
        }
        for i in 0..10u8 {
            t[(b'0' + i) as usize] = (52 + i) as i8;
        }
        t[b'+' as usize] = 62;
        t[b'/' as usize] = 63;
        t
    })
}

const WHITESPACE: i8 = -2;

/// Decode base64 from `src` into `dst`. Consumes only complete 4-char quanta; leaves remainder.
/// If `end_of_stream` then flush remaining bits into dst. Returns bytes consumed from `src`,
/// or an error as soon as a byte that is neither a base64 character, whitespace, nor `=` is seen.
pub fn decode(
    src: &[u8],
    src_pos: &mut usize,
    dst: &mut [u8],
    dst_pos: &mut usize,
    max_decode: usize,
    end_of_stream: bool,
) -> Result<usize, DecodeError> {
    let start_src = *src_pos;
    let mut quantum: u32 = 0;
    let mut quantum_bits: u32 = 0;
    let mut last_valid_src = *src_pos;
    let mut saw_padding = false;
    let dst_limit = (*dst_pos + max_decode).min(dst.len());

    while *src_pos < src.len() {
        let b = src[*src_pos];
        *src_pos += 1;
        let val = decode_table()[b as usize];

        if val >= 0 {
            quantum = (quantum << 6) | (val as u32);
            quantum_bits += 6;
            if quantum_bits >= 24 {
                if *dst_pos + 3 <= dst_limit {
                    dst[*dst_pos] = (quantum >> 16) as u8;
                    dst[*dst_pos + 1] = (quantum >> 8) as u8;
                    dst[*dst_pos + 2] = quantum as u8;
                    *dst_pos += 3;
                    last_valid_src = *src_pos;
                    quantum = 0;
                    quantum_bits = 0;
                } else {
                    *src_pos = last_valid_src;
                    break;
                }
            }
        } else if val == WHITESPACE {
            continue;
        } else if b == b'=' {
            saw_padding = true;
            break;
        } else {
            return Err(DecodeError::InvalidBase64);
        }
    }

    if (saw_padding || end_of_stream) && quantum_bits >= 8 && *dst_pos < dst_limit {
        dst[*dst_pos] = (quantum >> (quantum_bits - 8)) as u8;
        *dst_pos += 1;
        if quantum_bits >= 16 && *dst_pos < dst_limit {
            dst[*dst_pos] = (quantum >> (quantum_bits - 16)) as u8;
            *dst_pos += 1;
        }
        last_valid_src = *src_pos;
    }

    *src_pos = last_valid_src;
    Ok(last_valid_src - start_src)
}

/// Decode a complete in-memory base64 buffer.
pub fn decode_all(src: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut src_pos = 0;
    let mut dst = vec![0u8; src.len() * 3 / 4 + 4];
    let mut dst_pos = 0;
    let dst_len = dst.len();
    decode(src, &mut src_pos, &mut dst, &mut dst_pos, dst_len, true)?;
    dst.truncate(dst_pos);
    Ok(dst)
}

const ENCODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Encode `data` as standard padded base64 (used for SASL initial responses).
pub fn encode_all(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity((data.len() + 2) / 3 * 4);
    for chunk in data.chunks(3) {
        let n = (chunk[0] as usize) << 16
            | (chunk.get(1).copied().unwrap_or(0) as usize) << 8
            | chunk.get(2).copied().unwrap_or(0) as usize;
        out.push(ENCODE_ALPHABET[n >> 18]);
        out.push(ENCODE_ALPHABET[(n >> 12) & 63]);
        out.push(if chunk.len() > 1 { ENCODE_ALPHABET[(n >> 6) & 63] } else { b'=' });
        out.push(if chunk.len() > 2 { ENCODE_ALPHABET[n & 63] } else { b'=' });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_real_base64() {
        let cases: &[&[u8]] = &[b"", b"f", b"fo", b"foo", b"foob", b"fooba", b"foobar"];
        for &c in cases {
            let encoded = simple_encode(c);
            assert_eq!(decode_all(encoded.as_bytes()).unwrap(), c);
        }
    }

    #[test]
    fn encode_then_decode_is_identity() {
        let cases: &[&[u8]] = &[b"", b"\0user\0password", b"user=x\x01auth=Bearer tok\x01\x01"];
        for &c in cases {
            assert_eq!(decode_all(&encode_all(c)).unwrap(), c);
        }
    }

    #[test]
    fn invalid_byte_errors_instead_of_skipping() {
        let err = decode_all(b"this!!!not-base64").unwrap_err();
        assert_eq!(err, DecodeError::InvalidBase64);
    }

    #[test]
    fn whitespace_and_padding_are_tolerated() {
        assert_eq!(decode_all(b"Zm9v\r\nYmFy").unwrap(), b"foobar");
        assert_eq!(decode_all(b"Zm8=").unwrap(), b"fo");
    }

    fn simple_encode(data: &[u8]) -> String {
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
        let mut out = String::new();
        for chunk in data.chunks(3) {
            let b0 = chunk[0];
            let b1 = *chunk.get(1).unwrap_or(&0);
            let b2 = *chunk.get(2).unwrap_or(&0);
            let n = ((b0 as u32) << 16) | ((b1 as u32) << 8) | b2 as u32;
            out.push(ALPHABET[((n >> 18) & 0x3f) as usize] as char);
            out.push(ALPHABET[((n >> 12) & 0x3f) as usize] as char);
            out.push(if chunk.len() > 1 { ALPHABET[((n >> 6) & 0x3f) as usize] as char } else { '=' });
            out.push(if chunk.len() > 2 { ALPHABET[(n & 0x3f) as usize] as char } else { '=' });
        }
        out
    }
}
