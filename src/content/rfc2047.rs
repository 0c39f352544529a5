/*
 * rfc2047.rs
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

//! RFC 2047 encoded-word decoding (e.g. `=?charset?q?text?=`) for ENVELOPE strings.

use super::charset::decode_charset;

/// Expand RFC 2047 encoded-words in the string. Bytes that fail to decode are left as-is.
pub fn decode_encoded_words(s: &str) -> String {
    let mut out = String::new();
    let bytes = s.as_bytes();
    let len = bytes.len();
    let mut pos = 0;

    while pos < len {
        if let Some(start) = find_encoded_word_start(bytes, pos) {
            out.push_str(std::str::from_utf8(&bytes[pos..start]).unwrap_or(""));
            let mut cursor = start;
            if let Some((decoded, end)) = decode_one_encoded_word(bytes, len, &mut cursor) {
                out.push_str(&decoded);
                pos = end;
            } else {
                // decode_one_encoded_word may have advanced cursor past the failed word
                // before discovering the failure; fall back from the untouched start.
                out.push_str(std::str::from_utf8(&bytes[start..start + 2.min(len - start)]).unwrap_or(""));
                pos = (start + 2).min(len);
            }
        } else {
            out.push_str(std::str::from_utf8(&bytes[pos..]).unwrap_or(""));
            break;
        }
    }
    out
}

fn find_encoded_word_start(bytes: &[u8], from: usize) -> Option<usize> {
    let rest = bytes.get(from..)?;
    let needle = b"=?";
    rest.windows(needle.len()).position(|w| w == needle).map(|i| from + i)
}

/// Decode one encoded-word at current pos. Returns (decoded_string, position_after_?=) or None.
fn decode_one_encoded_word(bytes: &[u8], len: usize, pos: &mut usize) -> Option<(String, usize)> {
    if *pos + 4 > len || &bytes[*pos..*pos + 2] != b"=?" {
        return None;
    }
    *pos += 2;
    let charset_start = *pos;
    let qmark1 = bytes[*pos..].iter().position(|&b| b == b'?')? + *pos;
    if qmark1 < charset_start + 1 || qmark1 + 2 >= len {
        return None;
    }
    let charset = std::str::from_utf8(&bytes[charset_start..qmark1]).ok()?.trim();
    let encoding = bytes[qmark1 + 1].to_ascii_lowercase();
    if bytes[qmark1 + 2] != b'?' {
        return None;
    }
    *pos = qmark1 + 3;
    let payload_start = *pos;
    let rest = &bytes[*pos..];
    let end_in_rest = rest.windows(2).position(|w| w[0] == b'?' && w[1] == b'=')?;
    let payload_end = *pos + end_in_rest;
    *pos = payload_end + 2; // consume ?=

    let payload = &bytes[payload_start..payload_end];
    let decoded_bytes = match encoding {
        b'b' => super::base64::decode_all(payload).ok()?,
        b'q' => decode_q(payload),
        _ => return None,
    };
    let decoded = decode_charset(&decoded_bytes, charset);
    Some((decoded, *pos))
}

/// Q encoding: `_` means space, the rest is quoted-printable.
fn decode_q(payload: &[u8]) -> Vec<u8> {
    let mut preprocessed = Vec::with_capacity(payload.len() * 2);
    for &b in payload {
        if b == b'_' {
            preprocessed.extend_from_slice(b"=20");
        } else {
            preprocessed.push(b);
        }
    }
    super::quoted_printable::decode_all(&preprocessed).unwrap_or_default()
}
