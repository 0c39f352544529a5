/*
 * charset.rs
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

//! Byte-to-UTF-8 charset conversion for MIME part text.

/// Maps every byte to its ISO-8859-1 codepoint-equivalent (U+0000..U+00FF).
pub fn latin1_to_utf8(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

const WINDOWS_1252_HIGH: [u32; 32] = [
    0x20AC, 0x0081, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, 0x02C6, 0x2030, 0x0160, 0x2039, 0x0152, 0x008D,
    0x017D, 0x008F, 0x0090, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, 0x02DC, 0x2122, 0x0161, 0x203A,
    0x0153, 0x009D, 0x017E, 0x0178,
];

/// Maps bytes 0x80-0x9F through the standard Windows-1252 table; all other bytes map like Latin-1.
pub fn windows_1252_to_utf8(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if (0x80..=0x9F).contains(&b) {
                char::from_u32(WINDOWS_1252_HIGH[(b - 0x80) as usize]).unwrap_or('\u{FFFD}')
            } else {
                b as char
            }
        })
        .collect()
}

/// Decode `bytes` per `charset` (case-insensitive). Unknown charsets pass through as Latin-1
/// (never fails, per the component contract).
pub fn decode_charset(bytes: &[u8], charset: &str) -> String {
    match charset.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => String::from_utf8_lossy(bytes).into_owned(),
        "us-ascii" | "ascii" => bytes.iter().map(|&b| if b < 0x80 { b as char } else { '\u{FFFD}' }).collect(),
        "iso-8859-1" | "latin1" | "iso_8859-1" | "l1" => latin1_to_utf8(bytes),
        "windows-1252" | "cp1252" | "x-cp1252" => windows_1252_to_utf8(bytes),
        _ => latin1_to_utf8(bytes),
    }
}
