/*
 * mod.rs
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

//! Transfer-encoding decode and charset conversion for FETCH body parts.

pub mod base64;
pub mod charset;
pub mod quoted_printable;
pub mod rfc2047;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    InvalidBase64,
    InvalidQuotedPrintable,
    UnknownEncoding,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidBase64 => write!(f, "invalid base64 data"),
            DecodeError::InvalidQuotedPrintable => write!(f, "invalid quoted-printable data"),
            DecodeError::UnknownEncoding => write!(f, "unknown content-transfer-encoding"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode a complete in-memory buffer encoded with `encoding` (case-insensitive).
/// `7bit`/`8bit`/`binary` are passed through unchanged.
pub fn decode_transfer_encoding(data: &[u8], encoding: &str) -> Result<Vec<u8>, DecodeError> {
    match encoding.to_ascii_lowercase().as_str() {
        "base64" => base64::decode_all(data),
        "quoted-printable" => quoted_printable::decode_all(data),
        "7bit" | "8bit" | "binary" => Ok(data.to_vec()),
        _ => Err(DecodeError::UnknownEncoding),
    }
}
