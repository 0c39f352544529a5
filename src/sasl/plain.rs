/*
 * plain.rs
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

//! PLAIN SASL (RFC 4616). Requires TLS.

/// Build PLAIN initial response: NUL authzid NUL authcid NUL password (UTF-8).
/// Caller must base64-encode for the wire (`AUTHENTICATE PLAIN <base64>`).
pub fn encode_plain(authzid: &str, authcid: &str, password: &str) -> Vec<u8> {
    format!("\0{}\0{}\0{}", authzid, authcid, password).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_authzid_authcid_password_nul_separated() {
        assert_eq!(encode_plain("", "user", "pass"), b"\0user\0pass");
        assert_eq!(encode_plain("zid", "user", "pass"), b"zid\0user\0pass");
    }
}
