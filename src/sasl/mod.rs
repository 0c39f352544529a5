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

//! SASL initial-response encoders for the two mechanisms `AUTHENTICATE` uses
//! in initial-response form. Both are single-round: the client sends its
//! whole response alongside the mechanism name, no challenge/response loop.
//! Both encoders return the base64 string ready to follow the mechanism name
//! on the wire, e.g. `AUTHENTICATE XOAUTH2 <encode_xoauth2_response(..)>`.

mod plain;

use crate::content::base64;

/// PLAIN (RFC 4616): `NUL authzid NUL authcid NUL password`, base64-encoded.
pub fn encode_plain_response(authzid: &str, authcid: &str, password: &str) -> String {
    to_wire(&plain::encode_plain(authzid, authcid, password))
}

/// XOAUTH2 (Gmail/Outlook): `user={user}\x01auth=Bearer {token}\x01\x01`, base64-encoded.
/// See <https://developers.google.com/gmail/imap/xoauth2-protocol>.
pub fn encode_xoauth2_response(user: &str, access_token: &str) -> String {
    to_wire(format!("user={user}\x01auth=Bearer {access_token}\x01\x01").as_bytes())
}

fn to_wire(raw: &[u8]) -> String {
    String::from_utf8(base64::encode_all(raw)).expect("base64 alphabet is ASCII")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_response_is_base64_of_nul_separated_credentials() {
        let encoded = encode_plain_response("", "user", "pass");
        let raw = base64::decode_all(encoded.as_bytes()).unwrap();
        assert_eq!(raw, b"\0user\0pass");
    }

    #[test]
    fn xoauth2_response_is_base64_of_user_and_bearer_token() {
        let encoded = encode_xoauth2_response("user@example.com", "ya29.token123");
        let raw = base64::decode_all(encoded.as_bytes()).unwrap();
        assert_eq!(raw, b"user=user@example.com\x01auth=Bearer ya29.token123\x01\x01");
    }
}
