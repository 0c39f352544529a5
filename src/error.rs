/*
 * error.rs
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

//! Crate-wide error type.

use std::fmt;

use crate::content::DecodeError;
use crate::parser::TaggedResponse;
use crate::tokenizer::TokenizeError;

/// Errors from the Connection Engine, parser, tokenizer, or Content Decoder.
#[derive(Debug)]
pub enum ImapError {
    /// Command completed with tagged `NO`.
    TaggedNo(TaggedResponse),
    /// Command completed with tagged `BAD`.
    TaggedBad(TaggedResponse),
    /// Tokenizer or parser rejected the byte stream; fatal, the connection is terminated.
    Protocol(String),
    /// The transport reported EOF or an I/O error; fatal.
    ConnectionClosed(String),
    /// The server did not greet within the configured timeout.
    Timeout,
    /// A command was submitted after LOGOUT.
    WrongPhase(&'static str),
    /// Transfer-encoding or charset decode failure in a FETCH body part.
    Decode(DecodeError),
}

impl ImapError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        ImapError::Protocol(msg.into())
    }
}

impl fmt::Display for ImapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImapError::TaggedNo(r) => write!(f, "{} NO {}", r.tag, r.text),
            ImapError::TaggedBad(r) => write!(f, "{} BAD {}", r.tag, r.text),
            ImapError::Protocol(m) => write!(f, "protocol error: {m}"),
            ImapError::ConnectionClosed(m) => write!(f, "connection closed: {m}"),
            ImapError::Timeout => write!(f, "timed out waiting for greeting"),
            ImapError::WrongPhase(op) => write!(f, "cannot issue {op} after LOGOUT"),
            ImapError::Decode(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ImapError {}

impl From<TokenizeError> for ImapError {
    fn from(e: TokenizeError) -> Self {
        ImapError::Protocol(e.0)
    }
}

impl From<crate::parser::ParseError> for ImapError {
    fn from(e: crate::parser::ParseError) -> Self {
        ImapError::Protocol(e.0)
    }
}

impl From<DecodeError> for ImapError {
    fn from(e: DecodeError) -> Self {
        ImapError::Decode(e)
    }
}

impl From<std::io::Error> for ImapError {
    fn from(e: std::io::Error) -> Self {
        ImapError::ConnectionClosed(e.to_string())
    }
}
