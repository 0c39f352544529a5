/*
 * lib.rs
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

//! Async IMAP4rev2 client core (RFC 9051): tokenizer, parser, command serializer,
//! connection engine, and the MIME content decoder FETCH results need.
//!
//! Transport establishment (TLS, DNS) is the caller's job — anything implementing
//! [`transport::Transport`] can be handed to [`connection::Connection::connect`].

pub mod command;
pub mod connection;
pub mod content;
pub mod error;
pub mod parser;
pub mod sasl;
pub mod sequence_set;
pub mod tokenizer;
pub mod transport;

pub use command::{Command, CommandArg};
pub use connection::{CommandOutcome, Connection, ConnectionState, MailboxInfo};
pub use error::ImapError;
pub use parser::{Envelope, FetchAttrs, ListEntry, Response, StatusAttrs, TaggedResponse, Untagged};
pub use transport::Transport;
