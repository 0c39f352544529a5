/*
 * connection.rs
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

//! Connection Engine: owns the transport, drives the protocol state machine,
//! and demultiplexes responses back to the caller that issued each command.
//!
//! The write side (tag allocation, serialization, and the write itself) runs
//! inside a single `tokio::sync::Mutex` critical section shared with the
//! response dispatch loop, so tags are assigned in exactly the order callers
//! enter that section and untagged/continuation handling never races a
//! concurrent command submission.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{oneshot, Mutex};

use crate::command::{format_tag, serialize, Command, CommandArg, SerializedCommand, DONE};
use crate::error::ImapError;
use crate::parser::{
    parse_response, ESearch, FetchAttrs, ListEntry, Response, ResponseCode, Status, StatusAttrs, TaggedResponse,
    Untagged,
};
use crate::tokenizer::{tokenize_line, TokenizeOutcome};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    NotAuthenticated,
    Authenticated,
    Selected,
    Logout,
}

#[derive(Debug, Clone, Default)]
pub struct MailboxInfo {
    pub exists: u32,
    pub flags: Vec<String>,
    pub uid_next: Option<u32>,
    pub uid_validity: Option<u32>,
}

/// The typed result of a completed command, shaped per §4.4.4.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Tagged(TaggedResponse),
    Fetch(Vec<FetchAttrs>),
    Search(ESearch),
    List(Vec<ListEntry>),
    Status(StatusAttrs),
    Capability(Vec<String>),
    CopyUid(Option<(u32, String, String)>),
}

type CommandResult = Result<CommandOutcome, ImapError>;

struct PendingEntry {
    name: String,
    tx: oneshot::Sender<CommandResult>,
    untagged: Vec<Untagged>,
    pending_literal: Option<Vec<u8>>,
}

struct IdleEntry {
    tag: String,
    ack_tx: Option<oneshot::Sender<Result<(), ImapError>>>,
    acknowledged: bool,
    callback: Box<dyn FnMut(Untagged) + Send>,
}

type Unsolicited = Box<dyn Fn(Untagged) + Send>;

struct Inner<T> {
    writer: WriteHalf<T>,
    tag_counter: u32,
    pending: VecDeque<(String, PendingEntry)>,
    conn_state: ConnectionState,
    capabilities: Vec<String>,
    mailbox_info: MailboxInfo,
    idle: Option<IdleEntry>,
    on_unsolicited: Option<Unsolicited>,
}

impl<T> Inner<T> {
    fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format_tag(self.tag_counter)
    }

    fn fail_all(&mut self, make_err: impl Fn() -> ImapError) {
        self.conn_state = ConnectionState::Logout;
        for (_, entry) in self.pending.drain(..) {
            let _ = entry.tx.send(Err(make_err()));
        }
        if let Some(idle) = self.idle.take() {
            if let Some(ack) = idle.ack_tx {
                let _ = ack.send(Err(make_err()));
            }
        }
    }
}

/// A live IMAP connection over any `Transport`.
pub struct Connection<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Connection<T> {
    fn clone(&self) -> Self {
        Connection { inner: self.inner.clone() }
    }
}

const GREETING_TIMEOUT: Duration = Duration::from_secs(30);

impl<T: Transport + 'static> Connection<T> {
    /// Take ownership of `transport`, await the greeting, and start the background
    /// read loop. Returns once the greeting has been consumed.
    pub async fn connect(transport: T) -> Result<Self, ImapError> {
        let (mut reader, writer) = tokio::io::split(transport);
        let inner = Arc::new(Mutex::new(Inner {
            writer,
            tag_counter: 0,
            pending: VecDeque::new(),
            conn_state: ConnectionState::NotAuthenticated,
            capabilities: Vec::new(),
            mailbox_info: MailboxInfo::default(),
            idle: None,
            on_unsolicited: None,
        }));

        let mut buf = Vec::new();
        let greeting = tokio::time::timeout(GREETING_TIMEOUT, read_one_response(&mut reader, &mut buf))
            .await
            .map_err(|_| ImapError::Timeout)??;

        match greeting {
            Response::Untagged(Untagged::OkNoBad { status: Status::Ok, code, .. }) => {
                if let Some(ResponseCode::Capability(list)) = code {
                    inner.lock().await.capabilities = list;
                }
            }
            Response::Untagged(Untagged::PreAuth { code, .. }) => {
                let mut guard = inner.lock().await;
                guard.conn_state = ConnectionState::Authenticated;
                if let Some(ResponseCode::Capability(list)) = code {
                    guard.capabilities = list;
                }
            }
            Response::Untagged(Untagged::Bye(text)) => {
                return Err(ImapError::ConnectionClosed(text));
            }
            other => return Err(ImapError::protocol(format!("unexpected greeting: {other:?}"))),
        }

        let conn = Connection { inner: inner.clone() };
        tokio::spawn(read_loop(reader, buf, inner));
        Ok(conn)
    }

    /// Install a callback invoked for every untagged response received outside IDLE.
    pub async fn set_on_unsolicited(&self, callback: impl Fn(Untagged) + Send + 'static) {
        self.inner.lock().await.on_unsolicited = Some(Box::new(callback));
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.conn_state
    }

    pub async fn capabilities(&self) -> Vec<String> {
        self.inner.lock().await.capabilities.clone()
    }

    pub async fn mailbox_info(&self) -> MailboxInfo {
        self.inner.lock().await.mailbox_info.clone()
    }

    async fn submit(&self, name: &str, args: Vec<CommandArg>) -> CommandResult {
        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.inner.lock().await;
            if guard.conn_state == ConnectionState::Logout {
                return Err(ImapError::WrongPhase("command"));
            }
            let tag = guard.next_tag();
            let cmd = Command::new(tag.clone(), name, args);
            let serialized = serialize(&cmd);
            let pending_literal = match serialized {
                SerializedCommand::Plain(bytes) => {
                    guard.writer.write_all(&bytes).await?;
                    None
                }
                SerializedCommand::WithLiteral { prefix, literal } => {
                    guard.writer.write_all(&prefix).await?;
                    Some(literal)
                }
            };
            trace!("-> {tag} {name}");
            guard
                .pending
                .push_back((tag, PendingEntry { name: name.to_string(), tx, untagged: Vec::new(), pending_literal }));
        }
        rx.await.map_err(|_| ImapError::ConnectionClosed("engine terminated".into()))?
    }

    pub async fn capability(&self) -> Result<Vec<String>, ImapError> {
        match self.submit("CAPABILITY", vec![]).await? {
            CommandOutcome::Capability(list) => Ok(list),
            _ => Ok(self.capabilities().await),
        }
    }

    pub async fn noop(&self) -> Result<(), ImapError> {
        self.submit("NOOP", vec![]).await.map(|_| ())
    }

    pub async fn logout(&self) -> Result<(), ImapError> {
        self.submit("LOGOUT", vec![]).await.map(|_| ())
    }

    pub async fn login(&self, user: &str, password: &str) -> Result<(), ImapError> {
        self.submit("LOGIN", vec![user.into(), password.into()]).await.map(|_| ())
    }

    /// AUTHENTICATE in initial-response form: `AUTHENTICATE MECH <base64 IR>`.
    pub async fn authenticate_plain(&self, authzid: &str, authcid: &str, password: &str) -> Result<(), ImapError> {
        let encoded = crate::sasl::encode_plain_response(authzid, authcid, password);
        self.submit("AUTHENTICATE", vec!["PLAIN".into(), CommandArg::Raw(encoded)]).await.map(|_| ())
    }

    pub async fn authenticate_xoauth2(&self, user: &str, access_token: &str) -> Result<(), ImapError> {
        let encoded = crate::sasl::encode_xoauth2_response(user, access_token);
        self.submit("AUTHENTICATE", vec!["XOAUTH2".into(), CommandArg::Raw(encoded)]).await.map(|_| ())
    }

    pub async fn select(&self, mailbox: &str) -> Result<(), ImapError> {
        self.submit("SELECT", vec![mailbox.into()]).await.map(|_| ())
    }

    pub async fn examine(&self, mailbox: &str) -> Result<(), ImapError> {
        self.submit("EXAMINE", vec![mailbox.into()]).await.map(|_| ())
    }

    pub async fn create(&self, mailbox: &str) -> Result<(), ImapError> {
        self.submit("CREATE", vec![mailbox.into()]).await.map(|_| ())
    }

    pub async fn delete(&self, mailbox: &str) -> Result<(), ImapError> {
        self.submit("DELETE", vec![mailbox.into()]).await.map(|_| ())
    }

    pub async fn list(&self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>, ImapError> {
        match self.submit("LIST", vec![reference.into(), pattern.into()]).await? {
            CommandOutcome::List(entries) => Ok(entries),
            _ => Ok(Vec::new()),
        }
    }

    pub async fn status(&self, mailbox: &str, items: &str) -> Result<StatusAttrs, ImapError> {
        match self.submit("STATUS", vec![mailbox.into(), CommandArg::Raw(format!("({items})"))]).await? {
            CommandOutcome::Status(attrs) => Ok(attrs),
            _ => Ok(StatusAttrs::default()),
        }
    }

    pub async fn enable(&self, extensions: &[&str]) -> Result<(), ImapError> {
        let args = extensions.iter().map(|e| CommandArg::from(*e)).collect();
        self.submit("ENABLE", args).await.map(|_| ())
    }

    pub async fn append(
        &self,
        mailbox: &str,
        flags: Option<&str>,
        internal_date: Option<&str>,
        message: Vec<u8>,
    ) -> Result<Option<(u32, u32)>, ImapError> {
        let mut args = vec![CommandArg::from(mailbox)];
        if let Some(f) = flags {
            args.push(CommandArg::Raw(format!("({f})")));
        }
        if let Some(d) = internal_date {
            args.push(CommandArg::Str(d.to_string()));
        }
        args.push(CommandArg::Literal(message));
        match self.submit("APPEND", args).await? {
            CommandOutcome::Tagged(tagged) => match tagged.code {
                Some(ResponseCode::AppendUid(validity, uid)) => Ok(Some((validity, uid))),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    pub async fn close(&self) -> Result<(), ImapError> {
        self.submit("CLOSE", vec![]).await.map(|_| ())
    }

    pub async fn unselect(&self) -> Result<(), ImapError> {
        self.submit("UNSELECT", vec![]).await.map(|_| ())
    }

    pub async fn expunge(&self) -> Result<(), ImapError> {
        self.submit("EXPUNGE", vec![]).await.map(|_| ())
    }

    pub async fn search(&self, criteria: &str) -> Result<ESearch, ImapError> {
        self.search_inner("SEARCH", criteria).await
    }

    pub async fn uid_search(&self, criteria: &str) -> Result<ESearch, ImapError> {
        self.search_inner("UID SEARCH", criteria).await
    }

    async fn search_inner(&self, name: &str, criteria: &str) -> Result<ESearch, ImapError> {
        match self.submit(name, vec![CommandArg::Raw(criteria.to_string())]).await? {
            CommandOutcome::Search(es) => Ok(es),
            _ => Ok(ESearch::default()),
        }
    }

    pub async fn fetch(&self, sequence_set: &str, items: &str) -> Result<Vec<FetchAttrs>, ImapError> {
        self.fetch_inner("FETCH", sequence_set, items).await
    }

    pub async fn uid_fetch(&self, sequence_set: &str, items: &str) -> Result<Vec<FetchAttrs>, ImapError> {
        self.fetch_inner("UID FETCH", sequence_set, items).await
    }

    async fn fetch_inner(&self, name: &str, sequence_set: &str, items: &str) -> Result<Vec<FetchAttrs>, ImapError> {
        let args = vec![CommandArg::Raw(sequence_set.to_string()), CommandArg::Raw(items.to_string())];
        match self.submit(name, args).await? {
            CommandOutcome::Fetch(items) => Ok(items),
            _ => Ok(Vec::new()),
        }
    }

    pub async fn store(&self, sequence_set: &str, item: &str) -> Result<Vec<FetchAttrs>, ImapError> {
        self.fetch_inner("STORE", sequence_set, item).await
    }

    pub async fn uid_store(&self, sequence_set: &str, item: &str) -> Result<Vec<FetchAttrs>, ImapError> {
        self.fetch_inner("UID STORE", sequence_set, item).await
    }

    pub async fn copy(&self, sequence_set: &str, mailbox: &str) -> Result<Option<(u32, String, String)>, ImapError> {
        self.copy_move_inner("COPY", sequence_set, mailbox).await
    }

    pub async fn uid_copy(
        &self,
        sequence_set: &str,
        mailbox: &str,
    ) -> Result<Option<(u32, String, String)>, ImapError> {
        self.copy_move_inner("UID COPY", sequence_set, mailbox).await
    }

    pub async fn r#move(&self, sequence_set: &str, mailbox: &str) -> Result<Option<(u32, String, String)>, ImapError> {
        self.copy_move_inner("MOVE", sequence_set, mailbox).await
    }

    pub async fn uid_move(
        &self,
        sequence_set: &str,
        mailbox: &str,
    ) -> Result<Option<(u32, String, String)>, ImapError> {
        self.copy_move_inner("UID MOVE", sequence_set, mailbox).await
    }

    async fn copy_move_inner(
        &self,
        name: &str,
        sequence_set: &str,
        mailbox: &str,
    ) -> Result<Option<(u32, String, String)>, ImapError> {
        let args = vec![CommandArg::Raw(sequence_set.to_string()), mailbox.into()];
        match self.submit(name, args).await? {
            CommandOutcome::CopyUid(result) => Ok(result),
            _ => Ok(None),
        }
    }

    /// Send `IDLE`, wait for the server's continuation, and register `callback` to be
    /// invoked (synchronously, from the read loop) for each Exists/Expunge/Fetch received
    /// while idling. Returns once the continuation arrives.
    pub async fn idle(&self, callback: impl FnMut(Untagged) + Send + 'static) -> Result<(), ImapError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        {
            let mut guard = self.inner.lock().await;
            if guard.conn_state == ConnectionState::Logout {
                return Err(ImapError::WrongPhase("IDLE"));
            }
            let tag = guard.next_tag();
            let cmd = Command::new(tag.clone(), "IDLE", vec![]);
            match serialize(&cmd) {
                SerializedCommand::Plain(bytes) => guard.writer.write_all(&bytes).await?,
                SerializedCommand::WithLiteral { .. } => unreachable!("IDLE never carries a literal"),
            }
            guard.idle = Some(IdleEntry {
                tag,
                ack_tx: Some(ack_tx),
                acknowledged: false,
                callback: Box::new(callback),
            });
        }
        ack_rx.await.map_err(|_| ImapError::ConnectionClosed("engine terminated".into()))?
    }

    /// Send `DONE` and await the tagged OK that closes the IDLE command.
    pub async fn idle_done(&self) -> Result<TaggedResponse, ImapError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.inner.lock().await;
            let idle = guard.idle.take().ok_or_else(|| ImapError::protocol("idle_done without an active IDLE"))?;
            guard.writer.write_all(DONE).await?;
            guard.pending.push_back((idle.tag.clone(), PendingEntry {
                name: "IDLE".to_string(),
                tx,
                untagged: Vec::new(),
                pending_literal: None,
            }));
        }
        match rx.await.map_err(|_| ImapError::ConnectionClosed("engine terminated".into()))? {
            Ok(CommandOutcome::Tagged(t)) => Ok(t),
            Ok(_) => unreachable!("IDLE always completes as a Tagged outcome"),
            Err(e) => Err(e),
        }
    }
}

async fn read_one_response<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> Result<Response, ImapError> {
    loop {
        match tokenize_line(buf)? {
            TokenizeOutcome::Complete { tokens, consumed } => {
                buf.drain(0..consumed);
                return Ok(parse_response(&tokens)?);
            }
            TokenizeOutcome::Incomplete => {
                let mut chunk = [0u8; 4096];
                let n = reader.read(&mut chunk).await?;
                if n == 0 {
                    return Err(ImapError::ConnectionClosed("eof before greeting".into()));
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

async fn read_loop<T: Transport + 'static>(mut reader: ReadHalf<T>, mut buf: Vec<u8>, inner: Arc<Mutex<Inner<T>>>) {
    let mut chunk = [0u8; 4096];
    loop {
        loop {
            let outcome = match tokenize_line(&buf) {
                Ok(o) => o,
                Err(e) => {
                    warn!("tokenizer rejected input: {e}");
                    inner.lock().await.fail_all(|| ImapError::protocol(e.0.clone()));
                    return;
                }
            };
            match outcome {
                TokenizeOutcome::Complete { tokens, consumed } => {
                    buf.drain(0..consumed);
                    match parse_response(&tokens) {
                        Ok(resp) => dispatch(&inner, resp).await,
                        Err(e) => {
                            warn!("parser rejected response: {e}");
                            inner.lock().await.fail_all(|| ImapError::protocol(e.0.clone()));
                            return;
                        }
                    }
                }
                TokenizeOutcome::Incomplete => break,
            }
        }
        match reader.read(&mut chunk).await {
            Ok(0) => {
                debug!("transport closed");
                inner.lock().await.fail_all(|| ImapError::ConnectionClosed("eof".into()));
                return;
            }
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) => {
                warn!("transport read error: {e}");
                let msg = e.to_string();
                inner.lock().await.fail_all(move || ImapError::ConnectionClosed(msg.clone()));
                return;
            }
        }
    }
}

async fn dispatch<T: Transport + 'static>(inner: &Arc<Mutex<Inner<T>>>, resp: Response) {
    let mut guard = inner.lock().await;
    match resp {
        Response::Tagged(tagged) => dispatch_tagged(&mut guard, tagged),
        Response::Continuation { text, base64 } => dispatch_continuation(&mut guard, text, base64).await,
        Response::Untagged(u) => dispatch_untagged(&mut guard, u),
    }
}

fn dispatch_tagged<T>(guard: &mut Inner<T>, tagged: TaggedResponse) {
    let idx = guard.pending.iter().position(|(tag, _)| tag == &tagged.tag);
    let Some(idx) = idx else {
        trace!("dropping tagged response for unknown tag {}", tagged.tag);
        return;
    };
    let (_, entry) = guard.pending.remove(idx).expect("index just found");

    if tagged.status == Status::Ok {
        apply_state_transition(guard, &entry.name, &tagged);
    }

    let outcome = build_outcome(&entry.name, &tagged, &entry.untagged);
    let result = match tagged.status {
        Status::Ok => Ok(outcome),
        Status::No => Err(ImapError::TaggedNo(tagged)),
        Status::Bad => Err(ImapError::TaggedBad(tagged)),
    };
    let _ = entry.tx.send(result);
}

fn apply_state_transition<T>(guard: &mut Inner<T>, name: &str, tagged: &TaggedResponse) {
    let upper = name.to_ascii_uppercase();
    match upper.as_str() {
        "LOGIN" | "AUTHENTICATE" => {
            guard.conn_state = ConnectionState::Authenticated;
            if let Some(ResponseCode::Capability(list)) = &tagged.code {
                guard.capabilities = list.clone();
            }
        }
        "SELECT" | "EXAMINE" => guard.conn_state = ConnectionState::Selected,
        "CLOSE" | "UNSELECT" => {
            guard.conn_state = ConnectionState::Authenticated;
            guard.mailbox_info = MailboxInfo::default();
        }
        "LOGOUT" => guard.conn_state = ConnectionState::Logout,
        _ => {}
    }
}

fn build_outcome(name: &str, tagged: &TaggedResponse, untagged: &[Untagged]) -> CommandOutcome {
    let upper = name.to_ascii_uppercase();
    if upper.ends_with("FETCH") || upper.ends_with("STORE") {
        let items = untagged
            .iter()
            .filter_map(|u| match u {
                Untagged::Fetch { attrs, .. } => Some(attrs.clone()),
                _ => None,
            })
            .collect();
        return CommandOutcome::Fetch(items);
    }
    if upper.ends_with("SEARCH") {
        let es = untagged
            .iter()
            .find_map(|u| match u {
                Untagged::ESearch(es) => Some(es.clone()),
                _ => None,
            })
            .unwrap_or_default();
        return CommandOutcome::Search(es);
    }
    if upper == "LIST" || upper == "LSUB" {
        let entries = untagged
            .iter()
            .filter_map(|u| match u {
                Untagged::List(entry) => Some(entry.clone()),
                _ => None,
            })
            .collect();
        return CommandOutcome::List(entries);
    }
    if upper == "STATUS" {
        let attrs = untagged
            .iter()
            .find_map(|u| match u {
                Untagged::Status { attrs, .. } => Some(attrs.clone()),
                _ => None,
            })
            .unwrap_or_default();
        return CommandOutcome::Status(attrs);
    }
    if upper == "CAPABILITY" {
        if let Some(ResponseCode::Capability(list)) = &tagged.code {
            return CommandOutcome::Capability(list.clone());
        }
        let list = untagged
            .iter()
            .find_map(|u| match u {
                Untagged::Capability(list) => Some(list.clone()),
                _ => None,
            })
            .unwrap_or_default();
        return CommandOutcome::Capability(list);
    }
    if upper.ends_with("COPY") || upper.ends_with("MOVE") {
        let result = match &tagged.code {
            Some(ResponseCode::CopyUid(v, src, dst)) => Some((*v, src.clone(), dst.clone())),
            _ => untagged.iter().find_map(|u| match u {
                Untagged::OkNoBad { code: Some(ResponseCode::CopyUid(v, src, dst)), .. } => {
                    Some((*v, src.clone(), dst.clone()))
                }
                _ => None,
            }),
        };
        return CommandOutcome::CopyUid(result);
    }
    CommandOutcome::Tagged(tagged.clone())
}

async fn dispatch_continuation<T: Transport + 'static>(guard: &mut Inner<T>, text: String, base64: Option<String>) {
    let _ = base64;
    if let Some(idle) = guard.idle.as_mut() {
        if !idle.acknowledged {
            idle.acknowledged = true;
            if let Some(ack) = idle.ack_tx.take() {
                let _ = ack.send(Ok(()));
            }
            return;
        }
    }
    if let Some((_, entry)) = guard.pending.front_mut() {
        if let Some(literal) = entry.pending_literal.take() {
            trace!("sending {} literal bytes after continuation ({text})", literal.len());
            if guard.writer.write_all(&literal).await.is_ok() {
                let _ = guard.writer.write_all(b"\r\n").await;
            }
            return;
        }
    }
    trace!("dropping unexpected continuation: {text}");
}

fn dispatch_untagged<T>(guard: &mut Inner<T>, u: Untagged) {
    match &u {
        Untagged::Capability(list) => guard.capabilities = list.clone(),
        Untagged::Exists(n) => guard.mailbox_info.exists = *n,
        Untagged::Flags(flags) => guard.mailbox_info.flags = flags.clone(),
        Untagged::OkNoBad { code: Some(code), .. } => match code {
            ResponseCode::UidValidity(v) => guard.mailbox_info.uid_validity = Some(*v),
            ResponseCode::UidNext(v) => guard.mailbox_info.uid_next = Some(*v),
            _ => {}
        },
        _ => {}
    }

    if guard.idle.is_some() {
        let deliver = matches!(u, Untagged::Exists(_) | Untagged::Expunge(_) | Untagged::Fetch { .. });
        if deliver {
            if let Some(idle) = guard.idle.as_mut() {
                (idle.callback)(u);
            }
        }
        return;
    }

    if let Some((_, entry)) = guard.pending.front_mut() {
        entry.untagged.push(u.clone());
    }
    if let Some(cb) = guard.on_unsolicited.as_ref() {
        cb(u);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    async fn write_all(stream: &mut (impl tokio::io::AsyncWrite + Unpin), data: &[u8]) {
        stream.write_all(data).await.unwrap();
    }

    async fn read_until(stream: &mut (impl tokio::io::AsyncRead + Unpin), needle: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            stream.read_exact(&mut byte).await.unwrap();
            buf.push(byte[0]);
            if buf.ends_with(needle) {
                return buf;
            }
        }
    }

    #[tokio::test]
    async fn greeting_then_login() {
        let (client, mut server) = duplex(4096);
        write_all(&mut server, b"* OK [CAPABILITY IMAP4rev2 AUTH=PLAIN IDLE] Ready\r\n").await;

        let conn = Connection::connect(client).await.unwrap();
        assert_eq!(conn.state().await, ConnectionState::NotAuthenticated);
        assert_eq!(conn.capabilities().await, vec!["IMAP4rev2", "AUTH=PLAIN", "IDLE"]);

        let server_task = tokio::spawn(async move {
            let _req = read_until(&mut server, b"\r\n").await;
            write_all(&mut server, b"A0001 OK LOGIN completed\r\n").await;
            server
        });
        conn.login("u", "p").await.unwrap();
        assert_eq!(conn.state().await, ConnectionState::Authenticated);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn select_then_fetch_reports_flags_and_exists() {
        let (client, mut server) = duplex(8192);
        write_all(&mut server, b"* OK Ready\r\n").await;
        let conn = Connection::connect(client).await.unwrap();

        let server_task = tokio::spawn(async move {
            let _select_req = read_until(&mut server, b"\r\n").await;
            write_all(
                &mut server,
                b"* 172 EXISTS\r\n* FLAGS (\\Answered \\Seen)\r\nA0001 OK [READ-WRITE] SELECT completed\r\n",
            )
            .await;
            let _fetch_req = read_until(&mut server, b"\r\n").await;
            write_all(&mut server, b"* 12 FETCH (FLAGS (\\Seen) UID 4827)\r\nA0002 OK FETCH completed\r\n").await;
            server
        });

        conn.select("INBOX").await.unwrap();
        assert_eq!(conn.state().await, ConnectionState::Selected);
        assert_eq!(conn.mailbox_info().await.exists, 172);

        let fetched = conn.fetch("12", "(FLAGS UID)").await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].uid, Some(4827));
        assert_eq!(fetched[0].flags, Some(vec!["seen".to_string()]));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn literal_containing_crlf_is_delivered_atomically() {
        let (client, mut server) = duplex(8192);
        write_all(&mut server, b"* OK Ready\r\n").await;
        let conn = Connection::connect(client).await.unwrap();

        let server_task = tokio::spawn(async move {
            let _req = read_until(&mut server, b"\r\n").await;
            write_all(&mut server, b"* 1 FETCH (BODY[] {11}\r\nHello World)\r\nA0001 OK FETCH completed\r\n").await;
            server
        });

        let fetched = conn.fetch("1", "(BODY[])").await.unwrap();
        assert_eq!(fetched[0].body.get("").unwrap(), b"Hello World");
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn append_sends_literal_after_continuation() {
        let (client, mut server) = duplex(8192);
        write_all(&mut server, b"* OK Ready\r\n").await;
        let conn = Connection::connect(client).await.unwrap();

        let message = b"22-byte-message-here!".to_vec();
        let header = format!("APPEND INBOX {{{}}}\r\n", message.len());
        let mut expected_body = message.clone();
        expected_body.extend_from_slice(b"\r\n");

        let server_task = tokio::spawn(async move {
            let req = read_until(&mut server, b"\r\n").await;
            assert!(String::from_utf8_lossy(&req).contains(&header));
            write_all(&mut server, b"+ Ready\r\n").await;
            let body = read_until(&mut server, b"\r\n").await;
            assert_eq!(body, expected_body);
            write_all(&mut server, b"A0001 OK [APPENDUID 38505 4001] APPEND completed\r\n").await;
            server
        });

        let result = conn.append("INBOX", None, None, message).await.unwrap();
        assert_eq!(result, Some((38505, 4001)));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn idle_then_exists_notification_then_done() {
        let (client, mut server) = duplex(8192);
        write_all(&mut server, b"* OK Ready\r\n").await;
        let conn = Connection::connect(client).await.unwrap();

        let server_task = tokio::spawn(async move {
            let _req = read_until(&mut server, b"\r\n").await;
            write_all(&mut server, b"+ idling\r\n").await;
            write_all(&mut server, b"* 11 EXISTS\r\n").await;
            let _done = read_until(&mut server, b"\r\n").await;
            write_all(&mut server, b"A0001 OK IDLE terminated\r\n").await;
            server
        });

        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        conn.idle(move |u| {
            if let Untagged::Exists(n) = u {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(n);
                }
            }
        })
        .await
        .unwrap();

        let n = rx.await.unwrap();
        assert_eq!(n, 11);
        let tagged = conn.idle_done().await.unwrap();
        assert_eq!(tagged.status, Status::Ok);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn copyuid_code_is_surfaced() {
        let (client, mut server) = duplex(8192);
        write_all(&mut server, b"* OK Ready\r\n").await;
        let conn = Connection::connect(client).await.unwrap();

        let server_task = tokio::spawn(async move {
            let _req = read_until(&mut server, b"\r\n").await;
            write_all(&mut server, b"A0001 OK [COPYUID 1 304,319:320 1:2] COPY completed\r\n").await;
            server
        });

        let result = conn.copy("304,319:320", "Archive").await.unwrap();
        assert_eq!(result, Some((1, "304,319:320".to_string(), "1:2".to_string())));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn store_reports_updated_flags_via_untagged_fetch() {
        let (client, mut server) = duplex(8192);
        write_all(&mut server, b"* OK Ready\r\n").await;
        let conn = Connection::connect(client).await.unwrap();

        let server_task = tokio::spawn(async move {
            let _req = read_until(&mut server, b"\r\n").await;
            write_all(&mut server, b"* 3 FETCH (FLAGS (\\Seen \\Flagged))\r\nA0001 OK STORE completed\r\n").await;
            server
        });

        let updated = conn.store("3", "+FLAGS (\\Flagged)").await.unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].flags, Some(vec!["seen".to_string(), "flagged".to_string()]));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn logout_rejects_further_commands() {
        let (client, mut server) = duplex(8192);
        write_all(&mut server, b"* OK Ready\r\n").await;
        let conn = Connection::connect(client).await.unwrap();

        let server_task = tokio::spawn(async move {
            let _req = read_until(&mut server, b"\r\n").await;
            write_all(&mut server, b"A0001 OK LOGOUT completed\r\n").await;
            server
        });

        conn.logout().await.unwrap();
        assert_eq!(conn.state().await, ConnectionState::Logout);
        let err = conn.noop().await.unwrap_err();
        assert!(matches!(err, ImapError::WrongPhase(_)));
        server_task.await.unwrap();
    }
}
