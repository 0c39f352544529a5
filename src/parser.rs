/*
 * parser.rs
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

//! Token stream to typed [`Response`] conversion (RFC 9051 §7).

use std::collections::BTreeMap;
use std::fmt;

use crate::content::rfc2047;
use crate::tokenizer::Token;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error: {}", self.0)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    Capability(Vec<String>),
    PermanentFlags(Vec<String>),
    UidNext(u32),
    UidValidity(u32),
    AppendUid(u32, u32),
    CopyUid(u32, String, String),
    ReadOnly,
    ReadWrite,
    TryCreate,
    UidNotSticky,
    Closed,
    Alert,
    Parse,
    AuthenticationFailed,
    AuthorizationFailed,
    Expired,
    PrivacyRequired,
    ContactAdmin,
    NoPerm,
    InUse,
    ExpungeIssued,
    OverQuota,
    AlreadyExists,
    NonExistent,
    Unavailable,
    ServerBug,
    ClientBug,
    Cannot,
    Limit,
    Corruption,
    HasChildren,
    NotSaved,
    UnknownCte,
    /// Unrecognized resp-text-code; name normalized (lowercase, `-` -> `_`), payload joined by spaces.
    Other(String, Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedResponse {
    pub tag: String,
    pub status: Status,
    pub code: Option<ResponseCode>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListEntry {
    pub flags: Vec<String>,
    pub delimiter: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusAttrs {
    pub messages: Option<u32>,
    pub recent: Option<u32>,
    pub unseen: Option<u32>,
    pub uid_next: Option<u32>,
    pub uid_validity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ESearch {
    pub tag: Option<String>,
    pub uid: bool,
    pub min: Option<u64>,
    pub max: Option<u64>,
    pub all: Option<String>,
    pub count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    pub name: Option<String>,
    pub adl: Option<String>,
    pub mailbox: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    pub date: Option<String>,
    pub subject: Option<String>,
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub in_reply_to: Option<String>,
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Disposition {
    pub kind: String,
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyStructure {
    pub type_: String,
    pub subtype: String,
    pub params: Vec<(String, String)>,
    pub id: Option<String>,
    pub description: Option<String>,
    pub encoding: String,
    pub size: u64,
    pub lines: Option<u64>,
    pub md5: Option<String>,
    pub disposition: Option<Disposition>,
    pub language: Option<Vec<String>>,
    pub location: Option<String>,
    pub envelope: Option<Envelope>,
    pub parts: Vec<BodyStructure>,
    pub extension: Vec<Token>,
}

impl BodyStructure {
    pub fn is_multipart(&self) -> bool {
        self.type_.eq_ignore_ascii_case("multipart")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchAttrs {
    pub flags: Option<Vec<String>>,
    pub uid: Option<u64>,
    pub internal_date: Option<String>,
    pub rfc822_size: Option<u64>,
    pub envelope: Option<Envelope>,
    pub body_structure: Option<BodyStructure>,
    pub body: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Untagged {
    Capability(Vec<String>),
    Exists(u32),
    Expunge(u32),
    Flags(Vec<String>),
    List(ListEntry),
    Status { name: String, attrs: StatusAttrs },
    ESearch(ESearch),
    Fetch { seq: u32, attrs: FetchAttrs },
    Bye(String),
    OkNoBad { status: Status, code: Option<ResponseCode>, text: String },
    PreAuth { code: Option<ResponseCode>, text: String },
    Enabled(Vec<String>),
    Unhandled(Vec<Token>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Tagged(TaggedResponse),
    Continuation { text: String, base64: Option<String> },
    Untagged(Untagged),
}

/// Parse a single complete response (one CRLF-terminated line's worth of tokens,
/// the trailing [`Token::Crlf`] included or not — both accepted).
pub fn parse_response(tokens: &[Token]) -> Result<Response, ParseError> {
    let tokens = strip_trailing_crlf(tokens);
    match tokens.first() {
        None => Err(ParseError("empty response".into())),
        Some(Token::Star) => Ok(Response::Untagged(parse_untagged(&tokens[1..])?)),
        Some(Token::Plus) => Ok(parse_continuation(&tokens[1..])),
        Some(Token::Atom(tag)) => Ok(Response::Tagged(parse_tagged(tag.clone(), &tokens[1..])?)),
        Some(other) => Err(ParseError(format!("unexpected leading token {other:?}"))),
    }
}

fn strip_trailing_crlf(tokens: &[Token]) -> &[Token] {
    match tokens.last() {
        Some(Token::Crlf) => &tokens[..tokens.len() - 1],
        _ => tokens,
    }
}

fn atom_str(t: &Token) -> Option<&str> {
    match t {
        Token::Atom(s) => Some(s.as_str()),
        _ => None,
    }
}

fn parse_tagged(tag: String, rest: &[Token]) -> Result<TaggedResponse, ParseError> {
    let status_str = atom_str(rest.first().ok_or_else(|| ParseError("missing status".into()))?)
        .ok_or_else(|| ParseError("status is not an atom".into()))?;
    let status = match status_str.to_ascii_uppercase().as_str() {
        "OK" => Status::Ok,
        "NO" => Status::No,
        "BAD" => Status::Bad,
        other => return Err(ParseError(format!("unknown status {other}"))),
    };
    let (code, text) = parse_resp_text(&rest[1..])?;
    Ok(TaggedResponse { tag, status, code, text })
}

fn parse_continuation(rest: &[Token]) -> Response {
    let text = join_text(rest);
    let base64 = if rest.len() == 1 {
        atom_str(&rest[0]).filter(|s| is_base64_shaped(s)).map(|s| s.to_string())
    } else {
        None
    };
    Response::Continuation { text, base64 }
}

fn is_base64_shaped(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    let (body, pad) = match s.find('=') {
        Some(idx) => (&s[..idx], &s[idx..]),
        None => (s, ""),
    };
    !body.is_empty()
        && body.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
        && pad.bytes().all(|b| b == b'=')
}

fn join_text(tokens: &[Token]) -> String {
    tokens.iter().map(token_text).collect::<Vec<_>>().join(" ")
}

fn token_text(t: &Token) -> String {
    match t {
        Token::Atom(s) => s.clone(),
        Token::Number(n) => n.to_string(),
        Token::QuotedString(s) => s.clone(),
        Token::Nil => "NIL".to_string(),
        Token::Flag(s) => format!("\\{s}"),
        Token::Star => "*".to_string(),
        Token::Plus => "+".to_string(),
        Token::LParen => "(".to_string(),
        Token::RParen => ")".to_string(),
        Token::LBracket => "[".to_string(),
        Token::RBracket => "]".to_string(),
        Token::Literal(b) => String::from_utf8_lossy(b).into_owned(),
        Token::Crlf => String::new(),
    }
}

/// Parse optional `[code]` then free text, per RFC 9051 resp-text.
fn parse_resp_text(tokens: &[Token]) -> Result<(Option<ResponseCode>, String), ParseError> {
    if tokens.first() == Some(&Token::LBracket) {
        let (code, consumed) = parse_resp_text_code(&tokens[1..])?;
        let text = join_text(&tokens[1 + consumed..]);
        Ok((Some(code), text.trim_start().to_string()))
    } else {
        Ok((None, join_text(tokens)))
    }
}

fn parse_resp_text_code(tokens: &[Token]) -> Result<(ResponseCode, usize), ParseError> {
    let name = atom_str(tokens.first().ok_or_else(|| ParseError("empty resp-text-code".into()))?)
        .ok_or_else(|| ParseError("resp-text-code name is not an atom".into()))?
        .to_ascii_uppercase();
    let mut i = 1usize;
    let code = match name.as_str() {
        "ALERT" => ResponseCode::Alert,
        "PARSE" => ResponseCode::Parse,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "UIDNOTSTICKY" => ResponseCode::UidNotSticky,
        "CLOSED" => ResponseCode::Closed,
        "AUTHENTICATIONFAILED" => ResponseCode::AuthenticationFailed,
        "AUTHORIZATIONFAILED" => ResponseCode::AuthorizationFailed,
        "EXPIRED" => ResponseCode::Expired,
        "PRIVACYREQUIRED" => ResponseCode::PrivacyRequired,
        "CONTACTADMIN" => ResponseCode::ContactAdmin,
        "NOPERM" => ResponseCode::NoPerm,
        "INUSE" => ResponseCode::InUse,
        "EXPUNGEISSUED" => ResponseCode::ExpungeIssued,
        "OVERQUOTA" => ResponseCode::OverQuota,
        "ALREADYEXISTS" => ResponseCode::AlreadyExists,
        "NONEXISTENT" => ResponseCode::NonExistent,
        "UNAVAILABLE" => ResponseCode::Unavailable,
        "SERVERBUG" => ResponseCode::ServerBug,
        "CLIENTBUG" => ResponseCode::ClientBug,
        "CANNOT" => ResponseCode::Cannot,
        "LIMIT" => ResponseCode::Limit,
        "CORRUPTION" => ResponseCode::Corruption,
        "HASCHILDREN" => ResponseCode::HasChildren,
        "NOTSAVED" => ResponseCode::NotSaved,
        "UNKNOWN-CTE" => ResponseCode::UnknownCte,
        "CAPABILITY" => {
            let mut list = Vec::new();
            while let Some(s) = tokens.get(i).and_then(atom_str) {
                list.push(s.to_string());
                i += 1;
            }
            ResponseCode::Capability(list)
        }
        "PERMANENTFLAGS" => {
            let (flags, used) = parse_flag_paren_list(&tokens[i..])?;
            i += used;
            ResponseCode::PermanentFlags(flags)
        }
        "UIDNEXT" => {
            let n = expect_number(tokens.get(i))?;
            i += 1;
            ResponseCode::UidNext(n as u32)
        }
        "UIDVALIDITY" => {
            let n = expect_number(tokens.get(i))?;
            i += 1;
            ResponseCode::UidValidity(n as u32)
        }
        "APPENDUID" => {
            let validity = expect_number(tokens.get(i))?;
            i += 1;
            let uid = expect_number(tokens.get(i))?;
            i += 1;
            ResponseCode::AppendUid(validity as u32, uid as u32)
        }
        "COPYUID" => {
            let validity = expect_number(tokens.get(i))?;
            i += 1;
            let src = collect_uid_set(tokens, &mut i);
            let dst = collect_uid_set(tokens, &mut i);
            ResponseCode::CopyUid(validity as u32, src, dst)
        }
        other => {
            let lowered = other.to_ascii_lowercase().replace('-', "_");
            let mut rest = Vec::new();
            while tokens.get(i).is_some() && tokens[i] != Token::RBracket {
                rest.push(token_text(&tokens[i]));
                i += 1;
            }
            let payload = if rest.is_empty() { None } else { Some(rest.join(" ")) };
            ResponseCode::Other(lowered, payload)
        }
    };
    if tokens.get(i) != Some(&Token::RBracket) {
        return Err(ParseError(format!("resp-text-code {name} not closed by ']'")));
    }
    i += 1;
    Ok((code, i))
}

fn expect_number(t: Option<&Token>) -> Result<u64, ParseError> {
    match t {
        Some(Token::Number(n)) => Ok(*n),
        other => Err(ParseError(format!("expected number, got {other:?}"))),
    }
}

/// Collect a uid-set token-run: digits/commas/colons/`*` concatenate into one string (§4.2.1).
fn collect_uid_set(tokens: &[Token], pos: &mut usize) -> String {
    let mut s = String::new();
    loop {
        match tokens.get(*pos) {
            Some(Token::Number(n)) => {
                s.push_str(&n.to_string());
                *pos += 1;
            }
            Some(Token::Star) => {
                s.push('*');
                *pos += 1;
            }
            Some(Token::Atom(a)) if a.starts_with(',') || a.starts_with(':') => {
                s.push_str(a);
                *pos += 1;
            }
            _ => break,
        }
    }
    s
}

fn normalize_system_flag(name: &str) -> String {
    match name {
        "Answered" => "answered".into(),
        "Flagged" => "flagged".into(),
        "Deleted" => "deleted".into(),
        "Seen" => "seen".into(),
        "Draft" => "draft".into(),
        "Recent" => "recent".into(),
        "*" => "wildcard".into(),
        "Noselect" => "noselect".into(),
        "HasChildren" => "haschildren".into(),
        "HasNoChildren" => "hasnochildren".into(),
        "Subscribed" => "subscribed".into(),
        "Drafts" => "drafts".into(),
        "Sent" => "sent".into(),
        "Trash" => "trash".into(),
        "Junk" => "junk".into(),
        "Archive" => "archive".into(),
        "All" => "all".into(),
        "Marked" => "marked".into(),
        "Unmarked" => "unmarked".into(),
        "Noinferiors" => "noinferiors".into(),
        "Remote" => "remote".into(),
        "NonExistent" => "nonexistent".into(),
        other => other.to_ascii_lowercase(),
    }
}

fn parse_flag_paren_list(tokens: &[Token]) -> Result<(Vec<String>, usize), ParseError> {
    if tokens.first() != Some(&Token::LParen) {
        return Err(ParseError("expected '(' starting flag list".into()));
    }
    let mut i = 1usize;
    let mut flags = Vec::new();
    loop {
        match tokens.get(i) {
            Some(Token::RParen) => {
                i += 1;
                break;
            }
            Some(Token::Flag(s)) => {
                flags.push(normalize_system_flag(s));
                i += 1;
            }
            Some(Token::Atom(s)) => {
                flags.push(s.clone());
                i += 1;
            }
            other => return Err(ParseError(format!("unexpected token in flag list: {other:?}"))),
        }
    }
    Ok((flags, i))
}

fn parse_untagged(rest: &[Token]) -> Result<Untagged, ParseError> {
    match rest.first() {
        Some(Token::Number(n)) => {
            let seq = *n as u32;
            match rest.get(1).and_then(atom_str).map(|s| s.to_ascii_uppercase()) {
                Some(ref kw) if kw == "EXISTS" => Ok(Untagged::Exists(seq)),
                Some(ref kw) if kw == "EXPUNGE" => Ok(Untagged::Expunge(seq)),
                Some(ref kw) if kw == "FETCH" => {
                    let (attrs, _) = parse_fetch_attrs(&rest[2..])?;
                    Ok(Untagged::Fetch { seq, attrs })
                }
                other => Err(ParseError(format!("unknown numbered untagged response: {other:?}"))),
            }
        }
        Some(Token::Atom(name)) => {
            let upper = name.to_ascii_uppercase();
            match upper.as_str() {
                "CAPABILITY" => {
                    let list = rest[1..].iter().filter_map(atom_str).map(String::from).collect();
                    Ok(Untagged::Capability(list))
                }
                "FLAGS" => {
                    let (flags, _) = parse_flag_paren_list(&rest[1..])?;
                    Ok(Untagged::Flags(flags))
                }
                "LIST" => parse_list(&rest[1..]),
                "STATUS" => parse_status(&rest[1..]),
                "ESEARCH" => parse_esearch(&rest[1..]),
                "BYE" => Ok(Untagged::Bye(join_text(&rest[1..]))),
                "OK" | "NO" | "BAD" => {
                    let status = match upper.as_str() {
                        "OK" => Status::Ok,
                        "NO" => Status::No,
                        _ => Status::Bad,
                    };
                    let (code, text) = parse_resp_text(&rest[1..])?;
                    Ok(Untagged::OkNoBad { status, code, text })
                }
                "PREAUTH" => {
                    let (code, text) = parse_resp_text(&rest[1..])?;
                    Ok(Untagged::PreAuth { code, text })
                }
                "ENABLED" => {
                    let list = rest[1..].iter().filter_map(atom_str).map(String::from).collect();
                    Ok(Untagged::Enabled(list))
                }
                _ => Ok(Untagged::Unhandled(rest.to_vec())),
            }
        }
        _ => Ok(Untagged::Unhandled(rest.to_vec())),
    }
}

fn token_as_string(t: Option<&Token>) -> Result<String, ParseError> {
    match t {
        Some(Token::QuotedString(s)) => Ok(s.clone()),
        Some(Token::Atom(s)) => Ok(s.clone()),
        other => Err(ParseError(format!("expected string, got {other:?}"))),
    }
}

fn parse_list(rest: &[Token]) -> Result<Untagged, ParseError> {
    let (flags, mut i) = parse_flag_paren_list(rest)?;
    let delimiter = match rest.get(i) {
        Some(Token::Nil) => {
            i += 1;
            None
        }
        Some(Token::QuotedString(s)) => {
            i += 1;
            Some(s.clone())
        }
        other => return Err(ParseError(format!("expected mailbox delimiter, got {other:?}"))),
    };
    let name = token_as_string(rest.get(i))?;
    Ok(Untagged::List(ListEntry { flags, delimiter, name }))
}

fn parse_status(rest: &[Token]) -> Result<Untagged, ParseError> {
    let name = token_as_string(rest.first())?;
    let mut i = 1usize;
    if rest.get(i) != Some(&Token::LParen) {
        return Err(ParseError("expected '(' in STATUS response".into()));
    }
    i += 1;
    let mut attrs = StatusAttrs::default();
    loop {
        match rest.get(i) {
            Some(Token::RParen) => {
                i += 1;
                break;
            }
            Some(Token::Atom(key)) => {
                let key = key.to_ascii_uppercase();
                let val = expect_number(rest.get(i + 1))? as u32;
                i += 2;
                match key.as_str() {
                    "MESSAGES" => attrs.messages = Some(val),
                    "RECENT" => attrs.recent = Some(val),
                    "UNSEEN" => attrs.unseen = Some(val),
                    "UIDNEXT" => attrs.uid_next = Some(val),
                    "UIDVALIDITY" => attrs.uid_validity = Some(val),
                    _ => {}
                }
            }
            other => return Err(ParseError(format!("unexpected token in STATUS attrs: {other:?}"))),
        }
    }
    let _ = i;
    Ok(Untagged::Status { name, attrs })
}

fn parse_esearch(rest: &[Token]) -> Result<Untagged, ParseError> {
    let mut i = 0usize;
    let mut out = ESearch::default();
    if rest.get(i) == Some(&Token::LParen) {
        // (TAG "x")
        i += 1;
        if let Some(Token::Atom(kw)) = rest.get(i) {
            if kw.eq_ignore_ascii_case("TAG") {
                i += 1;
                out.tag = Some(token_as_string(rest.get(i))?);
                i += 1;
            }
        }
        if rest.get(i) != Some(&Token::RParen) {
            return Err(ParseError("expected ')' closing ESEARCH correlator".into()));
        }
        i += 1;
    }
    if let Some(Token::Atom(kw)) = rest.get(i) {
        if kw.eq_ignore_ascii_case("UID") {
            out.uid = true;
            i += 1;
        }
    }
    loop {
        match rest.get(i).and_then(atom_str).map(|s| s.to_ascii_uppercase()) {
            Some(ref kw) if kw == "MIN" => {
                out.min = Some(expect_number(rest.get(i + 1))?);
                i += 2;
            }
            Some(ref kw) if kw == "MAX" => {
                out.max = Some(expect_number(rest.get(i + 1))?);
                i += 2;
            }
            Some(ref kw) if kw == "COUNT" => {
                out.count = Some(expect_number(rest.get(i + 1))?);
                i += 2;
            }
            Some(ref kw) if kw == "ALL" => {
                i += 1;
                out.all = Some(collect_uid_set(rest, &mut i));
            }
            _ => break,
        }
    }
    Ok(Untagged::ESearch(out))
}

fn skip_value(tokens: &[Token], pos: &mut usize) {
    match tokens.get(*pos) {
        Some(Token::LParen) => {
            let mut depth = 0i32;
            loop {
                match tokens.get(*pos) {
                    Some(Token::LParen) => {
                        depth += 1;
                        *pos += 1;
                    }
                    Some(Token::RParen) => {
                        depth -= 1;
                        *pos += 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    Some(_) => *pos += 1,
                    None => break,
                }
            }
        }
        Some(_) => *pos += 1,
        None => {}
    }
}

fn parse_fetch_attrs(rest: &[Token]) -> Result<(FetchAttrs, usize), ParseError> {
    if rest.first() != Some(&Token::LParen) {
        return Err(ParseError("expected '(' opening FETCH attribute list".into()));
    }
    let mut i = 1usize;
    let mut attrs = FetchAttrs::default();
    loop {
        match rest.get(i) {
            Some(Token::RParen) => {
                i += 1;
                break;
            }
            Some(Token::Atom(key)) => {
                let upper = key.to_ascii_uppercase();
                i += 1;
                match upper.as_str() {
                    "FLAGS" => {
                        let (flags, used) = parse_flag_paren_list(&rest[i..])?;
                        i += used;
                        attrs.flags = Some(flags);
                    }
                    "UID" => {
                        attrs.uid = Some(expect_number(rest.get(i))?);
                        i += 1;
                    }
                    "RFC822.SIZE" => {
                        attrs.rfc822_size = Some(expect_number(rest.get(i))?);
                        i += 1;
                    }
                    "INTERNALDATE" => {
                        attrs.internal_date = Some(token_as_string(rest.get(i))?);
                        i += 1;
                    }
                    "ENVELOPE" => {
                        let (env, used) = parse_envelope(&rest[i..])?;
                        i += used;
                        attrs.envelope = Some(env);
                    }
                    "BODYSTRUCTURE" => {
                        let (bs, used) = parse_body_structure(&rest[i..])?;
                        i += used;
                        attrs.body_structure = Some(bs);
                    }
                    "BODY" => {
                        if rest.get(i) == Some(&Token::LBracket) {
                            let (section_key, used) = parse_section_key(&rest[i..])?;
                            i += used;
                            let value = parse_nstring_bytes(rest.get(i))?;
                            i += 1;
                            attrs.body.insert(section_key, value);
                        } else {
                            let (bs, used) = parse_body_structure(&rest[i..])?;
                            i += used;
                            attrs.body_structure = Some(bs);
                        }
                    }
                    _ => skip_value(rest, &mut i),
                }
            }
            other => return Err(ParseError(format!("unexpected token in FETCH attrs: {other:?}"))),
        }
    }
    Ok((attrs, i))
}

fn parse_section_key(rest: &[Token]) -> Result<(String, usize), ParseError> {
    if rest.first() != Some(&Token::LBracket) {
        return Err(ParseError("expected '[' opening BODY section".into()));
    }
    let mut i = 1usize;
    let mut key = String::new();
    loop {
        match rest.get(i) {
            Some(Token::RBracket) => {
                i += 1;
                break;
            }
            Some(Token::LParen) => {
                key.push_str(" (");
                let mut depth = 1i32;
                i += 1;
                let mut first = true;
                while depth > 0 {
                    match rest.get(i) {
                        Some(Token::LParen) => {
                            depth += 1;
                            i += 1;
                        }
                        Some(Token::RParen) => {
                            depth -= 1;
                            i += 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        Some(t) => {
                            if !first {
                                key.push(' ');
                            }
                            key.push_str(&token_text(t));
                            first = false;
                            i += 1;
                        }
                        None => break,
                    }
                }
                key.push(')');
            }
            Some(t) => {
                key.push_str(&token_text(t));
                i += 1;
            }
            None => return Err(ParseError("unterminated BODY section".into())),
        }
    }
    if let Some(Token::Atom(partial)) = rest.get(i) {
        if partial.starts_with('<') && partial.ends_with('>') {
            key.push_str(partial);
            i += 1;
        }
    }
    Ok((key, i))
}

fn parse_nstring_bytes(t: Option<&Token>) -> Result<Vec<u8>, ParseError> {
    match t {
        Some(Token::Nil) => Ok(Vec::new()),
        Some(Token::QuotedString(s)) => Ok(s.clone().into_bytes()),
        Some(Token::Literal(b)) => Ok(b.clone()),
        other => Err(ParseError(format!("expected nstring/literal, got {other:?}"))),
    }
}

fn parse_nstring_opt(rest: &[Token], pos: &mut usize, decode_rfc2047: bool) -> Result<Option<String>, ParseError> {
    let value = match rest.get(*pos) {
        Some(Token::Nil) => {
            *pos += 1;
            None
        }
        Some(Token::QuotedString(s)) => {
            *pos += 1;
            Some(s.clone())
        }
        Some(Token::Literal(b)) => {
            *pos += 1;
            Some(String::from_utf8_lossy(b).into_owned())
        }
        other => return Err(ParseError(format!("expected nstring, got {other:?}"))),
    };
    Ok(match value {
        Some(s) if decode_rfc2047 => Some(rfc2047::decode_encoded_words(&s)),
        other => other,
    })
}

fn parse_envelope(rest: &[Token]) -> Result<(Envelope, usize), ParseError> {
    if rest.first() != Some(&Token::LParen) {
        return Err(ParseError("expected '(' opening ENVELOPE".into()));
    }
    let mut i = 1usize;
    let mut env = Envelope::default();
    env.date = parse_nstring_opt(rest, &mut i, false)?;
    env.subject = parse_nstring_opt(rest, &mut i, true)?;
    env.from = parse_address_list(rest, &mut i)?;
    env.sender = parse_address_list(rest, &mut i)?;
    env.reply_to = parse_address_list(rest, &mut i)?;
    env.to = parse_address_list(rest, &mut i)?;
    env.cc = parse_address_list(rest, &mut i)?;
    env.bcc = parse_address_list(rest, &mut i)?;
    env.in_reply_to = parse_nstring_opt(rest, &mut i, false)?;
    env.message_id = parse_nstring_opt(rest, &mut i, false)?;
    if rest.get(i) != Some(&Token::RParen) {
        return Err(ParseError("expected ')' closing ENVELOPE".into()));
    }
    i += 1;
    Ok((env, i))
}

fn parse_address_list(rest: &[Token], pos: &mut usize) -> Result<Vec<Address>, ParseError> {
    match rest.get(*pos) {
        Some(Token::Nil) => {
            *pos += 1;
            Ok(Vec::new())
        }
        Some(Token::LParen) => {
            *pos += 1;
            let mut addrs = Vec::new();
            loop {
                match rest.get(*pos) {
                    Some(Token::RParen) => {
                        *pos += 1;
                        break;
                    }
                    Some(Token::LParen) => {
                        addrs.push(parse_address(rest, pos)?);
                    }
                    other => return Err(ParseError(format!("expected address, got {other:?}"))),
                }
            }
            Ok(addrs)
        }
        other => Err(ParseError(format!("expected address-list, got {other:?}"))),
    }
}

fn parse_address(rest: &[Token], pos: &mut usize) -> Result<Address, ParseError> {
    if rest.get(*pos) != Some(&Token::LParen) {
        return Err(ParseError("expected '(' opening address".into()));
    }
    *pos += 1;
    let name = parse_nstring_opt(rest, pos, true)?;
    let adl = parse_nstring_opt(rest, pos, false)?;
    let mailbox = parse_nstring_opt(rest, pos, false)?;
    let host = parse_nstring_opt(rest, pos, false)?;
    if rest.get(*pos) != Some(&Token::RParen) {
        return Err(ParseError("expected ')' closing address".into()));
    }
    *pos += 1;
    Ok(Address { name, adl, mailbox, host })
}

fn parse_param_list(rest: &[Token], pos: &mut usize) -> Result<Vec<(String, String)>, ParseError> {
    match rest.get(*pos) {
        Some(Token::Nil) => {
            *pos += 1;
            Ok(Vec::new())
        }
        Some(Token::LParen) => {
            *pos += 1;
            let mut params = Vec::new();
            loop {
                match rest.get(*pos) {
                    Some(Token::RParen) => {
                        *pos += 1;
                        break;
                    }
                    _ => {
                        let k = token_as_string(rest.get(*pos))?;
                        *pos += 1;
                        let v = token_as_string(rest.get(*pos))?;
                        *pos += 1;
                        params.push((k, v));
                    }
                }
            }
            Ok(params)
        }
        other => Err(ParseError(format!("expected param-list, got {other:?}"))),
    }
}

fn collect_until_matching_rparen(tokens: &[Token]) -> (Vec<Token>, usize) {
    let mut depth = 0i32;
    let mut i = 0usize;
    let mut collected = Vec::new();
    loop {
        match tokens.get(i) {
            Some(Token::LParen) => {
                depth += 1;
                collected.push(Token::LParen);
                i += 1;
            }
            Some(Token::RParen) => {
                i += 1;
                if depth == 0 {
                    break;
                }
                depth -= 1;
                collected.push(Token::RParen);
            }
            Some(t) => {
                collected.push(t.clone());
                i += 1;
            }
            None => break,
        }
    }
    (collected, i)
}

/// Parses one BodyStructure starting at an opening `(` through its matching `)`.
fn parse_body_structure(tokens: &[Token]) -> Result<(BodyStructure, usize), ParseError> {
    if tokens.first() != Some(&Token::LParen) {
        return Err(ParseError("expected '(' opening body structure".into()));
    }
    let mut i = 1usize;
    if tokens.get(i) == Some(&Token::LParen) {
        let mut parts = Vec::new();
        while tokens.get(i) == Some(&Token::LParen) {
            let (part, used) = parse_body_structure(&tokens[i..])?;
            parts.push(part);
            i += used;
        }
        let subtype = token_as_string(tokens.get(i))?;
        i += 1;
        let (extension, used) = collect_until_matching_rparen(&tokens[i..]);
        i += used;
        Ok((
            BodyStructure {
                type_: "multipart".into(),
                subtype,
                params: Vec::new(),
                id: None,
                description: None,
                encoding: String::new(),
                size: 0,
                lines: None,
                md5: None,
                disposition: None,
                language: None,
                location: None,
                envelope: None,
                parts,
                extension,
            },
            i,
        ))
    } else {
        let type_ = token_as_string(tokens.get(i))?;
        i += 1;
        let subtype = token_as_string(tokens.get(i))?;
        i += 1;
        let params = parse_param_list(tokens, &mut i)?;
        let id = parse_nstring_opt(tokens, &mut i, false)?;
        let description = parse_nstring_opt(tokens, &mut i, false)?;
        let encoding = token_as_string(tokens.get(i))?;
        i += 1;
        let size = expect_number(tokens.get(i))?;
        i += 1;
        let lines = if type_.eq_ignore_ascii_case("text") {
            let n = expect_number(tokens.get(i))?;
            i += 1;
            Some(n)
        } else {
            None
        };
        let (extension, used) = collect_until_matching_rparen(&tokens[i..]);
        i += used;
        Ok((
            BodyStructure {
                type_,
                subtype,
                params,
                id,
                description,
                encoding,
                size,
                lines,
                md5: None,
                disposition: None,
                language: None,
                location: None,
                envelope: None,
                parts: Vec::new(),
                extension,
            },
            i,
        ))
    }
}
