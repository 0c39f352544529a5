/*
 * imap_integration.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Integration test for the IMAP connection engine. Drives a Connection over an
 * in-memory duplex pair standing in for a real socket, feeding scripted server
 * byte sequences and asserting on the values the engine returns.
 *
 * Run with:
 *   cargo test -p tagliacarte_imap --test imap_integration
 */

use tagliacarte_imap::connection::{Connection, ConnectionState};
use tagliacarte_imap::error::ImapError;
use tagliacarte_imap::parser::Untagged;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;

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
async fn full_session_login_select_fetch_logout() {
    let (client, mut server) = duplex(16384);
    write_all(&mut server, b"* OK [CAPABILITY IMAP4rev2 AUTH=PLAIN IDLE] Ready\r\n").await;
    let conn = Connection::connect(client).await.unwrap();
    assert_eq!(conn.state().await, ConnectionState::NotAuthenticated);

    let server_task = tokio::spawn(async move {
        let _login = read_until(&mut server, b"\r\n").await;
        write_all(&mut server, b"A0001 OK LOGIN completed\r\n").await;

        let _select = read_until(&mut server, b"\r\n").await;
        write_all(
            &mut server,
            b"* 172 EXISTS\r\n* FLAGS (\\Answered \\Seen)\r\nA0002 OK [READ-WRITE] SELECT completed\r\n",
        )
        .await;

        let _fetch = read_until(&mut server, b"\r\n").await;
        write_all(&mut server, b"* 12 FETCH (FLAGS (\\Seen) UID 4827)\r\nA0003 OK FETCH completed\r\n").await;

        let _logout = read_until(&mut server, b"\r\n").await;
        write_all(&mut server, b"* BYE logging out\r\nA0004 OK LOGOUT completed\r\n").await;
        server
    });

    conn.login("user", "pass").await.unwrap();
    assert_eq!(conn.state().await, ConnectionState::Authenticated);

    conn.select("INBOX").await.unwrap();
    assert_eq!(conn.state().await, ConnectionState::Selected);
    assert_eq!(conn.mailbox_info().await.exists, 172);

    let fetched = conn.fetch("12", "(FLAGS UID)").await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].uid, Some(4827));
    assert_eq!(fetched[0].flags, Some(vec!["seen".to_string()]));

    conn.logout().await.unwrap();
    assert_eq!(conn.state().await, ConnectionState::Logout);

    server_task.await.unwrap();
}

#[tokio::test]
async fn authenticate_xoauth2_sends_base64_initial_response() {
    let (client, mut server) = duplex(8192);
    write_all(&mut server, b"* OK [CAPABILITY IMAP4rev2 AUTH=XOAUTH2] Ready\r\n").await;
    let conn = Connection::connect(client).await.unwrap();

    let server_task = tokio::spawn(async move {
        let req = read_until(&mut server, b"\r\n").await;
        let line = String::from_utf8_lossy(&req);
        assert!(line.starts_with("A0001 AUTHENTICATE XOAUTH2 "));
        write_all(&mut server, b"A0001 OK AUTHENTICATE completed\r\n").await;
        server
    });

    conn.authenticate_xoauth2("user@example.com", "ya29.sometoken").await.unwrap();
    assert_eq!(conn.state().await, ConnectionState::Authenticated);
    server_task.await.unwrap();
}

#[tokio::test]
async fn tagged_no_is_localized_to_the_triggering_command() {
    let (client, mut server) = duplex(8192);
    write_all(&mut server, b"* OK Ready\r\n").await;
    let conn = Connection::connect(client).await.unwrap();

    let server_task = tokio::spawn(async move {
        let _req = read_until(&mut server, b"\r\n").await;
        write_all(&mut server, b"A0001 NO [TRYCREATE] Mailbox does not exist\r\n").await;
        server
    });

    let err = conn.select("NoSuchBox").await.unwrap_err();
    assert!(matches!(err, ImapError::TaggedNo(_)));
    assert_eq!(conn.state().await, ConnectionState::NotAuthenticated);
    server_task.await.unwrap();
}

#[tokio::test]
async fn transport_closure_fails_every_outstanding_command() {
    let (client, server) = duplex(8192);
    drop(tokio::spawn(async move {
        let mut server = server;
        write_all(&mut server, b"* OK Ready\r\n").await;
        server
    }));
    let conn = Connection::connect(client).await.unwrap();

    // No response will ever arrive for this NOOP; the transport is dropped instead.
    let conn2 = conn.clone();
    let pending = tokio::spawn(async move { conn2.noop().await });

    // Give the read loop a chance to observe EOF once the server half is dropped.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let result = pending.await.unwrap();
    assert!(matches!(result, Err(ImapError::ConnectionClosed(_))));
}

#[tokio::test]
async fn idle_delivers_exists_then_completes_on_done() {
    let (client, mut server) = duplex(8192);
    write_all(&mut server, b"* OK Ready\r\n").await;
    let conn = Connection::connect(client).await.unwrap();

    let server_task = tokio::spawn(async move {
        let _idle = read_until(&mut server, b"\r\n").await;
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

    assert_eq!(rx.await.unwrap(), 11);
    let tagged = conn.idle_done().await.unwrap();
    assert_eq!(tagged.text, "IDLE terminated");
    server_task.await.unwrap();
}
