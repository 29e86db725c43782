//! IRC client against a scripted fake server on a local listener.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keyrc_core::config::IrcConfig;
use keyrc_core::error::ConnectError;
use keyrc_core::relay::channels::irc;
use keyrc_core::relay::event::InboundEvent;
use keyrc_core::relay::transport::{InboundSink, IrcTransport};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Server side of one accepted connection.
struct FakeServer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl FakeServer {
    async fn accept(listener: TcpListener) -> Self {
        let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        let (read, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn recv(&mut self) -> String {
        timeout(WAIT, self.lines.next_line())
            .await
            .expect("client line")
            .unwrap()
            .expect("connection open")
    }

    async fn expect(&mut self, line: &str) {
        assert_eq!(self.recv().await, line);
    }

    async fn send(&mut self, raw: &str) {
        self.writer.write_all(raw.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
    }
}

async fn listen() -> (TcpListener, IrcConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = IrcConfig {
        server: listener.local_addr().unwrap().to_string(),
        ..Default::default()
    };
    (listener, config)
}

struct ChannelSink(mpsc::UnboundedSender<InboundEvent>);

#[async_trait]
impl InboundSink for ChannelSink {
    async fn deliver(&self, event: InboundEvent) {
        let _ = self.0.send(event);
    }
}

#[tokio::test]
async fn registers_relays_and_answers_pings() {
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let mut srv = FakeServer::accept(listener).await;
        srv.expect("NICK keyrcbot").await;
        srv.expect("USER keyrcbot 0 * keyrcbot").await;
        srv.send(":irc.test 001 keyrcbot :Welcome").await;
        srv.send("PING :tok").await;
        srv.send(":bob!b@h PRIVMSG #random :yo").await;
        srv.send(":bob!b@h PRIVMSG keyrcbot :private").await;
        srv.send(":bob!b@h PRIVMSG #random :\x01ACTION waves\x01").await;
        let mut got = Vec::new();
        for _ in 0..4 {
            got.push(srv.recv().await);
        }
        got
    });

    let (handle, event_loop) = timeout(WAIT, irc::connect(&config)).await.unwrap().unwrap();
    assert_eq!(handle.nick(), "keyrcbot");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let run = tokio::spawn(event_loop.run(Arc::new(ChannelSink(tx))));

    let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, InboundEvent::irc("#random", "bob", "yo"));
    let second = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(second.text, "* waves");

    handle.join("#random").await.unwrap();
    handle.send("#random", "[alice]: hi there\n[alice]: again").await.unwrap();

    let got = server.await.unwrap();
    assert!(got.contains(&"PONG tok".to_string()), "{:?}", got);
    let rest: Vec<_> = got.iter().filter(|l| *l != "PONG tok").cloned().collect();
    assert_eq!(
        rest,
        vec![
            "JOIN #random",
            "PRIVMSG #random :[alice]: hi there",
            "PRIVMSG #random :[alice]: again"
        ]
    );

    // Server dropped the connection: the loop ends cleanly.
    assert!(timeout(WAIT, run).await.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn authenticates_with_sasl_plain() {
    let (listener, mut config) = listen().await;
    config.password = Some("pw".into());
    let server = tokio::spawn(async move {
        let mut srv = FakeServer::accept(listener).await;
        srv.expect("CAP REQ sasl").await;
        srv.expect("NICK keyrcbot").await;
        srv.expect("USER keyrcbot 0 * keyrcbot").await;
        srv.send(":irc.test CAP * ACK :sasl").await;
        srv.expect("AUTHENTICATE PLAIN").await;
        srv.send("AUTHENTICATE +").await;
        srv.expect("AUTHENTICATE AGtleXJjYm90AHB3").await;
        srv.send(":irc.test 903 keyrcbot :SASL authentication successful").await;
        srv.expect("CAP END").await;
        srv.send(":irc.test 001 keyrcbot :Welcome").await;
        srv
    });

    let connected = timeout(WAIT, irc::connect(&config)).await.unwrap();
    assert!(connected.is_ok(), "{:?}", connected.err());
    let _srv = server.await.unwrap();
}

#[tokio::test]
async fn sasl_failure_is_fatal() {
    let (listener, mut config) = listen().await;
    config.password = Some("wrong".into());
    let server = tokio::spawn(async move {
        let mut srv = FakeServer::accept(listener).await;
        for _ in 0..3 {
            srv.recv().await;
        }
        srv.send(":irc.test CAP * ACK :sasl").await;
        srv.expect("AUTHENTICATE PLAIN").await;
        srv.send("AUTHENTICATE +").await;
        srv.recv().await;
        srv.send(":irc.test 904 keyrcbot :SASL authentication failed").await;
        srv
    });

    let result = timeout(WAIT, irc::connect(&config)).await.unwrap();
    assert!(matches!(result, Err(ConnectError::SaslFailed(_))));
    let _srv = server.await.unwrap();
}

#[tokio::test]
async fn nick_in_use_is_fatal() {
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let mut srv = FakeServer::accept(listener).await;
        srv.expect("NICK keyrcbot").await;
        srv.recv().await;
        srv.send("PING :early").await;
        srv.expect("PONG early").await;
        srv.send(":irc.test 433 * keyrcbot :Nickname is already in use").await;
        srv
    });

    let result = timeout(WAIT, irc::connect(&config)).await.unwrap();
    assert!(matches!(result, Err(ConnectError::NickInUse(ref n)) if n == "keyrcbot"));
    let _srv = server.await.unwrap();
}

#[tokio::test]
async fn closed_during_registration() {
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let mut srv = FakeServer::accept(listener).await;
        srv.expect("NICK keyrcbot").await;
    });

    let result = timeout(WAIT, irc::connect(&config)).await.unwrap();
    server.await.unwrap();
    assert!(matches!(result, Err(ConnectError::Closed)));
}

#[tokio::test]
async fn handle_uses_the_nick_confirmed_by_the_server() {
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let mut srv = FakeServer::accept(listener).await;
        srv.expect("NICK keyrcbot").await;
        srv.recv().await;
        srv.send(":irc.test 001 keyrcbo :Welcome, nick truncated").await;
        srv.expect("PRIVMSG #random :[alice]: hi").await;
        srv
    });

    let (handle, _event_loop) = timeout(WAIT, irc::connect(&config)).await.unwrap().unwrap();
    assert_eq!(handle.nick(), "keyrcbo");

    handle.send("#random", "[alice]: hi").await.unwrap();
    let _srv = timeout(WAIT, server).await.unwrap().unwrap();
}
