//! IRC transport: one client connection, plain TCP or TLS.
//!
//! `connect` registers (optionally with SASL PLAIN) and returns a cloneable [`IrcHandle`]
//! for writes plus the [`IrcEventLoop`] that owns the read side. All writes go through one
//! writer task fed by an mpsc queue, so joins and sends from either loop never interleave.

pub mod line;

use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use self::line::{IrcCodec, IrcLine};
use crate::config::IrcConfig;
use crate::error::{ConnectError, TransportError};
use crate::relay::event::InboundEvent;
use crate::relay::transport::{chunk_message, InboundSink, IrcTransport, SendError};

/// Text bytes per PRIVMSG. Leaves room for the command, target and the prefix the server adds.
pub const IRC_MAX_TEXT_LEN: usize = 400;

/// SASL AUTHENTICATE payloads are sent in chunks of this size.
const SASL_CHUNK_LEN: usize = 400;

const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(60);
const WRITE_QUEUE_LEN: usize = 256;

trait IrcStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> IrcStream for T {}

type BoxedStream = Box<dyn IrcStream>;
type LineReader = FramedRead<ReadHalf<BoxedStream>, IrcCodec>;
type LineWriter = FramedWrite<WriteHalf<BoxedStream>, IrcCodec>;

/// Write side of the connection. Implements [`IrcTransport`].
#[derive(Clone)]
pub struct IrcHandle {
    nick: String,
    tx: mpsc::Sender<IrcLine>,
}

impl IrcHandle {
    pub async fn send_line(&self, line: IrcLine) -> Result<(), SendError> {
        self.tx.send(line).await.map_err(|_| SendError::NotConnected)
    }
}

#[async_trait]
impl IrcTransport for IrcHandle {
    fn nick(&self) -> &str {
        &self.nick
    }

    async fn join(&self, channel: &str) -> Result<(), SendError> {
        self.send_line(IrcLine::join(channel)).await
    }

    async fn send(&self, channel: &str, text: &str) -> Result<(), SendError> {
        for line in split_for_irc(text) {
            self.send_line(IrcLine::privmsg(channel, &line)).await?;
        }
        Ok(())
    }
}

/// One PRIVMSG body per line of `text`, each at most [`IRC_MAX_TEXT_LEN`] bytes. Blank lines are skipped.
pub fn split_for_irc(text: &str) -> Vec<String> {
    text.lines()
        .flat_map(|l| chunk_message(l, IRC_MAX_TEXT_LEN))
        .map(|c| c.trim_end().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Read side of the connection. Drives PING/PONG and turns channel messages into events.
pub struct IrcEventLoop {
    reader: LineReader,
    handle: IrcHandle,
}

impl IrcEventLoop {
    /// Run until the server closes the connection. Each channel message is delivered to
    /// `sink` before the next line is read.
    pub async fn run(mut self, sink: Arc<dyn InboundSink>) -> Result<(), TransportError> {
        while let Some(item) = self.reader.next().await {
            let line = item?;
            match line.command.as_str() {
                "PING" => {
                    let token = line.param(0).unwrap_or_default();
                    if self.handle.send_line(IrcLine::pong(token)).await.is_err() {
                        return Err(TransportError::Other("writer closed".into()));
                    }
                }
                "PRIVMSG" => {
                    if let Some(event) = channel_message(&line) {
                        sink.deliver(event).await;
                    }
                }
                "JOIN" if line.sender_nick() == Some(self.handle.nick.as_str()) => {
                    info!(platform = "irc", channel = line.param(0).unwrap_or_default(), "joined");
                }
                "KICK" if line.param(1) == Some(self.handle.nick.as_str()) => {
                    warn!(
                        platform = "irc",
                        channel = line.param(0).unwrap_or_default(),
                        reason = line.param(2).unwrap_or_default(),
                        "kicked"
                    );
                }
                "ERROR" => {
                    warn!(platform = "irc", reason = line.param(0).unwrap_or_default(), "server closed the link");
                    break;
                }
                _ => match line.numeric() {
                    // ERR_NOSUCHCHANNEL .. ERR_BADCHANNELKEY, ERR_CANNOTSENDTOCHAN
                    Some(403 | 404 | 405 | 471 | 473 | 474 | 475 | 477) => {
                        warn!(platform = "irc", code = %line.command, params = ?line.params, "channel error");
                    }
                    _ => {}
                },
            }
        }
        Ok(())
    }
}

/// Channel PRIVMSG as an inbound event. CTCP ACTION becomes `* text`; other CTCP and
/// private messages are ignored.
pub fn channel_message(line: &IrcLine) -> Option<InboundEvent> {
    let target = line.param(0)?;
    if !target.starts_with(['#', '&']) {
        return None;
    }
    let sender = line.sender_nick()?;
    let mut text = line.param(1).unwrap_or_default().to_string();
    if let Some(ctcp) = text.strip_prefix('\x01') {
        let ctcp = ctcp.strip_suffix('\x01').unwrap_or(ctcp);
        let action = ctcp.strip_prefix("ACTION ")?;
        text = format!("* {}", action);
    }
    Some(InboundEvent::irc(target, sender, text))
}

/// Base64 `\0account\0password`, split into AUTHENTICATE-sized pieces. A payload that is an
/// exact multiple of the chunk size is terminated with `+`.
pub fn sasl_plain_payload(account: &str, password: &str) -> Vec<String> {
    let encoded = BASE64.encode(format!("\0{}\0{}", account, password));
    let mut chunks: Vec<String> = encoded
        .as_bytes()
        .chunks(SASL_CHUNK_LEN)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect();
    if encoded.len() % SASL_CHUNK_LEN == 0 {
        chunks.push("+".to_string());
    }
    chunks
}

/// Connect and register. Returns once the server has sent RPL_WELCOME; the handle carries
/// the nick the server confirmed there.
pub async fn connect(config: &IrcConfig) -> Result<(IrcHandle, IrcEventLoop), ConnectError> {
    let stream = open_stream(config).await?;
    let (read, write) = tokio::io::split(stream);
    let mut reader = FramedRead::new(read, IrcCodec::new());
    let mut writer = FramedWrite::new(write, IrcCodec::new());

    let nick = tokio::time::timeout(REGISTRATION_TIMEOUT, register(config, &mut reader, &mut writer))
        .await
        .map_err(|_| ConnectError::Timeout)??;
    if nick != config.nick {
        warn!(platform = "irc", requested = %config.nick, nick = %nick, "server assigned a different nick");
    }
    info!(platform = "irc", server = %config.server, nick = %nick, "registered");

    let (tx, rx) = mpsc::channel(WRITE_QUEUE_LEN);
    tokio::spawn(run_writer(writer, rx));
    let handle = IrcHandle { nick, tx };
    let event_loop = IrcEventLoop {
        reader,
        handle: handle.clone(),
    };
    Ok((handle, event_loop))
}

async fn run_writer(mut writer: LineWriter, mut rx: mpsc::Receiver<IrcLine>) {
    while let Some(line) = rx.recv().await {
        debug!(platform = "irc", direction = "outgoing", command = %line.command);
        if let Err(e) = writer.send(line).await {
            error!(platform = "irc", error = %e, "write failed; closing writer");
            break;
        }
    }
}

async fn write(writer: &mut LineWriter, line: IrcLine) -> Result<(), ConnectError> {
    writer.send(line).await.map_err(|_| ConnectError::Closed)
}

async fn register(
    config: &IrcConfig,
    reader: &mut LineReader,
    writer: &mut LineWriter,
) -> Result<String, ConnectError> {
    let sasl = config.sasl_credentials();
    if sasl.is_some() {
        write(writer, IrcLine::new("CAP", ["REQ", "sasl"])).await?;
    }
    write(writer, IrcLine::nick(&config.nick)).await?;
    write(writer, IrcLine::user(config.username(), config.realname())).await?;

    while let Some(item) = reader.next().await {
        let line = item.map_err(|_| ConnectError::Closed)?;
        match (line.command.as_str(), line.numeric()) {
            ("PING", _) => {
                write(writer, IrcLine::pong(line.param(0).unwrap_or_default())).await?;
            }
            ("CAP", _) => match (line.param(1), sasl) {
                (Some("ACK"), Some(_)) => {
                    write(writer, IrcLine::new("AUTHENTICATE", ["PLAIN"])).await?;
                }
                (Some("NAK"), Some(_)) => {
                    return Err(ConnectError::SaslFailed("server does not offer sasl".into()));
                }
                _ => {}
            },
            ("AUTHENTICATE", _) if line.param(0) == Some("+") => {
                if let Some((account, password)) = sasl {
                    for chunk in sasl_plain_payload(account, password) {
                        write(writer, IrcLine::new("AUTHENTICATE", [chunk])).await?;
                    }
                }
            }
            // RPL_SASLSUCCESS
            (_, Some(903)) => {
                info!(platform = "irc", "SASL authentication succeeded");
                write(writer, IrcLine::new("CAP", ["END"])).await?;
            }
            // ERR_NICKLOCKED, ERR_SASLFAIL, ERR_SASLTOOLONG, ERR_SASLABORTED
            (_, Some(code @ (902 | 904 | 905 | 906))) => {
                let reason = line.params.last().cloned().unwrap_or_default();
                return Err(ConnectError::SaslFailed(format!("{} {}", code, reason)));
            }
            // RPL_WELCOME, first param is our nick as the server knows it
            (_, Some(1)) => return Ok(welcome_nick(&line).unwrap_or(config.nick.as_str()).to_string()),
            // ERR_NICKNAMEINUSE, ERR_NICKCOLLISION
            (_, Some(433 | 436)) => return Err(ConnectError::NickInUse(config.nick.clone())),
            // ERR_ERRONEUSNICKNAME, ERR_YOUREBANNEDCREEP
            (_, Some(code @ (432 | 465))) => {
                let reason = line.params.last().cloned().unwrap_or_default();
                return Err(ConnectError::Rejected(format!("{} {}", code, reason)));
            }
            ("ERROR", _) => {
                return Err(ConnectError::Rejected(line.param(0).unwrap_or_default().to_string()));
            }
            _ => {}
        }
    }
    Err(ConnectError::Closed)
}

fn welcome_nick(line: &IrcLine) -> Option<&str> {
    line.param(0).filter(|n| !n.is_empty() && *n != "*")
}

async fn open_stream(config: &IrcConfig) -> Result<BoxedStream, ConnectError> {
    let tcp = TcpStream::connect(&config.server)
        .await
        .map_err(|source| ConnectError::Io {
            server: config.server.clone(),
            source,
        })?;
    if !config.tls {
        return Ok(Box::new(tcp));
    }
    let connector = tls_connector()?;
    let server_name = rustls::pki_types::ServerName::try_from(config.host().to_string())
        .map_err(|e| ConnectError::Tls(format!("server name {}: {}", config.host(), e)))?;
    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|source| ConnectError::Io {
            server: config.server.clone(),
            source,
        })?;
    Ok(Box::new(tls))
}

/// Install rustls default crypto provider once (required by rustls 0.22+ before any TLS use).
fn ensure_rustls_provider() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        // Err only means another provider was installed first.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

fn tls_connector() -> Result<tokio_rustls::TlsConnector, ConnectError> {
    ensure_rustls_provider();
    let mut roots = rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!(platform = "irc", error = %e, "skipping unreadable root certificates");
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    debug!(platform = "irc", added, ignored, "loaded native root certificates");
    if roots.is_empty() {
        return Err(ConnectError::Tls("no usable native root certificates".into()));
    }
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(tokio_rustls::TlsConnector::from(Arc::new(config)))
}
