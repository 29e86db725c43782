//! IRC protocol lines and the tokio codec that frames them.
//! Only what the bridge needs: prefix, command and params. Message tags are skipped.

use std::fmt;
use std::io;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Longest line accepted from the server, tags included (IRCv3 allows 8191 bytes of tags + 512).
pub const MAX_LINE_LEN: usize = 8191 + 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcLine {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcLine {
    pub fn new<I, S>(command: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: None,
            command: command.to_string(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    pub fn nick(nick: &str) -> Self {
        Self::new("NICK", [nick])
    }

    pub fn user(username: &str, realname: &str) -> Self {
        Self::new("USER", [username, "0", "*", realname])
    }

    pub fn join(channel: &str) -> Self {
        Self::new("JOIN", [channel])
    }

    pub fn privmsg(target: &str, text: &str) -> Self {
        Self::new("PRIVMSG", [target, text])
    }

    pub fn pong(token: &str) -> Self {
        Self::new("PONG", [token])
    }

    /// Parse one line without its CRLF. None for blank lines or lines without a command.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        if let Some(tagged) = rest.strip_prefix('@') {
            rest = tagged.split_once(' ').map_or("", |(_, r)| r);
        }
        rest = rest.trim_start_matches(' ');

        let mut prefix = None;
        if let Some(prefixed) = rest.strip_prefix(':') {
            let (p, r) = prefixed.split_once(' ')?;
            prefix = Some(p.to_string());
            rest = r.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((c, r)) => (c, r),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((p, r)) => {
                    params.push(p.to_string());
                    rest = r;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    pub fn param(&self, i: usize) -> Option<&str> {
        self.params.get(i).map(String::as_str)
    }

    /// Nick part of a `nick!user@host` prefix.
    pub fn sender_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split(['!', '@']).next().unwrap_or(prefix);
        (!nick.is_empty()).then_some(nick)
    }

    /// Numeric reply code (`001`, `433`, ...), if this is one.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 {
            self.command.parse().ok()
        } else {
            None
        }
    }
}

/// CR, LF and NUL would end or corrupt the line on the wire.
fn write_clean(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    for c in s.chars().filter(|c| !matches!(c, '\r' | '\n' | '\0')) {
        write!(f, "{}", c)?;
    }
    Ok(())
}

impl fmt::Display for IrcLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            f.write_str(":")?;
            write_clean(f, prefix)?;
            f.write_str(" ")?;
        }
        write_clean(f, &self.command)?;
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            f.write_str(" ")?;
            if i == last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
                f.write_str(":")?;
            }
            write_clean(f, param)?;
        }
        Ok(())
    }
}

/// Newline-framed IRC codec. Invalid UTF-8 is decoded lossily and oversized lines are
/// discarded instead of ending the stream.
#[derive(Debug)]
pub struct IrcCodec {
    /// Index of next byte to check for newline.
    next_index: usize,
    max_len: usize,
    /// Inside an oversized line; drop bytes up to the next newline.
    discarding: bool,
}

impl IrcCodec {
    pub fn new() -> Self {
        Self::with_max_len(MAX_LINE_LEN)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
            discarding: false,
        }
    }
}

impl Default for IrcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for IrcCodec {
    type Item = IrcLine;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<IrcLine>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_len {
                    src.clear();
                    self.next_index = 0;
                    self.discarding = true;
                } else {
                    self.next_index = src.len();
                }
                return Ok(None);
            };
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            if std::mem::take(&mut self.discarding) || line.len() > self.max_len {
                continue;
            }
            if let Some(msg) = IrcLine::parse(&String::from_utf8_lossy(&line)) {
                return Ok(Some(msg));
            }
        }
    }
}

impl Encoder<IrcLine> for IrcCodec {
    type Error = io::Error;

    fn encode(&mut self, line: IrcLine, dst: &mut BytesMut) -> io::Result<()> {
        let s = line.to_string();
        dst.reserve(s.len() + 2);
        dst.put_slice(s.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_privmsg_with_prefix() {
        let line = IrcLine::parse(":bob!~bob@host PRIVMSG #random :yo there").unwrap();
        assert_eq!(line.prefix.as_deref(), Some("bob!~bob@host"));
        assert_eq!(line.command, "PRIVMSG");
        assert_eq!(line.params, vec!["#random", "yo there"]);
        assert_eq!(line.sender_nick(), Some("bob"));
    }

    #[test]
    fn skips_tags_and_keeps_empty_trailing() {
        let line = IrcLine::parse("@time=2024-01-01T00:00:00Z :srv PRIVMSG #a :").unwrap();
        assert_eq!(line.params, vec!["#a", ""]);
        assert_eq!(line.sender_nick(), Some("srv"));
    }

    #[test]
    fn parses_numerics_and_bare_commands() {
        let welcome = IrcLine::parse(":irc.example.net 001 keyrcbot :Welcome\r\n").unwrap();
        assert_eq!(welcome.numeric(), Some(1));
        let ping = IrcLine::parse("PING :abc").unwrap();
        assert_eq!(ping.prefix, None);
        assert_eq!(ping.param(0), Some("abc"));
        assert_eq!(IrcLine::parse("ping x").unwrap().command, "PING");
        assert_eq!(IrcLine::parse("PRIVMSG").unwrap().numeric(), None);
    }

    #[test]
    fn rejects_blank_lines() {
        assert_eq!(IrcLine::parse(""), None);
        assert_eq!(IrcLine::parse("\r\n"), None);
        assert_eq!(IrcLine::parse(":onlyprefix"), None);
    }

    #[test]
    fn serializes_trailing_only_when_needed() {
        assert_eq!(IrcLine::join("#devops").to_string(), "JOIN #devops");
        assert_eq!(IrcLine::privmsg("#a", "hi").to_string(), "PRIVMSG #a hi");
        assert_eq!(IrcLine::privmsg("#a", "hi there").to_string(), "PRIVMSG #a :hi there");
        assert_eq!(IrcLine::privmsg("#a", ":)").to_string(), "PRIVMSG #a ::)");
        assert_eq!(IrcLine::user("bot", "The Bot").to_string(), "USER bot 0 * :The Bot");
    }

    #[test]
    fn serialization_strips_line_breaks() {
        let line = IrcLine::privmsg("#a", "one\r\nQUIT :bye");
        assert_eq!(line.to_string(), "PRIVMSG #a :oneQUIT :bye");
    }

    #[test]
    fn codec_frames_lines_and_survives_bad_input() {
        let mut codec = IrcCodec::with_max_len(32);
        let mut buf = BytesMut::from(&b"PING :a\r\nPRIVMSG #x :caf\xe9\r\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().command, "PING");
        let lossy = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(lossy.param(1), Some("caf\u{fffd}"));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&[b'x'; 40]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"tail of long line\r\nPING :b\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().param(0), Some("b"));
    }

    #[test]
    fn codec_encodes_crlf() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(IrcLine::pong("abc"), &mut buf).unwrap();
        assert_eq!(&buf[..], b"PONG abc\r\n");
    }
}
