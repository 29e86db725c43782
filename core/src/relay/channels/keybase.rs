//! Keybase chat transport. All keybase usage is confined here; it drives the `keybase` CLI:
//! `status -j` for the login check, `chat api-listen` for the event stream (one JSON object
//! per line) and `chat api -m <json>` for send and list.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::error::{ConnectError, TransportError};
use crate::relay::event::{ContentKind, InboundEvent, Platform};
use crate::relay::log::truncate_content_default;
use crate::relay::transport::{ChatChannel, ChatTransport, InboundSink, Membership, SendError};

const MEMBERS_TYPE_TEAM: &str = "team";

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(rename = "Username", default)]
    username: String,
    #[serde(rename = "LoggedIn", default)]
    logged_in: bool,
}

/// One line of `chat api-listen` output.
#[derive(Debug, Deserialize)]
struct ListenLine {
    #[serde(rename = "type", default)]
    kind: String,
    msg: Option<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    channel: ApiChannel,
    sender: ApiSender,
    content: ApiContent,
}

#[derive(Debug, Deserialize)]
struct ApiChannel {
    name: String,
    #[serde(default)]
    members_type: String,
    #[serde(default)]
    topic_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiSender {
    username: String,
}

#[derive(Debug, Deserialize)]
struct ApiContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<ApiText>,
}

#[derive(Debug, Deserialize)]
struct ApiText {
    body: String,
}

#[derive(Debug, Deserialize)]
struct ListReply {
    result: Option<ListResult>,
}

#[derive(Debug, Deserialize)]
struct ListResult {
    #[serde(default)]
    conversations: Vec<Conversation>,
}

#[derive(Debug, Deserialize)]
struct Conversation {
    channel: ApiChannel,
}

/// Parse one `chat api-listen` line. None for non-chat notifications and unparsable lines.
pub fn parse_listen_line(line: &str) -> Option<InboundEvent> {
    let parsed: ListenLine = serde_json::from_str(line).ok()?;
    if parsed.kind != "chat" {
        return None;
    }
    let msg = parsed.msg?;
    let team = (msg.channel.members_type == MEMBERS_TYPE_TEAM).then_some(msg.channel.name);
    let (kind, text) = match (msg.content.kind.as_str(), msg.content.text) {
        ("text", Some(t)) => (ContentKind::Text, t.body),
        _ => (ContentKind::Other, String::new()),
    };
    Some(InboundEvent {
        source: Platform::Chat,
        sender: msg.sender.username,
        channel: msg.channel.topic_name,
        team,
        text,
        kind,
    })
}

/// Parse a `list` reply into the conversations the bot belongs to.
pub fn parse_list_reply(reply: &serde_json::Value) -> Result<Vec<ChatChannel>, SendError> {
    let parsed = ListReply::deserialize(reply).map_err(|e| SendError::Other(format!("list reply: {}", e)))?;
    let result = parsed
        .result
        .ok_or_else(|| SendError::Other("list reply missing result".into()))?;
    Ok(result
        .conversations
        .into_iter()
        .map(|c| ChatChannel {
            membership: if c.channel.members_type == MEMBERS_TYPE_TEAM {
                Membership::Team
            } else {
                Membership::Direct
            },
            team: c.channel.name,
            topic: c.channel.topic_name,
        })
        .collect())
}

/// `send` request posting `body` to `topic` of `team`.
pub fn send_request(team: &str, topic: &str, body: &str) -> serde_json::Value {
    json!({
        "method": "send",
        "params": {
            "options": {
                "channel": {
                    "name": team,
                    "members_type": MEMBERS_TYPE_TEAM,
                    "topic_name": topic,
                },
                "message": { "body": body },
            }
        }
    })
}

/// Error object of an api reply, if any.
fn api_error(reply: &serde_json::Value) -> Option<String> {
    let err = reply.get("error")?;
    Some(
        err.get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| err.to_string()),
    )
}

/// Keybase transport for one team. Topics are addressed by name within `team`.
pub struct KeybaseChat {
    bin: String,
    team: String,
    username: String,
}

impl KeybaseChat {
    /// Check that the local keybase client is running and logged in.
    pub async fn connect(config: &ChatConfig) -> Result<Self, ConnectError> {
        let out = TokioCommand::new(&config.keybase_bin)
            .args(["status", "-j"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ConnectError::ChatUnavailable(format!("run {}: {}", config.keybase_bin, e)))?;
        if !out.status.success() {
            return Err(ConnectError::ChatUnavailable(format!(
                "{} status exited with {}: {}",
                config.keybase_bin,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        let status: Status = serde_json::from_slice(&out.stdout)
            .map_err(|e| ConnectError::ChatUnavailable(format!("status output: {}", e)))?;
        if !status.logged_in || status.username.is_empty() {
            return Err(ConnectError::NotLoggedIn);
        }
        info!(platform = "chat", user = %status.username, team = %config.team, "keybase ready");
        Ok(Self {
            bin: config.keybase_bin.clone(),
            team: config.team.clone(),
            username: status.username,
        })
    }

    async fn api(&self, request: &serde_json::Value) -> Result<serde_json::Value, SendError> {
        let out = TokioCommand::new(&self.bin)
            .args(["chat", "api", "-m", &request.to_string()])
            .stdin(Stdio::null())
            .output()
            .await?;
        let reply: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap_or(serde_json::Value::Null);
        if let Some(message) = api_error(&reply) {
            return Err(SendError::Other(message));
        }
        if !out.status.success() {
            return Err(SendError::Other(format!(
                "chat api exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(reply)
    }
}

#[async_trait]
impl ChatTransport for KeybaseChat {
    fn username(&self) -> &str {
        &self.username
    }

    async fn send(&self, topic: &str, text: &str) -> Result<(), SendError> {
        self.api(&send_request(&self.team, topic, text)).await.map(|_| ())
    }

    async fn list_channels(&self) -> Result<Vec<ChatChannel>, SendError> {
        let reply = self.api(&json!({ "method": "list" })).await?;
        parse_list_reply(&reply)
    }

    async fn listen(&self, sink: Arc<dyn InboundSink>) -> Result<(), TransportError> {
        let mut child = TokioCommand::new(&self.bin)
            .args(["chat", "api-listen"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: format!("{} chat api-listen", self.bin),
                source,
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Other("api-listen stdout not captured".into()))?;

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            match parse_listen_line(&line) {
                Some(event) => sink.deliver(event).await,
                None => debug!(platform = "chat", line = %truncate_content_default(&line), "skipped listen line"),
            }
        }
        let status = child.wait().await?;
        warn!(platform = "chat", %status, "api-listen exited");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT_LINE: &str = r#"{"type":"chat","source":"remote","msg":{"id":12,
        "channel":{"name":"keyrc","members_type":"team","topic_type":"chat","topic_name":"random"},
        "sender":{"uid":"u1","username":"alice","device_name":"phone"},
        "content":{"type":"text","text":{"body":"hi"}}}}"#;

    #[test]
    fn parses_team_text_message() {
        let ev = parse_listen_line(&TEXT_LINE.replace('\n', "")).unwrap();
        assert_eq!(ev, InboundEvent::chat("keyrc", "random", "alice", "hi"));
    }

    #[test]
    fn non_text_content_is_marked_other() {
        let line = r#"{"type":"chat","msg":{"channel":{"name":"keyrc","members_type":"team","topic_name":"random"},
            "sender":{"username":"alice"},"content":{"type":"reaction","reaction":{"b":":+1:"}}}}"#;
        let ev = parse_listen_line(&line.replace('\n', "")).unwrap();
        assert_eq!(ev.kind, ContentKind::Other);
        assert!(ev.text.is_empty());
    }

    #[test]
    fn direct_messages_have_no_team() {
        let line = r#"{"type":"chat","msg":{"channel":{"name":"alice,keyrc","members_type":"impteamnative"},
            "sender":{"username":"alice"},"content":{"type":"text","text":{"body":"psst"}}}}"#;
        let ev = parse_listen_line(&line.replace('\n', "")).unwrap();
        assert_eq!(ev.team, None);
        assert_eq!(ev.channel, "");
    }

    #[test]
    fn skips_other_notifications_and_garbage() {
        assert!(parse_listen_line(r#"{"type":"wallet","notification":{}}"#).is_none());
        assert!(parse_listen_line("not json").is_none());
        assert!(parse_listen_line(r#"{"type":"chat"}"#).is_none());
    }

    #[test]
    fn list_reply_maps_membership() {
        let reply = json!({"result": {"conversations": [
            {"id": "a", "channel": {"name": "keyrc", "members_type": "team", "topic_name": "general"}},
            {"id": "b", "channel": {"name": "keyrc", "members_type": "team", "topic_name": "random"}},
            {"id": "c", "channel": {"name": "alice,keyrc", "members_type": "impteamnative"}}
        ]}});
        let channels = parse_list_reply(&reply).unwrap();
        assert_eq!(channels.len(), 3);
        assert_eq!(
            channels[1],
            ChatChannel {
                team: "keyrc".into(),
                topic: "random".into(),
                membership: Membership::Team
            }
        );
        assert_eq!(channels[2].membership, Membership::Direct);
    }

    #[test]
    fn list_reply_without_result_is_an_error() {
        let reply = json!({"error": {"code": 900, "message": "boom"}});
        assert!(parse_list_reply(&reply).is_err());
        assert_eq!(api_error(&reply).as_deref(), Some("boom"));
    }

    #[test]
    fn send_request_targets_team_topic() {
        let req = send_request("keyrc", "random", "[bob]: yo");
        assert_eq!(req["method"], "send");
        assert_eq!(req["params"]["options"]["channel"]["topic_name"], "random");
        assert_eq!(req["params"]["options"]["channel"]["members_type"], "team");
        assert_eq!(req["params"]["options"]["message"]["body"], "[bob]: yo");
    }
}
