//! Wire schema of the authorization/session protocol.
//!
//! Outbound records are plain JSON objects with PascalCase keys plus a
//! per-session `Seq` number. Inbound records are interpreted key by key: each
//! recognized key yields one [`Directive`], unknown keys are ignored, and a
//! missing key is never an error.

use acs_core::{AccessState, CredentialId, Tone};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// Record sent from the terminal to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outbound {
    #[serde(rename = "Seq")]
    pub seq: u64,
    #[serde(flatten)]
    pub body: OutboundBody,
}

impl Outbound {
    pub fn new(seq: u64, body: OutboundBody) -> Self {
        Self { seq, body }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundBody {
    Handshake(Handshake),
    Status(StatusReport),
    Auth(AuthRecord),
    Message(TextMessage),
}

impl OutboundBody {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundBody::Handshake(_) => "handshake",
            OutboundBody::Status(_) => "status",
            OutboundBody::Auth(_) => "auth",
            OutboundBody::Message(_) => "message",
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        OutboundBody::Message(TextMessage {
            message: text.into(),
        })
    }

    pub fn auth(requester: CredentialId, target: AccessState) -> Self {
        OutboundBody::Auth(AuthRecord {
            auth: requester,
            auth_to: target,
        })
    }
}

/// Opening record of every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Handshake {
    #[serde(rename = "SerialNumber")]
    pub serial_number: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "HWType")]
    pub hardware_type: String,
    #[serde(rename = "HWVersion")]
    pub hardware_version: String,
    /// Version of the terminal software.
    #[serde(rename = "BEVer")]
    pub software_version: String,
    /// Tag of the running firmware image.
    #[serde(rename = "FEVer")]
    pub firmware_version: String,
    /// Data the backend should push back: always `Time`, plus `State` and
    /// `OTATag` on the first contact of a boot.
    #[serde(rename = "Request")]
    pub request: Vec<String>,
}

/// Keepalive status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    #[serde(rename = "State")]
    pub state: AccessState,
    #[serde(rename = "Temp")]
    pub temperature: f32,
    /// Firmware tag of an update in progress.
    #[serde(rename = "FEVer", skip_serializing_if = "Option::is_none")]
    pub pending_update: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthRecord {
    #[serde(rename = "Auth")]
    pub auth: CredentialId,
    #[serde(rename = "AuthTo")]
    pub auth_to: AccessState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextMessage {
    #[serde(rename = "Message")]
    pub message: String,
}

/// One instruction extracted from an inbound record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Unsolicited state command (`State`).
    SetState(AccessState),
    /// Authorization reply (`Auth`, `Verified`, `Error`). `credential` is
    /// `None` when the echoed UID does not parse, in which case `verified`
    /// is always false.
    AuthReply {
        credential: Option<CredentialId>,
        verified: bool,
        error: Option<String>,
    },
    /// `Identify` key present.
    Identify,
    /// `Song`: replace the stored custom tone.
    StoreTone(Tone),
    /// `PlaySong: true`.
    PlayTone,
    /// `OTATag`: begin an update to the named firmware.
    FirmwareUpdate(String),
}

/// A decoded inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Record(Vec<Directive>),
    /// Not a JSON object; logged and skipped by the session.
    Malformed(String),
}

/// Interpret one inbound JSON record.
pub fn parse_inbound(line: &[u8]) -> Inbound {
    match serde_json::from_slice::<Map<String, Value>>(line) {
        Ok(object) => Inbound::Record(directives(&object)),
        Err(e) => Inbound::Malformed(e.to_string()),
    }
}

fn directives(object: &Map<String, Value>) -> Vec<Directive> {
    let mut out = Vec::new();

    if let Some(value) = object.get("State") {
        match value.as_str().map(str::parse::<AccessState>) {
            Some(Ok(state)) => out.push(Directive::SetState(state)),
            _ => warn!(%value, "ignoring state command with unknown state"),
        }
    }

    if let Some(value) = object.get("Auth") {
        let credential = value.as_str().and_then(|s| s.parse::<CredentialId>().ok());
        if credential.is_none() {
            warn!(%value, "authorization reply with unparseable credential");
        }
        let verified = credential.is_some() && is_verified(object.get("Verified"));
        let error = object
            .get("Error")
            .and_then(Value::as_str)
            .map(str::to_string);
        out.push(Directive::AuthReply {
            credential,
            verified,
            error,
        });
    }

    if object.contains_key("Identify") {
        out.push(Directive::Identify);
    }

    if let Some(value) = object.get("Song") {
        match serde_json::from_value::<Tone>(value.clone()) {
            Ok(tone) => out.push(Directive::StoreTone(tone)),
            Err(e) => warn!(error = %e, "ignoring malformed song"),
        }
    }

    if object.get("PlaySong").and_then(Value::as_bool) == Some(true) {
        out.push(Directive::PlayTone);
    }

    if let Some(value) = object.get("OTATag") {
        match value.as_str() {
            Some(tag) if !tag.is_empty() => out.push(Directive::FirmwareUpdate(tag.to_string())),
            _ => warn!(%value, "ignoring invalid OTATag"),
        }
    }

    out
}

fn is_verified(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64() == Some(1.0),
        _ => false,
    }
}
