use crate::{Result, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Authoritative mode of the terminal.
///
/// Exactly one value is active at a time. The canonical token of each state
/// is its CamelCase name; parsing is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum AccessState {
    Idle,
    Unlocked,
    AlwaysOn,
    Lockout,
    NextCard,
    Startup,
    Welcoming,
    Welcomed,
    AlwaysOnWaiting,
    LockoutWaiting,
    IdleWaiting,
    AwaitAuth,
    Denied,
    Fault,
    Restart,
}

impl AccessState {
    /// Every state, in declaration order.
    pub const ALL: [AccessState; 15] = [
        AccessState::Idle,
        AccessState::Unlocked,
        AccessState::AlwaysOn,
        AccessState::Lockout,
        AccessState::NextCard,
        AccessState::Startup,
        AccessState::Welcoming,
        AccessState::Welcomed,
        AccessState::AlwaysOnWaiting,
        AccessState::LockoutWaiting,
        AccessState::IdleWaiting,
        AccessState::AwaitAuth,
        AccessState::Denied,
        AccessState::Fault,
        AccessState::Restart,
    ];

    /// Canonical wire token.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessState::Idle => "Idle",
            AccessState::Unlocked => "Unlocked",
            AccessState::AlwaysOn => "AlwaysOn",
            AccessState::Lockout => "Lockout",
            AccessState::NextCard => "NextCard",
            AccessState::Startup => "Startup",
            AccessState::Welcoming => "Welcoming",
            AccessState::Welcomed => "Welcomed",
            AccessState::AlwaysOnWaiting => "AlwaysOnWaiting",
            AccessState::LockoutWaiting => "LockoutWaiting",
            AccessState::IdleWaiting => "IdleWaiting",
            AccessState::AwaitAuth => "AwaitAuth",
            AccessState::Denied => "Denied",
            AccessState::Fault => "Fault",
            AccessState::Restart => "Restart",
        }
    }

    /// Whether the backend is ever told about this state.
    ///
    /// Waiting states, `AwaitAuth`, `Denied`, `Startup` and `Restart` are
    /// transient; keepalives carry the last reportable state instead.
    #[must_use]
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            AccessState::Idle
                | AccessState::Unlocked
                | AccessState::AlwaysOn
                | AccessState::Lockout
                | AccessState::NextCard
                | AccessState::Welcoming
                | AccessState::Welcomed
                | AccessState::Fault
        )
    }

    /// One of the three states of the click cascade.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            AccessState::IdleWaiting | AccessState::AlwaysOnWaiting | AccessState::LockoutWaiting
        )
    }
}

impl fmt::Display for AccessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccessState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AccessState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidState(s.to_string()))
    }
}

impl From<AccessState> for String {
    fn from(state: AccessState) -> Self {
        state.as_str().to_string()
    }
}

impl TryFrom<String> for AccessState {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Size of the backing buffer of a [`CredentialId`].
pub const CREDENTIAL_BUFFER_LEN: usize = 10;

/// Length class of a credential UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialKind {
    /// 4-byte UID.
    Short,
    /// 7-byte UID.
    Long,
}

impl CredentialKind {
    /// Number of significant bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        match self {
            CredentialKind::Short => 4,
            CredentialKind::Long => 7,
        }
    }

    /// Number of hex digits in the wire form.
    #[must_use]
    pub fn hex_len(&self) -> usize {
        self.byte_len() * 2
    }

    fn from_len(len: usize) -> Option<Self> {
        match len {
            4 => Some(CredentialKind::Short),
            7 => Some(CredentialKind::Long),
            _ => None,
        }
    }
}

/// Identifier of a physical credential presented to the reader.
///
/// Only the bytes up to the declared length take part in equality and
/// hashing; the remainder of the buffer is ignored.
///
/// # Security
/// Equality is constant-time over the significant bytes.
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CredentialId {
    kind: CredentialKind,
    bytes: [u8; CREDENTIAL_BUFFER_LEN],
}

impl CredentialId {
    /// Build a credential from its significant bytes (4 or 7 of them).
    ///
    /// # Errors
    /// Returns `Error::InvalidCredential` for any other length.
    pub fn new(uid: &[u8]) -> Result<Self> {
        let kind = CredentialKind::from_len(uid.len()).ok_or_else(|| {
            Error::InvalidCredential(format!("UID must be 4 or 7 bytes, got {}", uid.len()))
        })?;
        let mut bytes = [0u8; CREDENTIAL_BUFFER_LEN];
        bytes[..uid.len()].copy_from_slice(uid);
        Ok(CredentialId { kind, bytes })
    }

    #[must_use]
    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    /// The significant bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.kind.byte_len()]
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_bytes()))
    }
}

impl std::str::FromStr for CredentialId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != CredentialKind::Short.hex_len() && s.len() != CredentialKind::Long.hex_len() {
            return Err(Error::InvalidCredential(format!(
                "expected 8 or 14 hex digits, got {}",
                s.len()
            )));
        }
        let raw = hex::decode(s).map_err(|e| Error::InvalidCredential(format!("{s}: {e}")))?;
        CredentialId::new(&raw)
    }
}

impl PartialEq for CredentialId {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl std::hash::Hash for CredentialId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl From<CredentialId> for String {
    fn from(id: CredentialId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for CredentialId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Why the state machine changed state, as reported to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateChangeReason {
    ButtonPress,
    OverTemperature,
    CredentialRemoved,
    CredentialActivated,
    ServerCommanded,
    /// Tamper switches disagreed for too long.
    CardSwitch,
    SoftwareError,
}

impl fmt::Display for StateChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            StateChangeReason::ButtonPress => "button press",
            StateChangeReason::OverTemperature => "over temperature",
            StateChangeReason::CredentialRemoved => "credential removed",
            StateChangeReason::CredentialActivated => "credential activated",
            StateChangeReason::ServerCommanded => "server commanded",
            StateChangeReason::CardSwitch => "card switch",
            StateChangeReason::SoftwareError => "software error",
        };
        f.write_str(reason)
    }
}

/// Cause handed to `force_fault`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultReason {
    CardSwitch,
    OverTemperature,
    ServerCommanded,
    StartupFailure,
    SoftwareError,
    LockError,
}

impl FaultReason {
    /// Reason carried by the state-change report of the fault.
    #[must_use]
    pub fn report_reason(&self) -> StateChangeReason {
        match self {
            FaultReason::CardSwitch => StateChangeReason::CardSwitch,
            FaultReason::OverTemperature => StateChangeReason::OverTemperature,
            FaultReason::ServerCommanded => StateChangeReason::ServerCommanded,
            FaultReason::StartupFailure | FaultReason::SoftwareError | FaultReason::LockError => {
                StateChangeReason::SoftwareError
            }
        }
    }
}

/// Telemetry record of one operator-relevant transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeReport {
    pub from: AccessState,
    pub to: AccessState,
    pub reason: StateChangeReason,
    pub who: Option<CredentialId>,
}

impl StateChangeReport {
    #[must_use]
    pub fn new(from: AccessState, to: AccessState, reason: StateChangeReason) -> Self {
        Self {
            from,
            to,
            reason,
            who: None,
        }
    }

    #[must_use]
    pub fn with_who(mut self, who: Option<CredentialId>) -> Self {
        self.who = who;
        self
    }
}

impl fmt::Display for StateChangeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Changed state from {} -> {} ({})",
            self.from, self.to, self.reason
        )?;
        if let Some(who) = &self.who {
            write!(f, " by {who}")?;
        }
        Ok(())
    }
}

/// Request for the backend to authorize `requester` into `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub requester: CredentialId,
    pub target: AccessState,
}

/// Session state with the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectivityState {
    #[default]
    Offline,
    ConnectingTransport,
    AwaitingHandshake,
    Online,
}

impl ConnectivityState {
    #[must_use]
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityState::Online)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectivityState::Offline => "Offline",
            ConnectivityState::ConnectingTransport => "ConnectingTransport",
            ConnectivityState::AwaitingHandshake => "AwaitingHandshake",
            ConnectivityState::Online => "Online",
        };
        f.write_str(name)
    }
}

/// One note of a custom tone, `[frequency_hz, duration_ms]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct Note {
    pub frequency_hz: u32,
    pub duration_ms: u32,
}

impl From<(u32, u32)> for Note {
    fn from((frequency_hz, duration_ms): (u32, u32)) -> Self {
        Self {
            frequency_hz,
            duration_ms,
        }
    }
}

impl From<Note> for (u32, u32) {
    fn from(note: Note) -> Self {
        (note.frequency_hz, note.duration_ms)
    }
}

/// Custom tone uploaded by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tone {
    #[serde(rename = "Notes")]
    pub notes: Vec<Note>,
}

impl Tone {
    /// Total playback length in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.notes.iter().map(|n| u64::from(n.duration_ms)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[rstest]
    #[case("Idle", AccessState::Idle)]
    #[case("idle", AccessState::Idle)]
    #[case("ALWAYSONWAITING", AccessState::AlwaysOnWaiting)]
    #[case("lockoutwaiting", AccessState::LockoutWaiting)]
    #[case("AwaitAuth", AccessState::AwaitAuth)]
    #[case("restart", AccessState::Restart)]
    fn test_state_parse_is_case_insensitive(#[case] token: &str, #[case] expected: AccessState) {
        assert_eq!(token.parse::<AccessState>().unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("idle ")]
    #[case("Unlock")]
    #[case("always_on")]
    fn test_state_parse_rejects_unknown(#[case] token: &str) {
        assert!(matches!(
            token.parse::<AccessState>(),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_every_state_round_trips() {
        for state in AccessState::ALL {
            assert_eq!(state.to_string().parse::<AccessState>().unwrap(), state);
        }
    }

    #[test]
    fn test_state_serializes_as_token() {
        let json = serde_json::to_string(&AccessState::AlwaysOn).unwrap();
        assert_eq!(json, "\"AlwaysOn\"");
        let back: AccessState = serde_json::from_str("\"alwayson\"").unwrap();
        assert_eq!(back, AccessState::AlwaysOn);
    }

    #[test]
    fn test_transient_states_are_not_reportable() {
        for state in [
            AccessState::AwaitAuth,
            AccessState::Denied,
            AccessState::IdleWaiting,
            AccessState::AlwaysOnWaiting,
            AccessState::LockoutWaiting,
            AccessState::Startup,
            AccessState::Restart,
        ] {
            assert!(!state.is_reportable(), "{state} should not be reportable");
        }
        assert!(AccessState::Idle.is_reportable());
        assert!(AccessState::Fault.is_reportable());
    }

    #[rstest]
    #[case("deadbeef", CredentialKind::Short)]
    #[case("04a1b2c3d4e5f6", CredentialKind::Long)]
    fn test_credential_parse(#[case] hex: &str, #[case] kind: CredentialKind) {
        let id: CredentialId = hex.parse().unwrap();
        assert_eq!(id.kind(), kind);
        assert_eq!(id.to_string(), hex);
    }

    #[rstest]
    #[case("")]
    #[case("deadbee")]
    #[case("deadbeef00")]
    #[case("04a1b2c3d4e5f6aa")]
    #[case("zzzzzzzz")]
    #[case("04a1b2c3d4e5g6")]
    fn test_credential_parse_rejects(#[case] hex: &str) {
        assert!(matches!(
            hex.parse::<CredentialId>(),
            Err(Error::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_credential_display_is_lowercase() {
        let id: CredentialId = "DEADBEEF".parse().unwrap();
        assert_eq!(id.to_string(), "deadbeef");
    }

    #[test]
    fn test_credential_new_rejects_other_lengths() {
        assert!(CredentialId::new(&[1, 2, 3]).is_err());
        assert!(CredentialId::new(&[0; 10]).is_err());
        assert!(CredentialId::new(&[1, 2, 3, 4]).is_ok());
    }

    #[test]
    fn test_credential_equality_uses_declared_length() {
        let short = CredentialId::new(&[1, 2, 3, 4]).unwrap();
        let long = CredentialId::new(&[1, 2, 3, 4, 0, 0, 0]).unwrap();
        assert_ne!(short, long);
        assert_eq!(short, CredentialId::new(&[1, 2, 3, 4]).unwrap());
    }

    #[test]
    fn test_credential_hash_matches_equality() {
        let mut set = HashSet::new();
        set.insert(CredentialId::new(&[9, 8, 7, 6]).unwrap());
        assert!(set.contains(&"09080706".parse::<CredentialId>().unwrap()));
    }

    #[test]
    fn test_credential_serde_uses_hex() {
        let id = CredentialId::new(&[0xab, 0xcd, 0xef, 0x01]).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abcdef01\"");
        assert!(serde_json::from_str::<CredentialId>("\"abc\"").is_err());
    }

    #[test]
    fn test_fault_reason_mapping() {
        assert_eq!(
            FaultReason::CardSwitch.report_reason(),
            StateChangeReason::CardSwitch
        );
        assert_eq!(
            FaultReason::OverTemperature.report_reason(),
            StateChangeReason::OverTemperature
        );
        assert_eq!(
            FaultReason::LockError.report_reason(),
            StateChangeReason::SoftwareError
        );
    }

    #[test]
    fn test_report_display() {
        let who: CredentialId = "01020304".parse().unwrap();
        let report = StateChangeReport::new(
            AccessState::AwaitAuth,
            AccessState::Unlocked,
            StateChangeReason::CredentialActivated,
        )
        .with_who(Some(who));
        assert_eq!(
            report.to_string(),
            "Changed state from AwaitAuth -> Unlocked (credential activated) by 01020304"
        );
    }

    #[test]
    fn test_tone_wire_format() {
        let tone: Tone = serde_json::from_str(r#"{"Notes":[[440,100],[880,250]]}"#).unwrap();
        assert_eq!(tone.notes.len(), 2);
        assert_eq!(tone.notes[1].frequency_hz, 880);
        assert_eq!(tone.duration_ms(), 350);
        assert_eq!(
            serde_json::to_string(&tone).unwrap(),
            r#"{"Notes":[[440,100],[880,250]]}"#
        );
    }

    #[test]
    fn test_only_online_is_online() {
        assert!(ConnectivityState::Online.is_online());
        assert!(!ConnectivityState::AwaitingHandshake.is_online());
        assert!(!ConnectivityState::default().is_online());
    }
}
