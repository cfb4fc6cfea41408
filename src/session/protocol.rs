//! Line protocol between the server and participant devices.
//!
//! Every message is `<TYPE>:<payload>\n`, split on the first colon.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    NameEntered,
    AgeEntered,
    HeightEntered,
    SessionStart,
    HeartRate,
    HrBaseline,
    SessionEnd,
    ImuConfig,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::NameEntered => "NAME_ENTERED",
            MessageType::AgeEntered => "AGE_ENTERED",
            MessageType::HeightEntered => "HEIGHT_ENTERED",
            MessageType::SessionStart => "SESSION_START",
            MessageType::HeartRate => "HEART_RATE",
            MessageType::HrBaseline => "HR_BASELINE",
            MessageType::SessionEnd => "SESSION_END",
            MessageType::ImuConfig => "IMU_CONFIG",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NAME_ENTERED" => MessageType::NameEntered,
            // older device firmware misspells this one
            "AGE_ENTERED" | "AGE_ENETERED" => MessageType::AgeEntered,
            "HEIGHT_ENTERED" => MessageType::HeightEntered,
            "SESSION_START" => MessageType::SessionStart,
            "HEART_RATE" => MessageType::HeartRate,
            "HR_BASELINE" => MessageType::HrBaseline,
            "SESSION_END" => MessageType::SessionEnd,
            "IMU_CONFIG" => MessageType::ImuConfig,
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("empty line")]
    Empty,
    #[error("missing ':' separator in {0:?}")]
    MissingSeparator(String),
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("invalid {kind} payload {payload:?}")]
    BadPayload { kind: MessageType, payload: String },
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Name(String),
    Age(u32),
    /// Metres, finite and positive.
    Height(f32),
    SessionStart,
    HeartRate(u32),
    HeartRateBaseline(f32),
    SessionEnd,
    ImuConfig(u16),
}

impl ControlMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ControlMessage::Name(_) => MessageType::NameEntered,
            ControlMessage::Age(_) => MessageType::AgeEntered,
            ControlMessage::Height(_) => MessageType::HeightEntered,
            ControlMessage::SessionStart => MessageType::SessionStart,
            ControlMessage::HeartRate(_) => MessageType::HeartRate,
            ControlMessage::HeartRateBaseline(_) => MessageType::HrBaseline,
            ControlMessage::SessionEnd => MessageType::SessionEnd,
            ControlMessage::ImuConfig(_) => MessageType::ImuConfig,
        }
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }
        let (kind, payload) = line
            .split_once(':')
            .ok_or_else(|| ProtocolError::MissingSeparator(line.to_string()))?;
        let kind: MessageType = kind.trim().parse()?;
        let payload = payload.trim();
        let bad = || ProtocolError::BadPayload {
            kind,
            payload: payload.to_string(),
        };

        Ok(match kind {
            MessageType::NameEntered => ControlMessage::Name(payload.to_string()),
            MessageType::AgeEntered => ControlMessage::Age(payload.parse().map_err(|_| bad())?),
            MessageType::HeightEntered => {
                let h: f32 = payload.parse().map_err(|_| bad())?;
                if !h.is_finite() || h <= 0.0 {
                    return Err(bad());
                }
                ControlMessage::Height(h)
            }
            MessageType::SessionStart => ControlMessage::SessionStart,
            MessageType::HeartRate => ControlMessage::HeartRate(parse_bpm(payload).ok_or_else(bad)?),
            MessageType::HrBaseline => {
                let bpm: f32 = payload.parse().map_err(|_| bad())?;
                if !bpm.is_finite() || bpm < 0.0 {
                    return Err(bad());
                }
                ControlMessage::HeartRateBaseline(bpm)
            }
            MessageType::SessionEnd => ControlMessage::SessionEnd,
            MessageType::ImuConfig => ControlMessage::ImuConfig(payload.parse().map_err(|_| bad())?),
        })
    }

    fn payload(&self) -> String {
        match self {
            ControlMessage::Name(name) => name.clone(),
            ControlMessage::Age(age) => age.to_string(),
            ControlMessage::Height(h) => h.to_string(),
            ControlMessage::HeartRate(bpm) => bpm.to_string(),
            ControlMessage::HeartRateBaseline(bpm) => bpm.to_string(),
            ControlMessage::ImuConfig(port) => port.to_string(),
            ControlMessage::SessionStart | ControlMessage::SessionEnd => String::new(),
        }
    }

    /// Wire form without the trailing newline.
    pub fn encode(&self) -> String {
        encode_line(self.message_type(), &self.payload())
    }
}

/// Accepts "72" as well as "72.0" from devices that send floats.
fn parse_bpm(payload: &str) -> Option<u32> {
    if let Ok(v) = payload.parse::<u32>() {
        return Some(v);
    }
    let v: f32 = payload.parse().ok()?;
    (v.is_finite() && v >= 0.0).then(|| v.round() as u32)
}

pub fn encode_line(kind: MessageType, payload: &str) -> String {
    format!("{kind}:{payload}")
}
