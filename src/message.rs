//! Wire message types, parsing, and encoding.
//!
//! Every message is a single `\n`-terminated ASCII line, fields separated
//! by single spaces, with the correction field (when present) always the
//! last token on the line (spec.md §6). There is no binary header here —
//! unlike real PTP, this is a didactic, line-framed protocol.

use crate::timestamp::Timestamp;

/// The four message types exchanged in steady state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Master → slave, marks T1/T2.
    Sync,
    /// Master → slave, carries T1 and accumulated sync-path residence.
    FollowUp,
    /// Slave → master, marks T3; carries accumulated delay-path residence.
    DelayReq,
    /// Master → slave, carries T4 for the named slave.
    DelayResp,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::FollowUp => write!(f, "follow_up"),
            Self::DelayReq => write!(f, "delay_req"),
            Self::DelayResp => write!(f, "delay_resp"),
        }
    }
}

/// A parsed protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `sync`
    Sync,
    /// `follow_up <t1> <correction>`
    FollowUp {
        /// The grandmaster's T1 send time.
        t1: Timestamp,
        /// Accumulated sync-path residence so far.
        correction: f64,
    },
    /// `delay_req <slave> <correction>`
    DelayReq {
        /// Name of the requesting slave.
        slave: String,
        /// Accumulated delay-path residence so far.
        correction: f64,
    },
    /// `delay_resp <slave> <t4> <correction>`
    DelayResp {
        /// Name of the slave this response is for.
        slave: String,
        /// The grandmaster's T4 arrival time.
        t4: Timestamp,
        /// Accumulated delay-path residence, verbatim from the `delay_req`.
        correction: f64,
    },
}

/// Errors from message parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageParseError {
    /// First token isn't one of `sync`/`follow_up`/`delay_req`/`delay_resp`.
    #[error("unknown message type: {0:?}")]
    UnknownType(String),
    /// Fewer whitespace-separated fields than the message type requires.
    #[error("{kind} requires {needed} fields, got {have}")]
    TooFewFields {
        /// The message type that was being parsed.
        kind: MessageKind,
        /// Fields required.
        needed: usize,
        /// Fields present.
        have: usize,
    },
}

/// Parse a numeric field, defaulting to `0.0` on failure.
///
/// Per spec.md §7, a malformed correction field at a switch is treated as
/// zero rather than rejecting the message; this parser is shared by every
/// caller since the tolerance is harmless for well-formed senders too.
fn parse_f64_lenient(field: &str) -> f64 {
    field.parse().unwrap_or(0.0)
}

impl Message {
    /// Which of the four message types this is.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Sync => MessageKind::Sync,
            Self::FollowUp { .. } => MessageKind::FollowUp,
            Self::DelayReq { .. } => MessageKind::DelayReq,
            Self::DelayResp { .. } => MessageKind::DelayResp,
        }
    }

    /// The correction field, if this message type carries one.
    #[must_use]
    pub fn correction(&self) -> Option<f64> {
        match self {
            Self::Sync => None,
            Self::FollowUp { correction, .. }
            | Self::DelayReq { correction, .. }
            | Self::DelayResp { correction, .. } => Some(*correction),
        }
    }

    /// Return a copy of this message with its correction field replaced.
    ///
    /// A no-op for `sync`, which carries no correction field.
    #[must_use]
    pub fn with_correction(&self, new_correction: f64) -> Self {
        match self {
            Self::Sync => Self::Sync,
            Self::FollowUp { t1, .. } => Self::FollowUp {
                t1: *t1,
                correction: new_correction,
            },
            Self::DelayReq { slave, .. } => Self::DelayReq {
                slave: slave.clone(),
                correction: new_correction,
            },
            Self::DelayResp { slave, t4, .. } => Self::DelayResp {
                slave: slave.clone(),
                t4: *t4,
                correction: new_correction,
            },
        }
    }

    /// Parse a single line (terminator already stripped).
    pub fn parse(line: &str) -> Result<Self, MessageParseError> {
        let parts: Vec<&str> = line.split(' ').filter(|p| !p.is_empty()).collect();
        let msg_type = parts
            .first()
            .copied()
            .ok_or_else(|| MessageParseError::UnknownType(String::new()))?;

        match msg_type {
            "sync" => Ok(Self::Sync),
            "follow_up" => {
                if parts.len() < 3 {
                    return Err(MessageParseError::TooFewFields {
                        kind: MessageKind::FollowUp,
                        needed: 3,
                        have: parts.len(),
                    });
                }
                Ok(Self::FollowUp {
                    t1: Timestamp::from_secs_f64(parse_f64_lenient(parts[1])),
                    correction: parse_f64_lenient(parts[2]),
                })
            }
            "delay_req" => {
                if parts.len() < 3 {
                    return Err(MessageParseError::TooFewFields {
                        kind: MessageKind::DelayReq,
                        needed: 3,
                        have: parts.len(),
                    });
                }
                Ok(Self::DelayReq {
                    slave: parts[1].to_string(),
                    correction: parse_f64_lenient(parts[2]),
                })
            }
            "delay_resp" => {
                if parts.len() < 4 {
                    return Err(MessageParseError::TooFewFields {
                        kind: MessageKind::DelayResp,
                        needed: 4,
                        have: parts.len(),
                    });
                }
                Ok(Self::DelayResp {
                    slave: parts[1].to_string(),
                    t4: Timestamp::from_secs_f64(parse_f64_lenient(parts[2])),
                    correction: parse_f64_lenient(parts[3]),
                })
            }
            other => Err(MessageParseError::UnknownType(other.to_string())),
        }
    }

    /// Encode to a single line, without a trailing `\n`.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Sync => "sync".to_string(),
            Self::FollowUp { t1, correction } => {
                format!("follow_up {} {}", t1.as_secs_f64(), correction)
            }
            Self::DelayReq { slave, correction } => {
                format!("delay_req {slave} {correction}")
            }
            Self::DelayResp {
                slave,
                t4,
                correction,
            } => format!("delay_resp {slave} {} {correction}", t4.as_secs_f64()),
        }
    }

    /// Build a `sync` message.
    #[must_use]
    pub fn sync() -> Self {
        Self::Sync
    }

    /// Build a `follow_up` message.
    #[must_use]
    pub fn follow_up(t1: Timestamp, correction: f64) -> Self {
        Self::FollowUp { t1, correction }
    }

    /// Build a `delay_req` message.
    #[must_use]
    pub fn delay_req(slave: impl Into<String>, correction: f64) -> Self {
        Self::DelayReq {
            slave: slave.into(),
            correction,
        }
    }

    /// Build a `delay_resp` message.
    #[must_use]
    pub fn delay_resp(slave: impl Into<String>, t4: Timestamp, correction: f64) -> Self {
        Self::DelayResp {
            slave: slave.into(),
            t4,
            correction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_sync() {
        let msg = Message::sync();
        assert_eq!(Message::parse(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn round_trips_follow_up() {
        let msg = Message::follow_up(Timestamp::from_secs_f64(123.5), 0.75);
        let encoded = msg.encode();
        assert_eq!(encoded, "follow_up 123.5 0.75");
        assert_eq!(Message::parse(&encoded).unwrap(), msg);
    }

    #[test]
    fn round_trips_delay_req() {
        let msg = Message::delay_req("H", 0.0);
        let encoded = msg.encode();
        assert_eq!(encoded, "delay_req H 0");
        assert_eq!(Message::parse(&encoded).unwrap(), msg);
    }

    #[test]
    fn round_trips_delay_resp() {
        let msg = Message::delay_resp("H", Timestamp::from_secs_f64(99.0), 1.5);
        let encoded = msg.encode();
        assert_eq!(encoded, "delay_resp H 99 1.5");
        assert_eq!(Message::parse(&encoded).unwrap(), msg);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert_eq!(
            Message::parse("announce 1 2"),
            Err(MessageParseError::UnknownType("announce".to_string()))
        );
    }

    #[test]
    fn malformed_correction_field_defaults_to_zero() {
        let msg = Message::parse("delay_req H not-a-number").unwrap();
        assert_eq!(msg.correction(), Some(0.0));
    }

    #[test]
    fn with_correction_replaces_only_that_field() {
        let msg = Message::delay_req("H", 0.0).with_correction(0.42);
        assert_eq!(msg, Message::delay_req("H", 0.42));
    }

    #[test]
    fn with_correction_is_noop_for_sync() {
        assert_eq!(Message::sync().with_correction(1.0), Message::sync());
    }

    #[test]
    fn too_few_fields_is_rejected() {
        assert!(matches!(
            Message::parse("follow_up 1.0"),
            Err(MessageParseError::TooFewFields {
                kind: MessageKind::FollowUp,
                ..
            })
        ));
    }
}
