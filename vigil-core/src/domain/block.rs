use crate::foundation::VigilError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Consensus step within a round. Serializes as its numeric value, which is
/// also what the persisted state files carry.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Step {
    Propose = 1,
    Prevote = 2,
    Precommit = 3,
}

impl Step {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl From<Step> for u8 {
    fn from(value: Step) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for Step {
    type Error = VigilError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Step::Propose),
            2 => Ok(Step::Prevote),
            3 => Ok(Step::Precommit),
            other => Err(VigilError::Message(format!("invalid consensus step {other}"))),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Propose => "propose",
            Step::Prevote => "prevote",
            Step::Precommit => "precommit",
        };
        write!(f, "{name}")
    }
}

/// Height/round/step: the identifier of one consensus attempt.
///
/// Ordering is lexicographic by (height, round, step); this is the ordering
/// the double-sign guard enforces.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct Hrs {
    pub height: u64,
    pub round: u64,
    pub step: Step,
}

impl Hrs {
    pub fn new(height: u64, round: u64, step: Step) -> Self {
        Self { height, round, step }
    }
}

impl Ord for Hrs {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.height, self.round, self.step).cmp(&(other.height, other.round, other.step))
    }
}

impl PartialOrd for Hrs {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Hrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.height, self.round, self.step.as_u8())
    }
}

/// HRS plus the block timestamp in nanoseconds since epoch.
///
/// The timestamp is carried through both signing rounds but never enters the
/// ordering key; it is only compared on exact-match replays.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct Hrst {
    pub height: u64,
    pub round: u64,
    pub step: Step,
    pub timestamp_nanos: u64,
}

impl Hrst {
    pub fn hrs(&self) -> Hrs {
        Hrs { height: self.height, round: self.round, step: self.step }
    }
}

impl From<Hrst> for Hrs {
    fn from(value: Hrst) -> Self {
        value.hrs()
    }
}

/// One block signing request as delivered by the privval source.
///
/// `sign_bytes` is the canonical payload the chain expects signed; it is
/// opaque here, the only requirement is bit-exact reproducibility so the
/// replay path can compare payloads.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Block {
    pub height: u64,
    pub round: u64,
    pub step: Step,
    #[serde(with = "crate::foundation::util::encoding::base64_bytes")]
    pub sign_bytes: Vec<u8>,
    pub timestamp_nanos: u64,
}

impl Block {
    pub fn hrs(&self) -> Hrs {
        Hrs { height: self.height, round: self.round, step: self.step }
    }

    pub fn hrst(&self) -> Hrst {
        Hrst { height: self.height, round: self.round, step: self.step, timestamp_nanos: self.timestamp_nanos }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hrs_ordering_is_lexicographic() {
        let base = Hrs::new(100, 0, Step::Prevote);
        assert!(Hrs::new(100, 0, Step::Precommit) > base);
        assert!(Hrs::new(100, 1, Step::Propose) > base);
        assert!(Hrs::new(101, 0, Step::Propose) > base);
        assert!(Hrs::new(100, 0, Step::Propose) < base);
        assert!(Hrs::new(99, 5, Step::Precommit) < base);
        assert_eq!(Hrs::new(100, 0, Step::Prevote), base);
    }

    #[test]
    fn step_round_trips_through_u8() {
        for step in [Step::Propose, Step::Prevote, Step::Precommit] {
            assert_eq!(Step::try_from(step.as_u8()).expect("step"), step);
        }
        assert!(Step::try_from(0).is_err());
        assert!(Step::try_from(4).is_err());
    }

    #[test]
    fn timestamp_does_not_affect_ordering() {
        let a = Hrst { height: 5, round: 0, step: Step::Prevote, timestamp_nanos: 1 };
        let b = Hrst { height: 5, round: 0, step: Step::Prevote, timestamp_nanos: 2 };
        assert_eq!(a.hrs(), b.hrs());
    }
}
