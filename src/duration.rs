//! Human-readable durations (`500ms`, `30s`, `2m`, `1h`) used in config.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use std::fmt;
use std::time::Duration;

use crate::{ProfhubError, ProfhubResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0.as_millis();
        if ms % 3_600_000 == 0 && ms > 0 {
            write!(f, "{}h", ms / 3_600_000)
        } else if ms % 60_000 == 0 && ms > 0 {
            write!(f, "{}m", ms / 60_000)
        } else if ms % 1000 == 0 {
            write!(f, "{}s", ms / 1000)
        } else {
            write!(f, "{ms}ms")
        }
    }
}

impl std::str::FromStr for HumanDuration {
    type Err = ProfhubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(Self)
    }
}

impl Serialize for HumanDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map(Self).map_err(serde::de::Error::custom)
    }
}

pub fn parse_duration(input: &str) -> ProfhubResult<Duration> {
    let s = input.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    if num.is_empty() {
        return Err(ProfhubError::InvalidArgument(format!(
            "invalid duration {input:?} (expected e.g. 500ms, 30s, 2m)"
        )));
    }
    let value: u64 = num
        .parse()
        .map_err(|e| ProfhubError::InvalidArgument(format!("invalid duration {input:?}: {e}")))?;
    let duration = match unit.trim() {
        "ms" => Duration::from_millis(value),
        "" | "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.saturating_mul(60)),
        "h" => Duration::from_secs(value.saturating_mul(3600)),
        other => {
            return Err(ProfhubError::InvalidArgument(format!(
                "invalid duration unit {other:?} in {input:?}"
            )));
        }
    };
    Ok(duration)
}
