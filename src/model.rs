//! Stored record shapes, transported as JSON.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use crate::ProfhubError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileType {
    Cpu,
    Heap,
    Block,
    Mutex,
    Goroutine,
    Threadcreate,
}

impl ProfileType {
    pub const ALL: [ProfileType; 6] = [
        Self::Cpu,
        Self::Heap,
        Self::Block,
        Self::Mutex,
        Self::Goroutine,
        Self::Threadcreate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Heap => "heap",
            Self::Block => "block",
            Self::Mutex => "mutex",
            Self::Goroutine => "goroutine",
            Self::Threadcreate => "threadcreate",
        }
    }

    /// Path segment under `/debug/pprof/` serving this kind of capture.
    pub fn endpoint_segment(&self) -> &'static str {
        match self {
            Self::Cpu => "profile",
            other => other.as_str(),
        }
    }

    /// Best-effort guess from a capture filename such as `heap-1700000000.pb.gz`.
    ///
    /// The earliest type name in the filename wins; at the same position the
    /// longer name wins.
    pub fn detect_in(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .filter_map(|t| {
                lower
                    .find(t.as_str())
                    .map(|pos| (pos, Reverse(t.as_str().len()), t))
            })
            .min()
            .map(|(_, _, t)| t)
            .or_else(|| lower.contains("profile").then_some(Self::Cpu))
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileType {
    type Err = ProfhubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| {
                ProfhubError::invalid_field(
                    "profileType",
                    format!(
                        "unknown profile type {needle:?} (expected one of {})",
                        Self::ALL.map(|t| t.as_str()).join(", ")
                    ),
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopFunction {
    pub name: String,
    #[serde(default)]
    pub flat: String,
    #[serde(default)]
    pub flat_percent: f64,
    #[serde(default)]
    pub cum: String,
    #[serde(default)]
    pub cum_percent: f64,
}

/// Loosely-typed metadata bag.
///
/// Known keys surface as typed fields only when they have the expected shape.
/// Anything else, including a known key with an unexpected type, stays in
/// `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Map<String, Value>")]
pub struct ProfileMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub top_functions: Vec<TopFunction>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for ProfileMetadata {
    fn from(mut extra: Map<String, Value>) -> Self {
        let duration = take_typed(&mut extra, "duration");
        let samples = take_typed(&mut extra, "samples");
        let period = take_typed(&mut extra, "period");
        let top_functions = match take_typed::<Vec<TopFunction>>(&mut extra, "topFunctions") {
            Some(rows) if rows.is_empty() => {
                extra.insert("topFunctions".to_string(), Value::Array(Vec::new()));
                Vec::new()
            }
            Some(rows) => rows,
            None => Vec::new(),
        };
        Self {
            duration,
            samples,
            period,
            top_functions,
            extra,
        }
    }
}

/// Moves `key` out of `map` only if it holds a non-null value that
/// deserializes as `T`.
fn take_typed<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = map.get(key).filter(|v| !v.is_null())?;
    let typed = T::deserialize(value).ok()?;
    map.remove(key);
    Some(typed)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: u64,
    pub filename: String,
    pub original_filename: String,
    pub profile_type: ProfileType,
    pub size: u64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: ProfileMetadata,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
    pub is_saved: bool,
    pub checksum: String,
    /// Raw capture, standard base64.
    pub data: String,
}

impl Profile {
    pub fn decode_data(&self) -> Result<Vec<u8>, ProfhubError> {
        STANDARD.decode(&self.data).map_err(|e| {
            ProfhubError::InvalidArgument(format!("profile {} holds invalid base64: {e}", self.id))
        })
    }
}

/// A [`Profile`] without its capture bytes, as returned by listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub id: u64,
    pub filename: String,
    pub original_filename: String,
    pub profile_type: ProfileType,
    pub size: u64,
    pub description: Option<String>,
    pub metadata: ProfileMetadata,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
    pub is_saved: bool,
    pub checksum: String,
}

impl From<&Profile> for ProfileSummary {
    fn from(p: &Profile) -> Self {
        Self {
            id: p.id,
            filename: p.filename.clone(),
            original_filename: p.original_filename.clone(),
            profile_type: p.profile_type,
            size: p.size,
            description: p.description.clone(),
            metadata: p.metadata.clone(),
            uploaded_at: p.uploaded_at,
            is_saved: p.is_saved,
            checksum: p.checksum.clone(),
        }
    }
}

/// A validated profile waiting for an id and timestamp from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDraft {
    pub filename: String,
    pub original_filename: String,
    pub profile_type: ProfileType,
    pub description: Option<String>,
    pub metadata: ProfileMetadata,
    pub is_saved: bool,
    pub size: u64,
    pub checksum: String,
    pub data: String,
}

impl ProfileDraft {
    pub fn from_bytes(original_filename: String, profile_type: ProfileType, bytes: &[u8]) -> Self {
        Self {
            filename: generated_filename(),
            original_filename,
            profile_type,
            description: None,
            metadata: ProfileMetadata::default(),
            is_saved: false,
            size: bytes.len() as u64,
            checksum: blake3::hash(bytes).to_hex().to_string(),
            data: STANDARD.encode(bytes),
        }
    }
}

pub fn generated_filename() -> String {
    format!("{}.pb.gz", uuid::Uuid::new_v4())
}

/// `POST /api/profiles` body. Loosely typed; see `validation` for the rules.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    #[serde(default)]
    pub original_filename: String,
    #[serde(default)]
    pub profile_type: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<ProfileMetadata>,
    #[serde(default)]
    pub is_saved: Option<bool>,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    /// Absent leaves the description alone; `null` clears it.
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub is_saved: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: u64,
    pub name: String,
    pub url: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_connected: Option<OffsetDateTime>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConnection {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDraft {
    pub name: String,
    pub url: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
