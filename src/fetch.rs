//! Pulls a capture from a remote `net/http/pprof`-style endpoint.

use serde::Deserialize;
use time::OffsetDateTime;

use std::io::Read as _;
use std::time::Duration;

use crate::{ProfhubError, ProfhubResult, ProfileType, check_remote_url};

/// `POST /api/profiles/fetch` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    /// Falls back to the connection's URL when omitted.
    #[serde(default)]
    pub url: Option<String>,
    pub profile_type: ProfileType,
    #[serde(default)]
    pub seconds: Option<u64>,
    #[serde(default)]
    pub connection_id: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchedCapture {
    pub url: String,
    pub original_filename: String,
    pub bytes: Vec<u8>,
}

/// Resolves the capture URL for `profile_type` under `base`.
///
/// A URL that already names an endpoint below `/debug/pprof/` is used
/// unchanged. A base ending at `/debug/pprof` only gets the endpoint segment.
/// An existing query string is kept; CPU captures gain `seconds` unless the
/// base already sets it.
pub fn capture_url(base: &str, profile_type: ProfileType, seconds: u64) -> ProfhubResult<String> {
    const PPROF_ROOT: &str = "/debug/pprof";

    let mut url = check_remote_url(base).map_err(|reason| ProfhubError::invalid_field("url", reason))?;
    let trimmed = url.path().trim_end_matches('/');
    let path = if trimmed.ends_with(PPROF_ROOT) {
        format!("{trimmed}/{}", profile_type.endpoint_segment())
    } else if trimmed.contains("/debug/pprof/") {
        return Ok(url.to_string());
    } else {
        format!("{trimmed}{PPROF_ROOT}/{}", profile_type.endpoint_segment())
    };
    url.set_path(&path);

    if profile_type == ProfileType::Cpu && !url.query_pairs().any(|(k, _)| k == "seconds") {
        url.query_pairs_mut().append_pair("seconds", &seconds.to_string());
    }
    Ok(url.to_string())
}

/// Blocking GET; run it off the async executor.
pub fn fetch_remote(
    base: &str,
    profile_type: ProfileType,
    seconds: u64,
    timeout: Duration,
    max_bytes: usize,
) -> ProfhubResult<FetchedCapture> {
    let url = capture_url(base, profile_type, seconds)?;
    // CPU captures block server-side for the whole sampling window.
    let budget = if profile_type == ProfileType::Cpu {
        timeout.max(Duration::from_secs(seconds.saturating_add(10)))
    } else {
        timeout
    };
    let agent = ureq::AgentBuilder::new().timeout(budget).build();

    tracing::info!(%url, kind = %profile_type, "fetching remote profile");
    let response = agent.get(&url).call().map_err(|err| match err {
        ureq::Error::Status(code, resp) => ProfhubError::Fetch(format!(
            "{url} returned HTTP {code} {}",
            resp.status_text()
        )),
        ureq::Error::Transport(t) => ProfhubError::Fetch(format!("{url}: {t}")),
    })?;

    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(max_bytes as u64 + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| ProfhubError::Fetch(format!("reading body from {url}: {e}")))?;
    if bytes.len() > max_bytes {
        return Err(ProfhubError::Fetch(format!(
            "{url} returned more than {max_bytes} bytes"
        )));
    }
    if bytes.is_empty() {
        return Err(ProfhubError::Fetch(format!("{url} returned an empty body")));
    }

    Ok(FetchedCapture {
        original_filename: format!(
            "{}-{}.pb.gz",
            profile_type,
            OffsetDateTime::now_utc().unix_timestamp()
        ),
        url,
        bytes,
    })
}
