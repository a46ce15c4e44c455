//! Boundary validation for API inputs.
//!
//! Every check runs and every failure is reported, so a client sees all of its
//! mistakes in one `Validation error: ...` message.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::{
    ConnectionDraft, ConnectionUpdate, FetchRequest, FieldError, NewConnection, NewProfile,
    ProfhubError, ProfhubResult, ProfileDraft, ProfileType, ProfileUpdate, generated_filename,
};

pub const MAX_FILENAME_LEN: usize = 255;
pub const MAX_DESCRIPTION_LEN: usize = 1024;

#[derive(Debug, Default)]
struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    fn fail(&mut self, field: &str, reason: impl Into<String>) {
        self.errors.push(FieldError::new(field, reason));
    }

    fn non_empty(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.fail(field, "must not be empty");
        }
    }

    fn max_len(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.fail(field, format!("must be at most {max} characters"));
        }
    }

    /// Filenames end up in response headers.
    fn no_control(&mut self, field: &str, value: &str) {
        if value.chars().any(char::is_control) {
            self.fail(field, "must not contain control characters");
        }
    }

    fn finish<T>(self, value: T) -> ProfhubResult<T> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(ProfhubError::Validation(self.errors))
        }
    }
}

pub fn validate_new_profile(input: NewProfile, max_bytes: usize) -> ProfhubResult<ProfileDraft> {
    let mut c = Checker::default();

    c.non_empty("originalFilename", &input.original_filename);
    c.max_len("originalFilename", &input.original_filename, MAX_FILENAME_LEN);
    c.no_control("originalFilename", &input.original_filename);
    if let Some(filename) = &input.filename {
        c.non_empty("filename", filename);
        c.max_len("filename", filename, MAX_FILENAME_LEN);
        c.no_control("filename", filename);
    }
    if let Some(description) = &input.description {
        c.max_len("description", description, MAX_DESCRIPTION_LEN);
    }

    let profile_type = match input.profile_type.parse::<ProfileType>() {
        Ok(t) => Some(t),
        Err(ProfhubError::Validation(errs)) => {
            c.errors.extend(errs);
            None
        }
        Err(other) => return Err(other),
    };

    let bytes = match STANDARD.decode(input.data.trim()) {
        Ok(b) if b.is_empty() => {
            c.fail("data", "must not be empty");
            None
        }
        Ok(b) if b.len() > max_bytes => {
            c.fail("data", format!("capture exceeds {max_bytes} bytes"));
            None
        }
        Ok(b) => Some(b),
        Err(e) => {
            c.fail("data", format!("is not valid base64: {e}"));
            None
        }
    };

    let (Some(profile_type), Some(bytes)) = (profile_type, bytes) else {
        return Err(ProfhubError::Validation(c.errors));
    };

    let mut draft = ProfileDraft::from_bytes(input.original_filename, profile_type, &bytes);
    draft.filename = input.filename.unwrap_or_else(generated_filename);
    draft.description = input.description;
    draft.metadata = input.metadata.unwrap_or_default();
    draft.is_saved = input.is_saved.unwrap_or(false);
    c.finish(draft)
}

/// Checks a raw upload and turns it into a draft.
///
/// The type comes from `explicit_type` when given, else from the filename.
pub fn validate_upload(
    filename: &str,
    explicit_type: Option<&str>,
    description: Option<String>,
    bytes: &[u8],
    max_bytes: usize,
) -> ProfhubResult<ProfileDraft> {
    let mut c = Checker::default();
    c.non_empty("filename", filename);
    c.max_len("filename", filename, MAX_FILENAME_LEN);
    c.no_control("filename", filename);
    if let Some(d) = &description {
        c.max_len("description", d, MAX_DESCRIPTION_LEN);
    }
    if bytes.is_empty() {
        c.fail("data", "upload body is empty");
    } else if bytes.len() > max_bytes {
        c.fail("data", format!("capture exceeds {max_bytes} bytes"));
    }

    let profile_type = match explicit_type {
        Some(t) => match t.parse::<ProfileType>() {
            Ok(t) => Some(t),
            Err(_) => {
                c.fail("type", format!("unknown profile type {t:?}"));
                None
            }
        },
        None => {
            let detected = ProfileType::detect_in(filename);
            if detected.is_none() {
                c.fail("type", "not given and not detectable from the filename");
            }
            detected
        }
    };

    let Some(profile_type) = profile_type else {
        return Err(ProfhubError::Validation(c.errors));
    };
    let mut draft = ProfileDraft::from_bytes(filename.to_string(), profile_type, bytes);
    draft.description = description;
    c.finish(draft)
}

pub fn validate_profile_update(update: &ProfileUpdate) -> ProfhubResult<()> {
    let mut c = Checker::default();
    if let Some(Some(d)) = &update.description {
        c.max_len("description", d, MAX_DESCRIPTION_LEN);
    }
    c.finish(())
}

/// Runs before any network traffic so a bad request never costs a capture.
pub fn validate_fetch_request(request: &FetchRequest) -> ProfhubResult<()> {
    let mut c = Checker::default();
    if let Some(d) = &request.description {
        c.max_len("description", d, MAX_DESCRIPTION_LEN);
    }
    c.finish(())
}

pub fn validate_new_connection(input: NewConnection) -> ProfhubResult<ConnectionDraft> {
    let mut c = Checker::default();
    c.non_empty("name", &input.name);
    c.max_len("name", &input.name, MAX_FILENAME_LEN);
    if let Err(reason) = check_remote_url(&input.url) {
        c.fail("url", reason);
    }
    c.finish(ConnectionDraft {
        name: input.name.trim().to_string(),
        url: input.url.trim().to_string(),
        is_active: input.is_active.unwrap_or(true),
    })
}

pub fn validate_connection_update(update: &ConnectionUpdate) -> ProfhubResult<()> {
    let mut c = Checker::default();
    if let Some(name) = &update.name {
        c.non_empty("name", name);
        c.max_len("name", name, MAX_FILENAME_LEN);
    }
    if let Some(url) = &update.url {
        if let Err(reason) = check_remote_url(url) {
            c.fail("url", reason);
        }
    }
    c.finish(())
}

/// Accepts absolute `http`/`https` URLs that name a host.
pub fn check_remote_url(raw: &str) -> Result<url::Url, String> {
    let parsed = url::Url::parse(raw.trim()).map_err(|e| format!("invalid URL {raw:?}: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(format!("unsupported scheme {scheme:?} (expected http or https)")),
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err("URL must include a host".to_string());
    }
    Ok(parsed)
}
