//! Zip archive of stored captures.

use std::io::{Cursor, Write as _};

use crate::{Profile, ProfhubResult, ProfileSummary};

pub const MANIFEST_NAME: &str = "manifest.json";

/// Archive entry name for a capture: `<id>-<original filename>`, flattened.
pub fn entry_name(profile: &Profile) -> String {
    let base = profile
        .original_filename
        .replace(['/', '\\'], "_")
        .trim_start_matches('.')
        .to_string();
    let base = if base.is_empty() { profile.filename.clone() } else { base };
    format!("{}-{}", profile.id, base)
}

/// Builds an archive holding every capture plus a `manifest.json` of summaries.
pub fn export_zip(profiles: &[Profile]) -> ProfhubResult<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let manifest: Vec<ProfileSummary> = profiles.iter().map(ProfileSummary::from).collect();
    zip.start_file(MANIFEST_NAME, options)?;
    zip.write_all(&serde_json::to_vec_pretty(&manifest)?)?;

    for profile in profiles {
        let bytes = profile.decode_data()?;
        zip.start_file(entry_name(profile), options)?;
        zip.write_all(&bytes)?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}
