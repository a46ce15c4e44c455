//! In-memory record store with an optional JSON snapshot on disk.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{
    Connection, ConnectionDraft, ConnectionUpdate, Profile, ProfhubResult, ProfileDraft,
    ProfileSummary, ProfileType, ProfileUpdate,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreState {
    /// Last id handed out; ids are never reused, even after deletes.
    #[serde(default)]
    last_profile_id: u64,
    #[serde(default)]
    last_connection_id: u64,
    #[serde(default)]
    profiles: BTreeMap<u64, Profile>,
    #[serde(default)]
    connections: BTreeMap<u64, Connection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub profiles: usize,
    pub saved_profiles: usize,
    pub connections: usize,
    pub active_connections: usize,
    pub total_bytes: u64,
    pub by_type: BTreeMap<ProfileType, usize>,
}

#[derive(Debug, Default)]
pub struct Store {
    state: RwLock<StoreState>,
    snapshot_path: Option<PathBuf>,
}

impl Store {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens a snapshot-backed store. A missing snapshot starts empty.
    pub fn open(path: &Path) -> ProfhubResult<Self> {
        let state = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice::<StoreState>(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(err) => return Err(err.into()),
        };
        tracing::info!(
            path = %path.display(),
            profiles = state.profiles.len(),
            connections = state.connections.len(),
            "opened store snapshot"
        );
        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    pub fn list_profiles(&self) -> Vec<ProfileSummary> {
        self.state.read().profiles.values().map(ProfileSummary::from).collect()
    }

    /// Newest first by upload time; equal timestamps fall back to newest id.
    pub fn recent_profiles(&self, limit: usize) -> Vec<ProfileSummary> {
        let state = self.state.read();
        let mut rows = state.profiles.values().collect::<Vec<_>>();
        rows.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        rows.into_iter().take(limit).map(ProfileSummary::from).collect()
    }

    pub fn saved_profiles(&self) -> Vec<ProfileSummary> {
        self.state
            .read()
            .profiles
            .values()
            .filter(|p| p.is_saved)
            .map(ProfileSummary::from)
            .collect()
    }

    pub fn all_profiles(&self) -> Vec<Profile> {
        self.state.read().profiles.values().cloned().collect()
    }

    pub fn get_profile(&self, id: u64) -> Option<Profile> {
        self.state.read().profiles.get(&id).cloned()
    }

    pub fn create_profile(&self, draft: ProfileDraft) -> Profile {
        self.create_profile_at(draft, OffsetDateTime::now_utc())
    }

    pub fn create_profile_at(&self, draft: ProfileDraft, uploaded_at: OffsetDateTime) -> Profile {
        let mut state = self.state.write();
        state.last_profile_id += 1;
        let profile = Profile {
            id: state.last_profile_id,
            filename: draft.filename,
            original_filename: draft.original_filename,
            profile_type: draft.profile_type,
            size: draft.size,
            description: draft.description,
            metadata: draft.metadata,
            uploaded_at,
            is_saved: draft.is_saved,
            checksum: draft.checksum,
            data: draft.data,
        };
        state.profiles.insert(profile.id, profile.clone());
        self.persist(&state);
        tracing::debug!(id = profile.id, kind = %profile.profile_type, size = profile.size, "stored profile");
        profile
    }

    /// `None` when no profile has this id.
    pub fn update_profile(&self, id: u64, update: ProfileUpdate) -> Option<Profile> {
        let mut state = self.state.write();
        let profile = state.profiles.get_mut(&id)?;
        if let Some(description) = update.description {
            profile.description = description;
        }
        if let Some(saved) = update.is_saved {
            profile.is_saved = saved;
        }
        let updated = profile.clone();
        self.persist(&state);
        Some(updated)
    }

    /// Returns whether a profile was removed; a repeated delete reports `false`.
    pub fn delete_profile(&self, id: u64) -> bool {
        let mut state = self.state.write();
        let removed = state.profiles.remove(&id).is_some();
        if removed {
            self.persist(&state);
        }
        removed
    }

    pub fn list_connections(&self) -> Vec<Connection> {
        self.state.read().connections.values().cloned().collect()
    }

    pub fn get_connection(&self, id: u64) -> Option<Connection> {
        self.state.read().connections.get(&id).cloned()
    }

    pub fn create_connection(&self, draft: ConnectionDraft) -> Connection {
        let mut state = self.state.write();
        state.last_connection_id += 1;
        let connection = Connection {
            id: state.last_connection_id,
            name: draft.name,
            url: draft.url,
            last_connected: None,
            is_active: draft.is_active,
        };
        state.connections.insert(connection.id, connection.clone());
        self.persist(&state);
        connection
    }

    pub fn update_connection(&self, id: u64, update: ConnectionUpdate) -> Option<Connection> {
        let mut state = self.state.write();
        let connection = state.connections.get_mut(&id)?;
        if let Some(name) = update.name {
            connection.name = name.trim().to_string();
        }
        if let Some(url) = update.url {
            connection.url = url.trim().to_string();
        }
        if let Some(active) = update.is_active {
            connection.is_active = active;
        }
        let updated = connection.clone();
        self.persist(&state);
        Some(updated)
    }

    /// Stamps `lastConnected` with the current time.
    pub fn touch_connection(&self, id: u64) -> Option<Connection> {
        let mut state = self.state.write();
        let connection = state.connections.get_mut(&id)?;
        connection.last_connected = Some(OffsetDateTime::now_utc());
        let updated = connection.clone();
        self.persist(&state);
        Some(updated)
    }

    pub fn delete_connection(&self, id: u64) -> bool {
        let mut state = self.state.write();
        let removed = state.connections.remove(&id).is_some();
        if removed {
            self.persist(&state);
        }
        removed
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.state.read();
        let mut by_type = BTreeMap::new();
        for p in state.profiles.values() {
            *by_type.entry(p.profile_type).or_insert(0) += 1;
        }
        StoreStats {
            profiles: state.profiles.len(),
            saved_profiles: state.profiles.values().filter(|p| p.is_saved).count(),
            connections: state.connections.len(),
            active_connections: state.connections.values().filter(|c| c.is_active).count(),
            total_bytes: state.profiles.values().map(|p| p.size).sum(),
            by_type,
        }
    }

    // Called with the write lock held so snapshots land in mutation order.
    fn persist(&self, state: &StoreState) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        if let Err(err) = write_snapshot(path, state) {
            tracing::warn!("failed to write store snapshot {}: {err}", path.display());
        }
    }
}

fn write_snapshot(path: &Path, state: &StoreState) -> ProfhubResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
