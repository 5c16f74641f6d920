use crate::domain::{
    ConnectionProfile, DisplayPrefs, Event, EventBus, ProfileDraft, ProfilePatch,
};
use crate::errors::{CoreError, Result};
use std::sync::{Arc, RwLock};

/// ConnectionRegistry owns the catalog of saved host profiles.
///
/// Pure CRUD with no network side effects. All operations are synchronous
/// and non-blocking; insertion order is preserved so search ties resolve
/// deterministically. Deleting a profile that has a live session is handled
/// one level up by [`crate::application::Workspace`], which closes the
/// session first.
pub struct ConnectionRegistry {
    profiles: RwLock<Vec<ConnectionProfile>>,
    event_bus: Arc<EventBus>,
}

impl ConnectionRegistry {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            profiles: RwLock::new(Vec::new()),
            event_bus,
        }
    }

    /// Validate a draft and add it to the catalog.
    pub fn create(&self, draft: ProfileDraft) -> Result<ConnectionProfile> {
        validate_draft(&draft)?;

        let profile = ConnectionProfile {
            id: uuid::Uuid::new_v4().to_string(),
            display: draft
                .display
                .unwrap_or_else(|| DisplayPrefs::default_for(draft.protocol)),
            name: draft.name,
            protocol: draft.protocol,
            host: draft.host,
            port: draft.port,
            username: draft.username,
            credential: draft.credential,
            proxy: draft.proxy,
            group: draft.group,
            tags: draft.tags,
            color: draft.color,
            last_connected: None,
            is_connected: false,
            created_at: chrono::Utc::now(),
        };

        {
            let mut profiles = self.write();
            profiles.push(profile.clone());
        }
        self.event_bus.publish(Event::ProfileCreated(profile.clone()));
        Ok(profile)
    }

    /// Apply a partial update to an existing profile. The id is immutable.
    pub fn update(&self, id: &str, patch: ProfilePatch) -> Result<ConnectionProfile> {
        let updated = {
            let mut profiles = self.write();
            let profile = profiles
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| CoreError::NotFound(format!("Profile not found: {}", id)))?;

            if let Some(name) = patch.name {
                profile.name = name;
            }
            if let Some(host) = patch.host {
                profile.host = host;
            }
            if let Some(port) = patch.port {
                profile.port = port;
            }
            if let Some(username) = patch.username {
                profile.username = username;
            }
            if let Some(credential) = patch.credential {
                profile.credential = credential;
            }
            if let Some(proxy) = patch.proxy {
                profile.proxy = proxy;
            }
            if let Some(display) = patch.display {
                profile.display = display;
            }
            if let Some(group) = patch.group {
                profile.group = group;
            }
            if let Some(tags) = patch.tags {
                profile.tags = tags;
            }
            if let Some(color) = patch.color {
                profile.color = color;
            }

            validate_profile(profile)?;
            profile.clone()
        };

        self.event_bus.publish(Event::ProfileUpdated(updated.clone()));
        Ok(updated)
    }

    /// Remove a profile from the catalog.
    pub fn delete(&self, id: &str) -> Result<()> {
        {
            let mut profiles = self.write();
            let before = profiles.len();
            profiles.retain(|p| p.id != id);
            if profiles.len() == before {
                return Err(CoreError::NotFound(format!("Profile not found: {}", id)));
            }
        }
        self.event_bus.publish(Event::ProfileRemoved(id.to_string()));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<ConnectionProfile> {
        self.read().iter().find(|p| p.id == id).cloned()
    }

    pub fn list(&self) -> Vec<ConnectionProfile> {
        self.read().clone()
    }

    pub fn list_by_group(&self, group: &str) -> Vec<ConnectionProfile> {
        self.read()
            .iter()
            .filter(|p| p.group.as_deref() == Some(group))
            .cloned()
            .collect()
    }

    /// Distinct group names in first-seen order.
    pub fn groups(&self) -> Vec<String> {
        let profiles = self.read();
        let mut groups: Vec<String> = Vec::new();
        for profile in profiles.iter() {
            if let Some(group) = &profile.group {
                if !groups.contains(group) {
                    groups.push(group.clone());
                }
            }
        }
        groups
    }

    /// Case-insensitive search over name, host, username and tags.
    ///
    /// Results are ranked: exact name match first, then name prefix, then
    /// any substring hit, ties broken by insertion order.
    pub fn search(&self, query: &str) -> Vec<ConnectionProfile> {
        let q = query.to_lowercase();
        if q.is_empty() {
            return self.list();
        }

        let profiles = self.read();
        let mut exact = Vec::new();
        let mut prefix = Vec::new();
        let mut substring = Vec::new();

        for profile in profiles.iter() {
            let name = profile.name.to_lowercase();
            if name == q {
                exact.push(profile.clone());
            } else if name.starts_with(&q) {
                prefix.push(profile.clone());
            } else if name.contains(&q)
                || profile.host.to_lowercase().contains(&q)
                || profile.username.to_lowercase().contains(&q)
                || profile.tags.iter().any(|t| t.to_lowercase().contains(&q))
            {
                substring.push(profile.clone());
            }
        }

        exact.extend(prefix);
        exact.extend(substring);
        exact
    }

    /// Maintain the derived connection flag; called by the session manager
    /// on state transitions.
    pub fn mark_connected(&self, id: &str, connected: bool) {
        let mut profiles = self.write();
        if let Some(profile) = profiles.iter_mut().find(|p| p.id == id) {
            profile.mark_connected(connected);
        }
    }

    /// Replace the whole catalog, used when restoring a persisted snapshot.
    pub(crate) fn replace_all(&self, mut loaded: Vec<ConnectionProfile>) {
        // runtime fields are never authoritative across restarts
        for profile in loaded.iter_mut() {
            profile.is_connected = false;
        }
        *self.write() = loaded;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ConnectionProfile>> {
        self.profiles.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<ConnectionProfile>> {
        self.profiles.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn validate_draft(draft: &ProfileDraft) -> Result<()> {
    validate_fields(&draft.name, &draft.host, &draft.username, draft.port)
}

fn validate_profile(profile: &ConnectionProfile) -> Result<()> {
    validate_fields(&profile.name, &profile.host, &profile.username, profile.port)
}

fn validate_fields(name: &str, host: &str, username: &str, port: u16) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation("profile name must not be empty".to_string()));
    }
    if host.trim().is_empty() {
        return Err(CoreError::Validation("host must not be empty".to_string()));
    }
    if username.trim().is_empty() {
        return Err(CoreError::Validation("username must not be empty".to_string()));
    }
    if port == 0 {
        return Err(CoreError::Validation("port must be in [1, 65535]".to_string()));
    }
    Ok(())
}
