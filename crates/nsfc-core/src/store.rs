//! Persistent store port (groups and users) and a JSON-file backed implementation.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, ChatKind, UserId},
    errors::Error,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: ChatId,
    pub kind: ChatKind,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub group_ids: Vec<ChatId>,
}

/// Store operations used by the membership branch.
///
/// Lookups of absent records fail with [`Error::NotFound`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_group(&self, id: ChatId) -> Result<Group>;
    async fn set_group(&self, group: Group) -> Result<()>;
    async fn update_group(&self, group: Group) -> Result<()>;

    async fn get_user(&self, id: UserId) -> Result<User>;
    async fn add_group_to_user(&self, user: UserId, group: ChatId) -> Result<()>;
    async fn remove_group_from_user(&self, user: UserId, group: ChatId) -> Result<()>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    groups: Vec<Group>,
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Default)]
struct Tables {
    groups: HashMap<ChatId, Group>,
    users: HashMap<UserId, User>,
}

/// In-memory store, optionally snapshotted to a JSON file after each write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot if the file exists; later writes go back to it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = load_snapshot(&path)?.unwrap_or_default();
        let tables = Tables {
            groups: snapshot.groups.into_iter().map(|g| (g.id, g)).collect(),
            users: snapshot.users.into_iter().map(|u| (u.id, u)).collect(),
        };
        Ok(Self {
            tables: Mutex::new(tables),
            snapshot_path: Some(path),
        })
    }

    pub async fn insert_user(&self, user: User) -> Result<()> {
        let mut t = self.tables.lock().await;
        t.users.insert(user.id, user);
        self.persist(&t)
    }

    fn persist(&self, t: &Tables) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let mut snapshot = Snapshot {
            groups: t.groups.values().cloned().collect(),
            users: t.users.values().cloned().collect(),
        };
        snapshot.groups.sort_by_key(|g| g.id);
        snapshot.users.sort_by_key(|u| u.id);
        save_snapshot(path, &snapshot)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_group(&self, id: ChatId) -> Result<Group> {
        self.tables
            .lock()
            .await
            .groups
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("group {}", id.0)))
    }

    async fn set_group(&self, group: Group) -> Result<()> {
        let mut t = self.tables.lock().await;
        t.groups.insert(group.id, group);
        self.persist(&t)
    }

    async fn update_group(&self, group: Group) -> Result<()> {
        let mut t = self.tables.lock().await;
        let Some(existing) = t.groups.get_mut(&group.id) else {
            return Err(Error::NotFound(format!("group {}", group.id.0)));
        };
        *existing = group;
        self.persist(&t)
    }

    async fn get_user(&self, id: UserId) -> Result<User> {
        self.tables
            .lock()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("user {}", id.0)))
    }

    async fn add_group_to_user(&self, user: UserId, group: ChatId) -> Result<()> {
        let mut t = self.tables.lock().await;
        let Some(u) = t.users.get_mut(&user) else {
            return Err(Error::NotFound(format!("user {}", user.0)));
        };
        if !u.group_ids.contains(&group) {
            u.group_ids.push(group);
        }
        self.persist(&t)
    }

    async fn remove_group_from_user(&self, user: UserId, group: ChatId) -> Result<()> {
        let mut t = self.tables.lock().await;
        let Some(u) = t.users.get_mut(&user) else {
            return Err(Error::NotFound(format!("user {}", user.0)));
        };
        u.group_ids.retain(|g| *g != group);
        self.persist(&t)
    }
}

fn load_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let txt = std::fs::read_to_string(path)?;
    if txt.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&txt)?))
}

fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let txt = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, txt)?;
    Ok(())
}
