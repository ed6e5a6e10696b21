use serde::{Deserialize, Serialize};

/// Cached guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: u64,
    pub name: String,
    pub owner_id: u64,
}

impl Guild {
    /// The @everyone role shares its id with the guild
    pub fn everyone_role_id(&self) -> u64 {
        self.id
    }
}

/// Cached guild role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: u64,
    pub guild_id: u64,
    pub name: String,
    /// Guild-wide permission bits granted by this role
    pub permissions: u64,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub managed: bool,
}

impl Role {
    pub fn is_everyone(&self) -> bool {
        self.id == self.guild_id
    }
}

/// Cached guild member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: u64,
    pub guild_id: u64,
    #[serde(default)]
    pub role_ids: Vec<u64>,
    #[serde(default)]
    pub nickname: Option<String>,
}

impl Member {
    pub fn has_role(&self, role_id: u64) -> bool {
        self.role_ids.contains(&role_id)
    }
}
