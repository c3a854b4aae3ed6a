use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    Active,
    Inactive,
}

impl EntityState {
    pub fn from_raw(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("on") {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "on",
            Self::Inactive => "off",
        }
    }

    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub entity_id: String,
    pub old_state: Option<String>,
    pub new_state: String,
}

impl StateChange {
    pub fn state(&self) -> EntityState {
        EntityState::from_raw(&self.new_state)
    }
}
