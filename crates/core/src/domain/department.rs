use serde::{Deserialize, Serialize};

/// The six municipal departments served by the decision pipeline.
///
/// The set is closed: request routing, snapshot reads, and coordination keys
/// are all typed against this enum rather than free-form strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Water,
    Fire,
    Engineering,
    Health,
    Finance,
    Sanitation,
}

impl Department {
    pub const ALL: [Department; 6] = [
        Department::Water,
        Department::Fire,
        Department::Engineering,
        Department::Health,
        Department::Finance,
        Department::Sanitation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Water => "water",
            Self::Fire => "fire",
            Self::Engineering => "engineering",
            Self::Health => "health",
            Self::Finance => "finance",
            Self::Sanitation => "sanitation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "water" => Some(Self::Water),
            "fire" => Some(Self::Fire),
            "engineering" => Some(Self::Engineering),
            "health" => Some(Self::Health),
            "finance" => Some(Self::Finance),
            "sanitation" => Some(Self::Sanitation),
            _ => None,
        }
    }
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
