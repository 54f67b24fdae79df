#![forbid(unsafe_code)]

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    Scene,
    Character,
    Location,
    Theme,
    PlotPoint,
    Arc,
}

pub const ALL_ENTITY_TYPES: &[EntityType] = &[
    EntityType::Scene,
    EntityType::Character,
    EntityType::Location,
    EntityType::Theme,
    EntityType::PlotPoint,
    EntityType::Arc,
];

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Character => "character",
            Self::Location => "location",
            Self::Theme => "theme",
            Self::PlotPoint => "plot_point",
            Self::Arc => "arc",
        }
    }

    /// Accepts the storage spelling as well as the CamelCase names producers tend to send.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "scene" => Some(Self::Scene),
            "character" => Some(Self::Character),
            "location" => Some(Self::Location),
            "theme" => Some(Self::Theme),
            "plotpoint" => Some(Self::PlotPoint),
            "arc" => Some(Self::Arc),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = UnknownEntityType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| UnknownEntityType(value.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownEntityType(pub String);

impl std::fmt::Display for UnknownEntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown entity_type: {}", self.0)
    }
}

impl std::error::Error for UnknownEntityType {}

impl Serialize for EntityType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntityType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| serde::de::Error::custom(UnknownEntityType(raw)))
    }
}
