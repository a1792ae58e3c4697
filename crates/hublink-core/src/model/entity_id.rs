// ── Entity identity ──
//
// Every hub entity is addressed by `domain.object_id`. The domain prefix
// decides which services apply, so it is parsed once into a tagged value
// instead of being split out of the string at every call site.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;
use thiserror::Error;

// ── EntityId ────────────────────────────────────────────────────────

/// Validated `domain.object_id` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    raw: String,
    dot: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid entity id '{0}' (expected 'domain.object_id')")]
pub struct EntityIdError(pub String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The raw domain prefix, e.g. `"light"`.
    pub fn domain_str(&self) -> &str {
        &self.raw[..self.dot]
    }

    pub fn domain(&self) -> Domain {
        Domain::parse(self.domain_str())
    }

    pub fn object_id(&self) -> &str {
        &self.raw[self.dot + 1..]
    }
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        match raw.find('.') {
            Some(dot) if dot > 0 && dot + 1 < raw.len() && !raw[dot + 1..].contains('.') => {
                Ok(Self { raw, dot })
            }
            _ => Err(EntityIdError(raw)),
        }
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.raw
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

// ── Domain ──────────────────────────────────────────────────────────

/// Entity domain, parsed from the id prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Domain {
    Light,
    Switch,
    Fan,
    InputBoolean,
    Cover,
    Lock,
    Climate,
    MediaPlayer,
    Scene,
    Script,
    Button,
    InputButton,
    Number,
    InputNumber,
    Select,
    InputSelect,
    Sensor,
    BinarySensor,
    Camera,
    #[strum(default)]
    Other(String),
}

impl Domain {
    /// Never fails: unknown prefixes land in [`Domain::Other`].
    pub fn parse(prefix: &str) -> Self {
        prefix
            .parse()
            .unwrap_or_else(|_| Self::Other(prefix.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Light => "light",
            Self::Switch => "switch",
            Self::Fan => "fan",
            Self::InputBoolean => "input_boolean",
            Self::Cover => "cover",
            Self::Lock => "lock",
            Self::Climate => "climate",
            Self::MediaPlayer => "media_player",
            Self::Scene => "scene",
            Self::Script => "script",
            Self::Button => "button",
            Self::InputButton => "input_button",
            Self::Number => "number",
            Self::InputNumber => "input_number",
            Self::Select => "select",
            Self::InputSelect => "input_select",
            Self::Sensor => "sensor",
            Self::BinarySensor => "binary_sensor",
            Self::Camera => "camera",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
