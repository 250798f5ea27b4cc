//! Document entity - generic content records placed into a session
//!
//! A document carries two halves:
//! - `definition_data`: stable content (stat blocks, item definitions)
//! - `state`: a mutable JSON object split into lifecycle sections
//!
//! The core only guarantees that `state` exists and that keys it does not
//! know about pass through untouched. Each section's shape belongs to
//! whichever extension declared it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DomainError;
use crate::ids::{DocumentId, ParticipantId};

/// Well-known `state` section names.
pub mod sections {
    /// Reset at the start of a document's turn.
    pub const TURN_STATE: &str = "turnState";
    /// Reset when an encounter ends.
    pub const ENCOUNTER_STATE: &str = "encounterState";
    /// Reset when the session is reset.
    pub const SESSION_STATE: &str = "sessionState";
    /// Never reset by lifecycle events.
    pub const PERSISTENT_STATE: &str = "persistentState";
}

/// A generic content entity (character, actor, item).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    /// Free-form content label ("character", "actor", "item")
    pub kind: String,
    pub name: String,
    /// Participant controlling this document; `None` means leader-controlled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<ParticipantId>,
    #[serde(default)]
    pub definition_data: Value,
    #[serde(default)]
    pub state: Map<String, Value>,
}

impl Document {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new(),
            kind: kind.into(),
            name: name.into(),
            owner: None,
            definition_data: Value::Object(Map::new()),
            state: Map::new(),
        }
    }

    pub fn with_id(mut self, id: DocumentId) -> Self {
        self.id = id;
        self
    }

    pub fn with_owner(mut self, owner: ParticipantId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_definition(mut self, definition_data: Value) -> Self {
        self.definition_data = definition_data;
        self
    }

    pub fn with_section(mut self, name: impl Into<String>, value: Value) -> Self {
        self.state.insert(name.into(), value);
        self
    }

    /// Get one state section.
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.state.get(name)
    }

    /// Replace one state section, leaving every other key untouched.
    pub fn set_section(&mut self, name: impl Into<String>, value: Value) {
        self.state.insert(name.into(), value);
    }

    pub fn is_owned_by(&self, participant: ParticipantId) -> bool {
        self.owner == Some(participant)
    }

    /// Read a value through a `state.*` / `definitionData.*` path.
    pub fn lookup(&self, path: &DocumentPath) -> Option<&Value> {
        let mut segments = path.segments.iter();
        let mut current = match path.root {
            PathRoot::State => {
                let first = segments.next()?;
                self.state.get(first)?
            }
            PathRoot::DefinitionData => &self.definition_data,
        };

        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Which half of a document a path reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRoot {
    State,
    DefinitionData,
}

impl PathRoot {
    fn as_str(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::DefinitionData => "definitionData",
        }
    }
}

/// Dotted path into a document, e.g. `state.turnState.hp` or
/// `definitionData.attributes.hp.max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentPath {
    root: PathRoot,
    segments: Vec<String>,
}

impl DocumentPath {
    pub fn root(&self) -> PathRoot {
        self.root
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl FromStr for DocumentPath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let root = match parts.next() {
            Some("state") => PathRoot::State,
            Some("definitionData") => PathRoot::DefinitionData,
            _ => {
                return Err(DomainError::parse(format!(
                    "Document path must start with 'state' or 'definitionData': {s}"
                )))
            }
        };

        let segments: Vec<String> = parts.map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(DomainError::parse(format!(
                "Document path has an empty segment: {s}"
            )));
        }
        if root == PathRoot::State && segments.is_empty() {
            return Err(DomainError::parse(format!(
                "State path must name a section: {s}"
            )));
        }

        Ok(Self { root, segments })
    }
}

impl TryFrom<String> for DocumentPath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocumentPath> for String {
    fn from(value: DocumentPath) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root.as_str())?;
        for segment in &self.segments {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}
