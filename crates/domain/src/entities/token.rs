//! Token entity - a document placed on the shared surface

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::{Document, DocumentPath};
use crate::error::DomainError;
use crate::ids::{DocumentId, TokenId};

/// Position on the shared surface, in grid units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A named visual indicator that points at document data instead of
/// holding a value itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBar {
    pub value_path: DocumentPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_path: Option<DocumentPath>,
}

/// Current values behind a bar.
#[derive(Debug, Clone, PartialEq)]
pub struct BarReading {
    pub value: Option<Value>,
    pub max: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: TokenId,
    pub document_id: DocumentId,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub bars: BTreeMap<String, TokenBar>,
}

impl Token {
    pub fn new(document_id: DocumentId, position: Position) -> Self {
        Self {
            id: TokenId::new(),
            document_id,
            position,
            hidden: false,
            bars: BTreeMap::new(),
        }
    }

    pub fn with_bar(mut self, name: impl Into<String>, bar: TokenBar) -> Self {
        self.bars.insert(name.into(), bar);
        self
    }

    /// Resolve a bar against the token's document.
    ///
    /// Missing values read as `None`; only an unknown bar or a document
    /// mismatch is an error.
    pub fn resolve_bar(&self, name: &str, document: &Document) -> Result<BarReading, DomainError> {
        if document.id != self.document_id {
            return Err(DomainError::validation(format!(
                "Token {} is not placed from document {}",
                self.id, document.id
            )));
        }
        let bar = self
            .bars
            .get(name)
            .ok_or_else(|| DomainError::not_found("TokenBar", name))?;

        Ok(BarReading {
            value: document.lookup(&bar.value_path).cloned(),
            max: bar
                .max_path
                .as_ref()
                .and_then(|path| document.lookup(path))
                .cloned(),
        })
    }
}
