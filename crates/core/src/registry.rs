use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::correction::{CorrectionHeuristic, DEFAULT_AMBIGUOUS_LABELS, DEFAULT_COMMAND_PREFIXES};
use crate::intent::IntentLabel;
use crate::models::{ActionClass, IntentPrediction};

/// Labels with a non-informational action class. Anything absent here is
/// answered from the knowledge base.
pub const DEFAULT_ACTION_TABLE: &[(IntentLabel, ActionClass)] = &[
    (IntentLabel::LostOrStolenCard, ActionClass::SafetyAction),
    (IntentLabel::LostOrStolenPhone, ActionClass::SafetyAction),
    (IntentLabel::TransferIntoAccount, ActionClass::TransferAction),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("label {label} mapped to both {first:?} and {second:?}")]
    ConflictingMapping {
        label: IntentLabel,
        first: ActionClass,
        second: ActionClass,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionRegistry {
    mappings: HashMap<IntentLabel, ActionClass>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        let mappings = DEFAULT_ACTION_TABLE.iter().cloned().collect();
        Self { mappings }
    }
}

impl ActionRegistry {
    pub fn new(
        entries: impl IntoIterator<Item = (IntentLabel, ActionClass)>,
    ) -> std::result::Result<Self, RegistryError> {
        let mut mappings = HashMap::new();
        for (label, class) in entries {
            match mappings.get(&label) {
                Some(existing) if *existing != class => {
                    return Err(RegistryError::ConflictingMapping {
                        label,
                        first: *existing,
                        second: class,
                    });
                }
                Some(_) => {}
                None => {
                    mappings.insert(label, class);
                }
            }
        }
        Ok(Self { mappings })
    }

    pub fn classify(&self, intent: &IntentPrediction) -> ActionClass {
        self.class_of(&intent.label)
    }

    pub fn class_of(&self, label: &IntentLabel) -> ActionClass {
        self.mappings
            .get(label)
            .copied()
            .unwrap_or(ActionClass::InformationalQuery)
    }

    pub fn labels_for(&self, class: ActionClass) -> Vec<&IntentLabel> {
        let mut labels = self
            .mappings
            .iter()
            .filter(|(_, mapped)| **mapped == class)
            .map(|(label, _)| label)
            .collect::<Vec<_>>();
        labels.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        labels
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// On-disk form of the routing tables, reviewed independently of the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingTablesFile {
    #[serde(default = "default_ambiguous")]
    pub ambiguous_labels: Vec<IntentLabel>,
    #[serde(default = "default_canonical")]
    pub canonical_transfer: IntentLabel,
    #[serde(default = "default_prefixes")]
    pub command_prefixes: Vec<String>,
    #[serde(default = "default_mappings")]
    pub mappings: BTreeMap<String, ActionClass>,
}

impl Default for RoutingTablesFile {
    fn default() -> Self {
        Self {
            ambiguous_labels: default_ambiguous(),
            canonical_transfer: default_canonical(),
            command_prefixes: default_prefixes(),
            mappings: default_mappings(),
        }
    }
}

fn default_ambiguous() -> Vec<IntentLabel> {
    DEFAULT_AMBIGUOUS_LABELS.to_vec()
}

fn default_canonical() -> IntentLabel {
    IntentLabel::TransferIntoAccount
}

fn default_prefixes() -> Vec<String> {
    DEFAULT_COMMAND_PREFIXES
        .iter()
        .map(|prefix| prefix.to_string())
        .collect()
}

fn default_mappings() -> BTreeMap<String, ActionClass> {
    DEFAULT_ACTION_TABLE
        .iter()
        .map(|(label, class)| (label.as_str().to_string(), *class))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct RoutingTables {
    pub correction: CorrectionHeuristic,
    pub registry: ActionRegistry,
}

impl RoutingTables {
    pub fn from_tables_file(file: RoutingTablesFile) -> std::result::Result<Self, RegistryError> {
        let registry = ActionRegistry::new(
            file.mappings
                .into_iter()
                .map(|(label, class)| (IntentLabel::parse(&label), class)),
        )?;
        let correction = CorrectionHeuristic::new(
            file.ambiguous_labels,
            file.canonical_transfer,
            file.command_prefixes,
        );
        Ok(Self {
            correction,
            registry,
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: RoutingTablesFile =
            serde_json::from_str(raw).context("invalid routing tables json")?;
        Ok(Self::from_tables_file(file)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref()).with_context(|| {
            format!(
                "failed reading routing tables at {}",
                path.as_ref().display()
            )
        })?;
        Self::from_json_str(&raw)
    }
}
