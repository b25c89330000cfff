//! Static upgrade tree: node definitions, benefit kinds, and catalog validation.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::state::GameState;

const DEFAULT_NODES_DATA: &str = include_str!("../assets/nodes.json");

/// What a node grants once unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Benefit {
    /// Added to base click power.
    ClickBonus(f64),
    /// Added to base passive income per second.
    PassiveIncome(f64),
    /// Multiplied into the global multiplier.
    Multiplier(f64),
}

impl Benefit {
    #[must_use]
    pub const fn value(self) -> f64 {
        match self {
            Self::ClickBonus(v) | Self::PassiveIncome(v) | Self::Multiplier(v) => v,
        }
    }

    #[must_use]
    pub const fn kind_label(self) -> &'static str {
        match self {
            Self::ClickBonus(_) => "clickBonus",
            Self::PassiveIncome(_) => "passiveIncome",
            Self::Multiplier(_) => "multiplier",
        }
    }
}

impl fmt::Display for Benefit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClickBonus(v) => write!(f, "+{v} Labour per click"),
            Self::PassiveIncome(v) => write!(f, "+{v} Labour per second"),
            Self::Multiplier(v) => write!(f, "{v}x Global Multiplier"),
        }
    }
}

/// A single purchasable node in the upgrade tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Price in labour units.
    pub cost: f64,
    pub benefit: Benefit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor_text: Option<String>,
    /// Node that must be unlocked before this one can be purchased.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerequisite: Option<String>,
}

/// How a node presents relative to the current game state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Unlocked,
    Available { affordable: bool },
    Locked,
}

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("duplicate node id '{0}'")]
    DuplicateId(String),
    #[error("node '{node}' requires unknown node '{prerequisite}'")]
    DanglingPrerequisite { node: String, prerequisite: String },
    #[error("node '{0}' lists itself as its prerequisite")]
    SelfPrerequisite(String),
    #[error("prerequisite cycle detected through node '{0}'")]
    Cycle(String),
    #[error("node '{node}' has invalid cost {cost}")]
    InvalidCost { node: String, cost: f64 },
    #[error("node '{node}' has invalid {kind} value {value}")]
    InvalidBenefit {
        node: String,
        kind: &'static str,
        value: f64,
    },
    #[error("catalog JSON could not be parsed: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    nodes: Vec<NodeDefinition>,
}

/// Ordered, validated set of node definitions.
#[derive(Debug, Clone)]
pub struct NodeCatalog {
    nodes: Vec<NodeDefinition>,
    index: HashMap<String, usize>,
}

impl NodeCatalog {
    /// Build a catalog, checking id uniqueness, prerequisite references,
    /// acyclicity, and numeric sanity.
    ///
    /// # Errors
    ///
    /// Returns the first integrity violation found.
    pub fn from_nodes(nodes: Vec<NodeDefinition>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), position).is_some() {
                return Err(CatalogError::DuplicateId(node.id.clone()));
            }
            validate_numbers(node)?;
        }

        for node in &nodes {
            let Some(prerequisite) = node.prerequisite.as_deref() else {
                continue;
            };
            if prerequisite == node.id {
                return Err(CatalogError::SelfPrerequisite(node.id.clone()));
            }
            if !index.contains_key(prerequisite) {
                return Err(CatalogError::DanglingPrerequisite {
                    node: node.id.clone(),
                    prerequisite: prerequisite.to_string(),
                });
            }
        }

        let catalog = Self { nodes, index };
        catalog.check_acyclic()?;
        Ok(catalog)
    }

    /// Parse a catalog from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the nodes are inconsistent.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|err| CatalogError::Parse(err.to_string()))?;
        Self::from_nodes(file.nodes)
    }

    /// Load the reference catalog bundled with the crate.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled asset fails validation.
    pub fn load_from_static() -> Result<Self, CatalogError> {
        Self::from_json(DEFAULT_NODES_DATA)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&NodeDefinition> {
        self.index.get(id).map(|&position| &self.nodes[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeDefinition> {
        self.nodes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Classify a node against the given state, or `None` for unknown ids.
    #[must_use]
    pub fn status(&self, id: &str, state: &GameState) -> Option<NodeStatus> {
        let node = self.get(id)?;
        if state.has_unlocked(&node.id) {
            return Some(NodeStatus::Unlocked);
        }
        let available = node
            .prerequisite
            .as_deref()
            .is_none_or(|prerequisite| state.has_unlocked(prerequisite));
        if available {
            Some(NodeStatus::Available {
                affordable: state.labour_units >= node.cost,
            })
        } else {
            Some(NodeStatus::Locked)
        }
    }

    /// Nodes that could be purchased next, in catalog order.
    pub fn next_available<'a>(
        &'a self,
        state: &'a GameState,
    ) -> impl Iterator<Item = &'a NodeDefinition> + 'a {
        self.nodes.iter().filter(move |node| {
            matches!(
                self.status(&node.id, state),
                Some(NodeStatus::Available { .. })
            )
        })
    }

    /// Fraction of catalog nodes the state has unlocked, in `0.0..=1.0`.
    #[must_use]
    pub fn completion_ratio(&self, state: &GameState) -> f64 {
        if self.nodes.is_empty() {
            return 1.0;
        }
        let unlocked = self
            .nodes
            .iter()
            .filter(|node| state.has_unlocked(&node.id))
            .count();
        crate::numbers::count_ratio(unlocked, self.nodes.len())
    }

    fn check_acyclic(&self) -> Result<(), CatalogError> {
        // Each node has at most one parent, so a chain longer than the
        // catalog itself must revisit a node.
        for start in &self.nodes {
            let mut steps = 0usize;
            let mut cursor = start.prerequisite.as_deref();
            while let Some(id) = cursor {
                steps += 1;
                if steps > self.nodes.len() || id == start.id {
                    return Err(CatalogError::Cycle(start.id.clone()));
                }
                cursor = self.get(id).and_then(|node| node.prerequisite.as_deref());
            }
        }
        Ok(())
    }
}

fn validate_numbers(node: &NodeDefinition) -> Result<(), CatalogError> {
    if !node.cost.is_finite() || node.cost < 0.0 {
        return Err(CatalogError::InvalidCost {
            node: node.id.clone(),
            cost: node.cost,
        });
    }
    let value = node.benefit.value();
    let valid = match node.benefit {
        Benefit::ClickBonus(v) | Benefit::PassiveIncome(v) => v.is_finite(),
        Benefit::Multiplier(v) => v.is_finite() && v > 0.0,
    };
    if valid {
        Ok(())
    } else {
        Err(CatalogError::InvalidBenefit {
            node: node.id.clone(),
            kind: node.benefit.kind_label(),
            value,
        })
    }
}
