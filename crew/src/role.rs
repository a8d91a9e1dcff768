//! Worker roles and the role registry
//!
//! A role is a named worker persona: a fixed objective, a narrative
//! (backstory) used to frame the prompt, and the set of external
//! capabilities its agent may call.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// External operation a role may invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Query string → ranked results
    Search,
    /// URL → page content
    Scrape,
}

impl Capability {
    pub const ALL: [Capability; 2] = [Capability::Search, Capability::Scrape];

    /// Function name advertised to the language model
    pub fn tool_name(self) -> &'static str {
        match self {
            Capability::Search => "search_internet",
            Capability::Scrape => "scrape_website",
        }
    }

    pub fn from_tool_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.tool_name() == name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Search => f.write_str("search"),
            Capability::Scrape => f.write_str("scrape"),
        }
    }
}

/// An immutable worker persona
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    id: String,
    objective: String,
    capabilities: BTreeSet<Capability>,
    narrative: String,
}

impl Role {
    /// Create a role; identifier and objective must be non-blank
    pub fn new(
        id: impl Into<String>,
        objective: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
        narrative: impl Into<String>,
    ) -> Result<Self> {
        let id = id.into();
        let objective = objective.into();

        if id.trim().is_empty() {
            return Err(PipelineError::configuration("role identifier must not be empty"));
        }
        if objective.trim().is_empty() {
            return Err(PipelineError::configuration(format!(
                "role '{}' has an empty objective",
                id
            )));
        }

        Ok(Self {
            id,
            objective,
            capabilities: capabilities.into_iter().collect(),
            narrative: narrative.into(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn objective(&self) -> &str {
        &self.objective
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    pub fn narrative(&self) -> &str {
        &self.narrative
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Registry of available roles, in registration order
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    roles: Vec<Arc<Role>>,
}

impl RoleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self { roles: Vec::new() }
    }

    /// Register a role; identifiers must be unique
    pub fn register(&mut self, role: Role) -> Result<()> {
        if self.contains(role.id()) {
            return Err(PipelineError::configuration(format!(
                "role '{}' is already registered",
                role.id()
            )));
        }
        self.roles.push(Arc::new(role));
        Ok(())
    }

    /// Register a role (builder style)
    pub fn with_role(mut self, role: Role) -> Result<Self> {
        self.register(role)?;
        Ok(self)
    }

    /// Get a role by identifier
    pub fn get(&self, id: &str) -> Option<&Arc<Role>> {
        self.roles.iter().find(|r| r.id() == id)
    }

    /// Check if a role exists
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// List all role identifiers
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(|r| r.id())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Role>> {
        self.roles.iter()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
