use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::model::{ActionDefinition, CombatantDefinition};

pub fn builtin_catalogs() -> HashMap<&'static str, &'static str> {
    HashMap::from([("starter", include_str!("../content/starter.json"))])
}

/// Parse one of the embedded catalogs into a store.
pub fn builtin_store(name: &str) -> Result<RecordStore> {
    let text = builtin_catalogs()
        .get(name)
        .copied()
        .ok_or_else(|| anyhow::anyhow!("no built-in catalog named '{}'", name))?;
    RecordStore::parse(text, CatalogFormat::Json)
        .with_context(|| format!("failed to parse built-in catalog '{}'", name))
}

/// On-disk shape of a record store snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
    #[serde(default)]
    pub combatants: Vec<CombatantDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    Json,
    Yaml,
}

impl CatalogFormat {
    /// `.yaml`/`.yml` are YAML, everything else is treated as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => CatalogFormat::Yaml,
            _ => CatalogFormat::Json,
        }
    }
}

/// Read-only snapshot of action and combatant records, keyed by id.
///
/// Built once per run and shared by reference with every trial.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    actions: HashMap<u32, Arc<ActionDefinition>>,
    combatants: HashMap<u32, Arc<CombatantDefinition>>,
}

impl RecordStore {
    pub fn from_catalog(catalog: Catalog) -> Result<Self, SimError> {
        let mut store = RecordStore::default();
        for action in catalog.actions {
            store.insert_action(action)?;
        }
        for combatant in catalog.combatants {
            store.insert_combatant(combatant)?;
        }
        tracing::debug!(
            actions = store.actions.len(),
            combatants = store.combatants.len(),
            "record store ready"
        );
        Ok(store)
    }

    pub fn parse(text: &str, format: CatalogFormat) -> Result<Self> {
        let catalog: Catalog = match format {
            CatalogFormat::Json => serde_json::from_str(text).context("invalid catalog JSON")?,
            CatalogFormat::Yaml => serde_yaml::from_str(text).context("invalid catalog YAML")?,
        };
        Ok(Self::from_catalog(catalog)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog: {}", path.display()))?;
        Self::parse(&text, CatalogFormat::from_path(path))
            .with_context(|| format!("failed to load catalog: {}", path.display()))
    }

    /// Add or replace an action record.
    pub fn insert_action(&mut self, action: ActionDefinition) -> Result<(), SimError> {
        action.validate().map_err(|reason| SimError::InvalidRecord {
            kind: "action",
            id: action.id,
            reason,
        })?;
        self.actions.insert(action.id, Arc::new(action));
        Ok(())
    }

    /// Add or replace a combatant record.
    pub fn insert_combatant(&mut self, combatant: CombatantDefinition) -> Result<(), SimError> {
        combatant
            .validate()
            .map_err(|reason| SimError::InvalidRecord {
                kind: "combatant",
                id: combatant.id,
                reason,
            })?;
        self.combatants.insert(combatant.id, Arc::new(combatant));
        Ok(())
    }

    pub fn get_action(&self, id: u32) -> Option<&Arc<ActionDefinition>> {
        self.actions.get(&id)
    }

    pub fn get_combatant(&self, id: u32) -> Option<&Arc<CombatantDefinition>> {
        self.combatants.get(&id)
    }

    /// Batched lookup in request order. Unknown ids are skipped.
    pub fn get_actions(&self, ids: &[u32]) -> Vec<Arc<ActionDefinition>> {
        lookup(&self.actions, ids, "action")
    }

    /// Batched lookup in request order; duplicates are kept, unknown ids skipped.
    pub fn get_combatants(&self, ids: &[u32]) -> Vec<Arc<CombatantDefinition>> {
        lookup(&self.combatants, ids, "combatant")
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn combatant_count(&self) -> usize {
        self.combatants.len()
    }
}

fn lookup<T>(records: &HashMap<u32, Arc<T>>, ids: &[u32], kind: &str) -> Vec<Arc<T>> {
    ids.iter()
        .filter_map(|id| {
            let found = records.get(id).cloned();
            if found.is_none() {
                tracing::debug!(id, kind, "skipping unknown record id");
            }
            found
        })
        .collect()
}
