use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Placeholder shown for model or association ids the lookup table doesn't know.
pub const UNRESOLVED_LABEL: &str = "--";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub model_name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

/// One association type as listed by the model service, e.g. `{"asst_id": "run", "asst_name": "运行"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationType {
    pub asst_id: String,
    pub asst_name: String,
}

/// Display names and icons for model and association ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupTable {
    #[serde(default)]
    models: HashMap<String, ModelInfo>,
    #[serde(default)]
    associations: HashMap<String, String>,
}

impl LookupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_association_types(types: impl IntoIterator<Item = AssociationType>) -> Self {
        let mut table = Self::new();
        for assoc in types {
            table.insert_association(assoc);
        }
        table
    }

    pub fn with_models(mut self, models: impl IntoIterator<Item = ModelInfo>) -> Self {
        for model in models {
            self.insert_model(model);
        }
        self
    }

    pub fn insert_model(&mut self, model: ModelInfo) {
        self.models.insert(model.model_id.clone(), model);
    }

    pub fn insert_association(&mut self, assoc: AssociationType) {
        self.associations.insert(assoc.asst_id, assoc.asst_name);
    }

    pub fn resolve_model_name(&self, model_id: &str) -> &str {
        self.models
            .get(model_id)
            .map(|m| m.model_name.as_str())
            .unwrap_or(UNRESOLVED_LABEL)
    }

    pub fn resolve_model_icon(&self, model_id: &str) -> Option<&str> {
        self.models.get(model_id).and_then(|m| m.icon.as_deref())
    }

    pub fn resolve_association_name(&self, assoc_id: Option<&str>) -> &str {
        let Some(assoc_id) = assoc_id else {
            return UNRESOLVED_LABEL;
        };
        match self.associations.get(assoc_id) {
            Some(name) => name.as_str(),
            None => {
                tracing::debug!("Association type {} not found in lookup table", assoc_id);
                UNRESOLVED_LABEL
            }
        }
    }
}
