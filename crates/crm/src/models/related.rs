//! Related-module descriptors discovered from CRM metadata

use serde::{Deserialize, Serialize};

use super::Record;

/// A module linked to another through a relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedModule {
    /// API name of the related (linking) module
    pub module: String,
    /// Relation type as reported by the metadata endpoint
    pub relation_type: String,
}

impl RelatedModule {
    /// Relation type for multi-select lookups
    pub const MULTISELECT_LOOKUP: &'static str = "multiselectlookup";

    pub fn new(module: impl Into<String>, relation_type: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            relation_type: relation_type.into(),
        }
    }

    pub fn multiselect_lookup(module: impl Into<String>) -> Self {
        Self::new(module, Self::MULTISELECT_LOOKUP)
    }

    pub fn is_multiselect_lookup(&self) -> bool {
        self.relation_type.eq_ignore_ascii_case(Self::MULTISELECT_LOOKUP)
    }
}

/// Records of one related module, labeled with their descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedCollection {
    pub module: RelatedModule,
    pub records: Vec<Record>,
}
