use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::meta::Resource;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Resource for Namespace {
    const KIND: &'static str = "Namespace";

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        None
    }

    fn resource_version(&self) -> &str {
        &self.resource_version
    }

    fn set_resource_version(&mut self, version: String) {
        self.resource_version = version;
    }

    fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }
}
