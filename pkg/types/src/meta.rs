use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use pkg_constants::labels::{FIELD_NAME, FIELD_NAMESPACE};

/// Common accessors over every object the control plane serves.
///
/// `fields` is what field selectors are evaluated against; kinds with extra
/// selectable fields (e.g. pod phase) extend the default set.
pub trait Resource {
    /// Kind name used in logs and store keys.
    const KIND: &'static str;

    fn name(&self) -> &str;

    /// `None` for cluster-scoped kinds.
    fn namespace(&self) -> Option<&str>;

    fn resource_version(&self) -> &str;

    fn set_resource_version(&mut self, version: String);

    fn labels(&self) -> &HashMap<String, String>;

    fn fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        fields.insert(FIELD_NAME.to_string(), self.name().to_string());
        if let Some(ns) = self.namespace() {
            fields.insert(FIELD_NAMESPACE.to_string(), ns.to_string());
        }
        fields
    }

    /// `<namespace>/<name>`, or just `<name>` for cluster-scoped kinds.
    fn key(&self) -> String {
        match self.namespace() {
            Some(ns) if !ns.is_empty() => format!("{}/{}", ns, self.name()),
            _ => self.name().to_string(),
        }
    }
}

/// Reference from an endpoint address to the object backing it (usually a Pod).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    #[serde(default)]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Implements `Resource` for a namespaced type with flat
/// `name` / `namespace` / `resource_version` / `labels` fields.
#[macro_export]
macro_rules! namespaced_resource {
    ($ty:ty, $kind:literal) => {
        impl $crate::meta::Resource for $ty {
            const KIND: &'static str = $kind;

            fn name(&self) -> &str {
                &self.name
            }

            fn namespace(&self) -> Option<&str> {
                Some(&self.namespace)
            }

            fn resource_version(&self) -> &str {
                &self.resource_version
            }

            fn set_resource_version(&mut self, version: String) {
                self.resource_version = version;
            }

            fn labels(&self) -> &std::collections::HashMap<String, String> {
                &self.labels
            }
        }
    };
}
