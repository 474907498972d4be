use serde::{Deserialize, Serialize};

/// Which upstream representation backs the endpoint mirror.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointSourceMode {
    /// Pick from the capabilities the control plane advertises.
    #[default]
    Auto,
    #[serde(rename = "endpointslice-v1")]
    EndpointSliceV1,
    #[serde(rename = "endpointslice-v1beta1")]
    EndpointSliceV1beta1,
    Endpoints,
}

/// Pod record handling. `verified` keeps a pod mirror so pod addresses can be checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PodsMode {
    #[default]
    Disabled,
    Verified,
}

/// DNS cache configuration file (YAML).
///
/// Example `dns-config.yaml`:
/// ```yaml
/// zones: [cluster.local.]
/// pods: verified
/// endpoint-source: auto
/// label-selector: "environment=prod"
/// local-ips: [10.0.0.5]
/// ttl: 5
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsConfigFile {
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default, alias = "endpoint-name-mode")]
    pub endpoint_name_mode: bool,
    #[serde(default)]
    pub pods: PodsMode,
    /// Keep an endpoint mirror. Defaults to on.
    #[serde(default)]
    pub endpoints: Option<bool>,
    #[serde(default, alias = "endpoint-source")]
    pub endpoint_source: EndpointSourceMode,
    #[serde(default, alias = "label-selector")]
    pub label_selector: Option<String>,
    #[serde(default, alias = "namespace-label-selector")]
    pub namespace_label_selector: Option<String>,
    #[serde(default, alias = "local-ips")]
    pub local_ips: Vec<String>,
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub ttl: Option<u32>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}
