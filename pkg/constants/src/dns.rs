//! DNS naming and cache index constants.

/// Index: pods by their assigned IP.
pub const POD_IP_INDEX: &str = "PodIP";

/// Index: services by `<name>.<namespace>`.
pub const SVC_NAME_NAMESPACE_INDEX: &str = "ServiceNameNamespace";

/// Index: services by any of their cluster or external IPs.
pub const SVC_IP_INDEX: &str = "ServiceIP";

/// Index: endpoint groups by `<service>.<namespace>`.
pub const EP_NAME_NAMESPACE_INDEX: &str = "EndpointNameNamespace";

/// Index: endpoint groups by every member address.
pub const EP_IP_INDEX: &str = "EndpointsIP";

/// Index: services by their external-name alias.
pub const EXTERNAL_NAME_INDEX: &str = "externalName";

/// Label inserted between the namespace and the zone for service names.
pub const SVC: &str = "svc";

/// Owner-name prefix used when this instance announces itself directly.
pub const DEFAULT_NS_NAME: &str = "ns.dns.";

/// Zone served when the config names none.
pub const DEFAULT_ZONE: &str = "cluster.local.";

/// TTL for synthesized address records, in seconds.
pub const DEFAULT_TTL: u32 = 5;

/// Cluster IP value marking a headless service.
pub const CLUSTER_IP_NONE: &str = "None";
