//! Well-known label, annotation and field-selector keys.

/// Label on an EndpointSlice naming the service that owns it.
pub const LABEL_SERVICE_NAME: &str = "kubernetes.io/service-name";

/// Topology key carrying the node name on `v1beta1` endpoint slices.
pub const LABEL_TOPOLOGY_HOSTNAME: &str = "kubernetes.io/hostname";

/// Annotation with the RFC3339 time of the change that triggered an endpoints write.
pub const ANNOTATION_LAST_CHANGE_TRIGGER_TIME: &str = "endpoints.kubernetes.io/last-change-trigger-time";

/// Field-selector key holding the pod phase.
pub const FIELD_POD_PHASE: &str = "status.phase";

/// Field-selector key holding an object's name.
pub const FIELD_NAME: &str = "metadata.name";

/// Field-selector key holding an object's namespace.
pub const FIELD_NAMESPACE: &str = "metadata.namespace";

/// Pods in these phases never serve traffic, so the pod mirror filters them out.
pub const POD_PHASE_FIELD_SELECTOR: &str =
    "status.phase!=Succeeded,status.phase!=Failed,status.phase!=Unknown";
