//! Namespaces that are never mutated.

/// Kubernetes reserved namespaces excluded from node selector injection
pub const EXEMPT_NAMESPACES: [&str; 3] = ["kube-system", "kube-public", "default"];

/// Check whether a namespace is exempt from mutation
pub fn is_exempt(namespace: &str) -> bool {
    EXEMPT_NAMESPACES.contains(&namespace)
}
