//! nginx-ingress manifests applied to the bootstrap node

const INGRESS_BASE: &str = include_str!("manifests/ingress-base.yaml");
const INGRESS_RBAC: &str = include_str!("manifests/ingress-rbac.yaml");
const INGRESS_DAEMONSET: &str = include_str!("manifests/ingress-daemonset.yaml");

/// Namespace the ingress controller runs in
pub const INGRESS_NAMESPACE: &str = "ingress-nginx";

/// Name of the ingress controller DaemonSet
pub const INGRESS_DAEMONSET_NAME: &str = "nginx-ingress-controller";

/// Full ingress controller deployment as a multi-document manifest
pub fn ingress_manifest() -> String {
    [INGRESS_BASE, INGRESS_RBAC, INGRESS_DAEMONSET]
        .iter()
        .map(|doc| doc.trim_end())
        .collect::<Vec<_>>()
        .join("\n---\n")
        + "\n"
}

/// RBAC objects only, for repairing controller permissions
pub fn ingress_rbac_manifest() -> String {
    format!("{}\n", INGRESS_RBAC.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn kinds(manifest: &str) -> Vec<String> {
        serde_yaml::Deserializer::from_str(manifest)
            .map(|doc| {
                let value = serde_yaml::Value::deserialize(doc).unwrap();
                value["kind"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn test_ingress_manifest_documents() {
        let kinds = kinds(&ingress_manifest());
        assert_eq!(
            kinds,
            vec![
                "Namespace",
                "ConfigMap",
                "ServiceAccount",
                "ClusterRole",
                "Role",
                "RoleBinding",
                "ClusterRoleBinding",
                "DaemonSet",
                "IngressClass",
            ]
        );
    }

    #[test]
    fn test_rbac_manifest_is_subset() {
        let kinds = kinds(&ingress_rbac_manifest());
        assert_eq!(kinds.len(), 4);
        assert!(kinds.iter().all(|k| k.contains("Role")));
    }
}
