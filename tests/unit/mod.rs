// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for nodeselector-webhook.
//!
//! These tests exercise the mutation pipeline through the public API,
//! without a Kubernetes cluster or an HTTP server.

#[path = "../common/mod.rs"]
mod common;

mod classifier_tests {
    use nodeselector_webhook::mutation::{EXEMPT_NAMESPACES, is_exempt};

    #[test]
    fn test_exempt_set() {
        assert_eq!(EXEMPT_NAMESPACES, ["kube-system", "kube-public", "default"]);
        for namespace in EXEMPT_NAMESPACES {
            assert!(is_exempt(namespace));
        }
    }

    #[test]
    fn test_other_system_namespaces_not_exempt() {
        assert!(!is_exempt("kube-node-lease"));
        assert!(!is_exempt("cert-manager"));
    }
}

mod resolver_tests {
    use nodeselector_webhook::mutation::resolve;

    use crate::common::fixtures::standard_rules;

    #[test]
    fn test_rule_and_default() {
        let rules = standard_rules();
        assert_eq!(resolve("team-a", &rules), "tier=gpu");
        assert_eq!(resolve("team-b", &rules), "tier=standard");
    }

    #[test]
    fn test_exempt_namespace_still_resolves() {
        // Resolution is independent of exemption; decide() skips it
        assert_eq!(resolve("kube-system", &standard_rules()), "tier=standard");
    }
}

mod patch_tests {
    use nodeselector_webhook::mutation::{NODE_SELECTOR_PATH, PatchValue, build_patch};
    use serde_json::json;

    #[test]
    fn test_single_add_operation() {
        let ops = build_patch("tier=gpu,zone=eu-west-1a").unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path(), NODE_SELECTOR_PATH);

        let PatchValue::NodeSelector(labels) = ops[0].value();
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn test_wire_shape() {
        let ops = build_patch("kubernetes.io/os=linux").unwrap();
        assert_eq!(
            serde_json::to_string(&ops).unwrap(),
            r#"[{"op":"add","path":"/spec/nodeSelector","value":{"kubernetes.io/os":"linux"}}]"#
        );
    }

    #[test]
    fn test_unterminated_term_rejected() {
        assert!(build_patch("tier=gpu,zone").is_err());
        assert!(build_patch("tier=gpu,").is_err());
    }

    #[test]
    fn test_json_value_is_plain_map() {
        let ops = build_patch("a=1").unwrap();
        assert_eq!(serde_json::to_value(ops[0].value()).unwrap(), json!({"a": "1"}));
    }
}

mod decision_tests {
    use nodeselector_webhook::mutation::{PatchOperation, PatchValue};
    use nodeselector_webhook::{AdmissionAttributes, Decision, MutationError, RuleConfig, decide};
    use std::collections::BTreeMap;

    use crate::common::fixtures::standard_rules;

    fn selector(pairs: &[(&str, &str)]) -> Vec<PatchOperation> {
        let labels: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        vec![PatchOperation::Add {
            path: "/spec/nodeSelector".to_string(),
            value: PatchValue::NodeSelector(labels),
        }]
    }

    #[test]
    fn test_team_a_gets_gpu() {
        let decision = decide(&AdmissionAttributes::pod("u", "team-a"), &standard_rules());
        assert_eq!(decision.unwrap(), Decision::Mutate(selector(&[("tier", "gpu")])));
    }

    #[test]
    fn test_team_b_gets_default() {
        let decision = decide(&AdmissionAttributes::pod("u", "team-b"), &standard_rules());
        assert_eq!(
            decision.unwrap(),
            Decision::Mutate(selector(&[("tier", "standard")]))
        );
    }

    #[test]
    fn test_kube_system_allowed() {
        let decision = decide(&AdmissionAttributes::pod("u", "kube-system"), &standard_rules());
        assert_eq!(decision.unwrap(), Decision::Allow);
    }

    #[test]
    fn test_deployments_unsupported() {
        let request = AdmissionAttributes::pod("u", "team-a").with_resource("deployments");
        assert!(matches!(
            decide(&request, &standard_rules()),
            Err(MutationError::UnsupportedResource { .. })
        ));
    }

    #[test]
    fn test_empty_default_yields_empty_selector() {
        let decision = decide(&AdmissionAttributes::pod("u", "team-z"), &RuleConfig::default());
        assert_eq!(decision.unwrap(), Decision::Mutate(selector(&[])));
    }

    #[test]
    fn test_parse_error_is_failure_not_partial_patch() {
        let config = RuleConfig::new("tier=standard,broken", Vec::<(String, String)>::new());
        let err = decide(&AdmissionAttributes::pod("u", "team-z"), &config).unwrap_err();
        assert_eq!(err.reason(), "InvalidSelector");
    }
}

mod response_tests {
    use nodeselector_webhook::webhooks::{DENIAL_CODE, assemble};
    use nodeselector_webhook::{AdmissionAttributes, decide};

    use crate::common::fixtures::standard_rules;

    #[test]
    fn test_uid_echoed_on_every_path() {
        let rules = standard_rules();
        let requests = [
            AdmissionAttributes::pod("uid-a", "team-a"),
            AdmissionAttributes::pod("uid-b", "kube-system"),
            AdmissionAttributes::pod("uid-c", "team-a").with_resource("secrets"),
        ];

        for request in &requests {
            let response = assemble(decide(request, &rules), &request.uid);
            assert_eq!(response.uid, request.uid);
        }
    }

    #[test]
    fn test_denial_shape() {
        let request = AdmissionAttributes::pod("uid-d", "team-a").with_resource("secrets");
        let response = assemble(decide(&request, &standard_rules()), &request.uid);

        assert!(!response.allowed);
        assert_eq!(response.result.code, DENIAL_CODE);
        assert!(!response.result.message.is_empty());
    }
}
