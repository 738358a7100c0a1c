use serde::Deserialize;

/// One path-pattern rule inside an `AuthPolicy` (§3, §4.7 — IDOR enforcement).
#[derive(Debug, Clone, Deserialize)]
pub struct AccessRule {
    pub path_pattern: String,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub enforce_owner_claim: Option<String>,
    #[serde(default)]
    pub owner_path_param: Option<String>,
}

impl AccessRule {
    pub fn matches(&self, method: &str, path: &str) -> bool {
        (self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method)))
            && crate::util::glob_match(&self.path_pattern, path)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthPolicyMatch {
    pub role: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthPolicy {
    pub name: String,
    #[serde(rename = "match")]
    pub match_: AuthPolicyMatch,
    pub rules: Vec<AccessRule>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InspectionRuleType {
    Pattern,
    GraphqlDepth,
    GraphqlCost,
    Schema,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InspectLocation {
    Body,
    QueryParams,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Block,
    Log,
}

/// A declarative payload-inspection rule (§4.4 step 3).
#[derive(Debug, Clone, Deserialize)]
pub struct InspectionRule {
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: InspectionRuleType,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub max_cost: Option<u32>,
    #[serde(default)]
    pub body_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub inspect_locations: Vec<InspectLocation>,
    pub path_pattern: String,
    #[serde(default)]
    pub methods: Vec<String>,
    pub action: RuleAction,
}

impl InspectionRule {
    pub fn applies(&self, method: &str, path: &str) -> bool {
        (self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method)))
            && crate::util::glob_match(&self.path_pattern, path)
    }
}

/// Role-driven PII redaction policy (§4.9). First matching role wins.
#[derive(Debug, Clone, Deserialize)]
pub struct PiiRedactionPolicy {
    pub role: String,
    #[serde(default)]
    pub redact_entities: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_rule_matches_glob_and_method() {
        let rule = AccessRule {
            path_pattern: "/users/*/profile".into(),
            methods: vec!["GET".into()],
            enforce_owner_claim: Some("user_id".into()),
            owner_path_param: Some("user_id".into()),
        };
        assert!(rule.matches("GET", "/users/42/profile"));
        assert!(rule.matches("get", "/users/42/profile"));
        assert!(!rule.matches("POST", "/users/42/profile"));
        assert!(!rule.matches("GET", "/orders/42"));
    }

    #[test]
    fn inspection_rule_applies_respects_method_set() {
        let rule = InspectionRule {
            name: "block-deletes".into(),
            rule_type: InspectionRuleType::Pattern,
            pattern: Some("(?i)drop table".into()),
            max_depth: None,
            max_cost: None,
            body_schema: None,
            inspect_locations: vec![InspectLocation::Body],
            path_pattern: "/api/*".into(),
            methods: vec!["POST".into()],
            action: RuleAction::Block,
        };
        assert!(rule.applies("POST", "/api/query"));
        assert!(!rule.applies("GET", "/api/query"));
        assert!(!rule.applies("POST", "/other"));
    }
}
