//! Authorization / IDOR inspector (§4.7). Path-pattern rules, scoped by
//! client role, that compare a URL path segment against a named token
//! claim. The first matching rule is authoritative; no match ⇒ pass
//! (the upstream performs the real authorization).

use crate::errors::AppError;
use crate::models::claims::UserClaims;
use crate::models::policy::AuthPolicy;

fn path_segment(path: &str, _param_name: &str) -> Option<String> {
    // Convention matching the source: the segment right after the
    // resource collection name (`users`) is the owner id.
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    segments
        .iter()
        .position(|s| *s == "users")
        .and_then(|i| segments.get(i + 1))
        .map(|s| s.to_string())
}

pub fn enforce(
    policies: &[AuthPolicy],
    role: &str,
    claims: &UserClaims,
    method: &str,
    path: &str,
) -> Result<(), AppError> {
    for policy in policies {
        if policy.match_.role != role {
            continue;
        }
        for rule in &policy.rules {
            if !rule.matches(method, path) {
                continue;
            }
            let Some(claim_name) = &rule.enforce_owner_claim else {
                return Ok(());
            };
            let owner_param = rule.owner_path_param.as_deref().unwrap_or(claim_name);
            let Some(path_owner) = path_segment(path, owner_param) else {
                return Ok(());
            };
            let claim_value = claims.get(claim_name).and_then(|v| v.as_str().map(str::to_string));
            if let Some(claim_value) = claim_value {
                if claim_value != path_owner {
                    crate::audit::emit_critical(
                        "IDOR_BLOCKED",
                        &[("rule", &policy.name), ("path", path)],
                    );
                    return Err(AppError::Forbidden(
                        "you do not have permission to access this resource".to_string(),
                    ));
                }
            }
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::policy::{AccessRule, AuthPolicyMatch};

    fn policy() -> AuthPolicy {
        AuthPolicy {
            name: "customer-self".into(),
            match_: AuthPolicyMatch { role: "customer".into() },
            rules: vec![AccessRule {
                path_pattern: "/users/*/profile".into(),
                methods: vec!["GET".into()],
                enforce_owner_claim: Some("user_id".into()),
                owner_path_param: Some("user_id".into()),
            }],
        }
    }

    #[test]
    fn matching_owner_passes() {
        let claims = UserClaims {
            user_id: Some("42".into()),
            role: Some("customer".into()),
            ..Default::default()
        };
        assert!(enforce(&[policy()], "customer", &claims, "GET", "/users/42/profile").is_ok());
    }

    #[test]
    fn mismatched_owner_is_forbidden() {
        let claims = UserClaims {
            user_id: Some("99".into()),
            role: Some("customer".into()),
            ..Default::default()
        };
        let err = enforce(&[policy()], "customer", &claims, "GET", "/users/42/profile").unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn no_matching_rule_passes() {
        let claims = UserClaims::anonymous();
        assert!(enforce(&[policy()], "customer", &claims, "GET", "/orders/1").is_ok());
    }

    #[test]
    fn non_matching_role_passes() {
        let claims = UserClaims::anonymous();
        assert!(enforce(&[policy()], "admin", &claims, "GET", "/users/42/profile").is_ok());
    }
}
