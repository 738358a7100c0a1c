//! Admin (§4.12) — the single hot-reload operation, gated to clients
//! whose role is `"admin"`.

use crate::cartographer::{parse_openapi_paths, Cartographer};
use crate::errors::AppError;

/// Parses `spec_content` as YAML or JSON, validates it carries a `paths`
/// key, then atomically replaces the cartographer's `KNOWN` set and
/// clears `SHADOW`. Returns the new `KNOWN` size for the audit event.
pub fn apply_spec_push(cartographer: &Cartographer, spec_content: &str) -> Result<usize, AppError> {
    let doc: serde_json::Value = serde_yaml::from_str(spec_content)
        .map_err(|e| AppError::BadRequest(format!("failed to parse YAML/JSON content: {}", e)))?;

    if !doc.is_object() || doc.get("paths").is_none() {
        return Err(AppError::BadRequest(
            "invalid OpenAPI spec format: must be an object with a 'paths' key".to_string(),
        ));
    }

    let known = parse_openapi_paths(&doc);
    let size = known.len();
    cartographer.replace_known(known);

    crate::audit::emit_critical(
        "API_SPEC_UPDATED",
        &[("known_endpoints", &size.to_string())],
    );

    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::ShadowPolicy;

    #[test]
    fn rejects_content_without_paths() {
        let cart = Cartographer::empty(ShadowPolicy::Log);
        let err = apply_spec_push(&cart, "{}").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn rejects_unparseable_content() {
        let cart = Cartographer::empty(ShadowPolicy::Log);
        let err = apply_spec_push(&cart, "not: [valid: yaml: at all:").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn accepts_well_formed_spec_and_clears_shadow() {
        let cart = Cartographer::empty(ShadowPolicy::Log);
        cart.check("GET", "/undocumented").unwrap();
        assert_eq!(cart.shadow_len(), 1);

        let spec = r#"
paths:
  /users/{id}:
    get: {}
"#;
        let size = apply_spec_push(&cart, spec).unwrap();
        assert_eq!(size, 1);
        assert_eq!(cart.shadow_len(), 0);
        assert_eq!(cart.known_len(), 1);
    }
}
