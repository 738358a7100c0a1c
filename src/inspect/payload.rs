//! Payload inspector (§4.4): canonicalize, sweep for curated signatures,
//! then evaluate the declarative per-path rule set.

use jsonschema::JSONSchema;
use serde_json::Value;

use crate::errors::AppError;
use crate::models::policy::{InspectLocation, InspectionRule, InspectionRuleType, RuleAction};
use crate::signatures;

/// Iterated URL-decode (max 3 rounds or fixed point), HTML entity decode,
/// null-byte strip, lower-case. Idempotent: canonicalizing a canonical
/// form returns it unchanged (§8 invariant).
pub fn canonicalize(input: &str) -> String {
    let mut decoded = input.to_string();
    for _ in 0..3 {
        let next = urlencoding::decode(&decoded)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| decoded.clone());
        if next == decoded {
            break;
        }
        decoded = next;
    }

    decoded = decode_html_entities(&decoded);
    decoded = decoded.replace('\0', "");
    decoded.to_lowercase()
}

fn decode_html_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'&' {
            if let Some(end) = input[i..].find(';').map(|p| i + p) {
                let entity = &input[i + 1..end];
                if let Some(decoded) = decode_entity(entity) {
                    out.push(decoded);
                    i = end + 1;
                    continue;
                }
            }
        }
        let ch = input[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => return Some('<'),
        "gt" => return Some('>'),
        "amp" => return Some('&'),
        "quot" => return Some('"'),
        "apos" | "#39" | "#x27" => return Some('\''),
        _ => {}
    }
    if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(dec) = entity.strip_prefix('#') {
        return dec.parse::<u32>().ok().and_then(char::from_u32);
    }
    None
}

/// Step 2: signature sweep against the canonical query and canonical body.
pub fn sweep_signatures(canonical_query: &str, canonical_body: &str) -> Result<(), AppError> {
    if let Some(sig) = signatures::scan(canonical_query) {
        return Err(malicious(sig, "query parameters"));
    }
    if let Some(sig) = signatures::scan(canonical_body) {
        return Err(malicious(sig, "request body"));
    }
    Ok(())
}

fn malicious(sig: &signatures::Signature, location: &str) -> AppError {
    crate::audit::emit_critical(
        "WAF_SIGNATURE_VIOLATION",
        &[("pattern", sig.name), ("location", location)],
    );
    AppError::MaliciousSignature {
        pattern: sig.name.to_string(),
        location: location.to_string(),
    }
}

/// Step 3: declarative rule evaluation, in declaration order.
pub fn evaluate_rules(
    rules: &[InspectionRule],
    method: &str,
    path: &str,
    raw_body: &[u8],
    canonical_query: &str,
    canonical_body: &str,
) -> Result<(), AppError> {
    for rule in rules {
        if !rule.applies(method, path) {
            continue;
        }
        let violation = match rule.rule_type {
            InspectionRuleType::Schema => check_schema(rule, raw_body),
            InspectionRuleType::Pattern => check_pattern(rule, canonical_query, canonical_body),
            InspectionRuleType::GraphqlDepth => check_graphql_depth(rule, raw_body),
            InspectionRuleType::GraphqlCost => check_graphql_cost(rule, canonical_body),
        };

        match violation {
            RuleOutcome::Clean => continue,
            RuleOutcome::SchemaInvalid(msg) => return Err(AppError::SchemaInvalid(msg)),
            RuleOutcome::Violation(location) => {
                crate::audit::emit_critical(
                    "WAF_VIOLATION",
                    &[("rule", &rule.name), ("location", &location)],
                );
                if rule.action == RuleAction::Block {
                    return Err(AppError::PolicyViolation {
                        reason: format!("rule '{}' triggered on {}", rule.name, location),
                    });
                }
            }
        }
    }
    Ok(())
}

enum RuleOutcome {
    Clean,
    Violation(String),
    SchemaInvalid(String),
}

fn check_schema(rule: &InspectionRule, raw_body: &[u8]) -> RuleOutcome {
    let Some(schema_value) = &rule.body_schema else {
        return RuleOutcome::Clean;
    };
    let Ok(body_str) = std::str::from_utf8(raw_body) else {
        return RuleOutcome::SchemaInvalid("request body is not valid UTF-8".to_string());
    };
    let body_json: Value = match serde_json::from_str(body_str) {
        Ok(v) => v,
        Err(e) => return RuleOutcome::SchemaInvalid(format!("invalid JSON body: {}", e)),
    };

    let compiled = match JSONSchema::compile(schema_value) {
        Ok(c) => c,
        Err(e) => return RuleOutcome::SchemaInvalid(format!("invalid schema '{}': {}", rule.name, e)),
    };

    if let Err(mut errors) = compiled.validate(&body_json) {
        let first = errors.next().map(|e| e.to_string()).unwrap_or_default();
        return RuleOutcome::SchemaInvalid(first);
    }
    RuleOutcome::Clean
}

fn check_pattern(rule: &InspectionRule, canonical_query: &str, canonical_body: &str) -> RuleOutcome {
    let Some(pattern) = &rule.pattern else {
        return RuleOutcome::Clean;
    };
    let Ok(re) = regex::Regex::new(&format!("(?i){}", pattern)) else {
        return RuleOutcome::Clean;
    };
    if rule.inspect_locations.contains(&InspectLocation::Body) && re.is_match(canonical_body) {
        return RuleOutcome::Violation("request body".to_string());
    }
    if rule.inspect_locations.contains(&InspectLocation::QueryParams) && re.is_match(canonical_query)
    {
        return RuleOutcome::Violation("query parameters".to_string());
    }
    RuleOutcome::Clean
}

/// Maximum nesting of objects/arrays; scalars don't add depth.
fn json_depth(value: &Value, current: u32) -> u32 {
    match value {
        Value::Object(map) => map
            .values()
            .map(|v| json_depth(v, current + 1))
            .max()
            .unwrap_or(current + 1),
        Value::Array(items) => items
            .iter()
            .map(|v| json_depth(v, current + 1))
            .max()
            .unwrap_or(current + 1),
        _ => current,
    }
}

fn check_graphql_depth(rule: &InspectionRule, raw_body: &[u8]) -> RuleOutcome {
    let Some(max_depth) = rule.max_depth else {
        return RuleOutcome::Clean;
    };
    let Ok(body) = serde_json::from_slice::<Value>(raw_body) else {
        return RuleOutcome::Clean;
    };
    let depth = json_depth(&body, 0);
    if depth > max_depth {
        RuleOutcome::Violation(format!("GraphQL query depth ({})", depth))
    } else {
        RuleOutcome::Clean
    }
}

/// Approximate cost = count of `[:\s](\w+)\s*\{` tokens in the canonical
/// body — adopted verbatim from the source heuristic (§9 open question;
/// it under-counts aliased selections by design, not by oversight).
fn check_graphql_cost(rule: &InspectionRule, canonical_body: &str) -> RuleOutcome {
    let Some(max_cost) = rule.max_cost else {
        return RuleOutcome::Clean;
    };
    static COST_PATTERN: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"[:\s](\w+)\s*\{").unwrap());
    let cost = COST_PATTERN.find_iter(canonical_body).count() as u32;
    if cost > max_cost {
        RuleOutcome::Violation(format!("GraphQL query cost ({})", cost))
    } else {
        RuleOutcome::Clean
    }
}
