//! Cartographer — maintains the known/shadow endpoint sets (§4.3).
//!
//! `KNOWN` is hot-swappable (published wholesale by the admin endpoint);
//! `SHADOW` is mutated incrementally, once per undocumented endpoint, as
//! traffic discovers it. Readers always see a consistent `(known, shadow)`
//! pair per request — `KNOWN` uses `ArcSwap` so a reader's snapshot never
//! tears mid-admin-reload (§5).

use std::collections::HashSet;
use std::sync::RwLock;

use arc_swap::ArcSwap;
use serde_json::Value;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowPolicy {
    Block,
    Log,
}

impl ShadowPolicy {
    pub fn from_config(s: &str) -> Self {
        if s.eq_ignore_ascii_case("block") {
            ShadowPolicy::Block
        } else {
            ShadowPolicy::Log
        }
    }
}

pub struct Cartographer {
    known: ArcSwap<HashSet<String>>,
    shadow: RwLock<HashSet<String>>,
    pub on_shadow_discovered: ShadowPolicy,
}

impl Cartographer {
    pub fn new(known: HashSet<String>, on_shadow_discovered: ShadowPolicy) -> Self {
        Self {
            known: ArcSwap::from_pointee(known),
            shadow: RwLock::new(HashSet::new()),
            on_shadow_discovered,
        }
    }

    pub fn empty(on_shadow_discovered: ShadowPolicy) -> Self {
        Self::new(HashSet::new(), on_shadow_discovered)
    }

    pub async fn fetch_openapi(client: &reqwest::Client, url: &str) -> anyhow::Result<HashSet<String>> {
        let resp = client.get(url).send().await?.error_for_status()?;
        let text = resp.text().await?;
        let doc: Value = serde_yaml::from_str(&text)?;
        Ok(parse_openapi_paths(&doc))
    }

    /// §4.3: in `KNOWN` or already in `SHADOW` ⇒ clean. Otherwise insert
    /// into `SHADOW`, emit a critical audit event, and — in block mode —
    /// fail the request with 501.
    pub fn check(&self, method: &str, path: &str) -> Result<(), AppError> {
        let key = endpoint_key(method, path);
        let known = self.known.load();
        if known.contains(&key) {
            return Ok(());
        }

        let already_shadow = self.shadow.read().unwrap().contains(&key);
        if already_shadow {
            return Ok(());
        }

        self.shadow.write().unwrap().insert(key.clone());
        crate::audit::emit_critical("SHADOW_API_DISCOVERED", &[("endpoint", &key)]);

        match self.on_shadow_discovered {
            ShadowPolicy::Block => Err(AppError::ShadowApi),
            ShadowPolicy::Log => Ok(()),
        }
    }

    /// §4.12: atomically replace `KNOWN` and clear `SHADOW`.
    pub fn replace_known(&self, new_known: HashSet<String>) {
        self.known.store(std::sync::Arc::new(new_known));
        self.shadow.write().unwrap().clear();
    }

    pub fn known_len(&self) -> usize {
        self.known.load().len()
    }

    pub fn shadow_len(&self) -> usize {
        self.shadow.read().unwrap().len()
    }
}

pub fn endpoint_key(method: &str, path: &str) -> String {
    format!("{} {}", method.to_ascii_uppercase(), path)
}

/// Parse an OpenAPI document's `paths` object into `"METHOD path"` keys.
pub fn parse_openapi_paths(doc: &Value) -> HashSet<String> {
    let mut out = HashSet::new();
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return out;
    };
    const HTTP_METHODS: &[&str] = &[
        "get", "post", "put", "patch", "delete", "options", "head", "trace",
    ];
    for (path, ops) in paths {
        let Some(ops) = ops.as_object() else { continue };
        for method in HTTP_METHODS {
            if ops.contains_key(*method) {
                out.insert(endpoint_key(method, path));
            }
        }
    }
    out
}
