//! Aggregator (§4.11) — fans out the sub-requests of one `Aggregation`
//! under a shared deadline, applies per-query adapters, and merges the
//! results under query names.
//!
//! §9 design note: "pre-parse each query template once at startup into
//! a sequence of literals and path expressions; runtime substitution
//! becomes O(#placeholders) without regex." `Template`/`ValueTemplate`
//! below are exactly that compiled form, built once in
//! `CompiledAggregation::compile` rather than re-parsed per request.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use serde_json::{Map, Value};

use crate::cache::{Cache, CacheExt};
use crate::errors::AppError;
use crate::models::aggregation::{Adapter, Aggregation, QueryConfig};
use crate::models::claims::UserClaims;

const GLOBAL_DEADLINE: Duration = Duration::from_secs(5);

/// One segment of a parsed string template: either a literal run of
/// characters, or a dotted placeholder path like `jwt.user_id`.
#[derive(Debug, Clone)]
enum TemplateSegment {
    Literal(String),
    Placeholder(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Template(Vec<TemplateSegment>);

impl Template {
    /// Parses `{segment(.segment)*}` placeholders out of `raw`, leaving
    /// everything else as literal text.
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.char_indices().peekable();

        while let Some((_, ch)) = chars.next() {
            if ch == '{' {
                let mut placeholder = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    placeholder.push(c);
                }
                if closed {
                    if !literal.is_empty() {
                        segments.push(TemplateSegment::Literal(std::mem::take(&mut literal)));
                    }
                    let path = placeholder.split('.').map(str::to_string).collect();
                    segments.push(TemplateSegment::Placeholder(path));
                } else {
                    literal.push('{');
                    literal.push_str(&placeholder);
                }
            } else {
                literal.push(ch);
            }
        }
        if !literal.is_empty() {
            segments.push(TemplateSegment::Literal(literal));
        }
        Template(segments)
    }

    /// Unresolved placeholders render as the empty string (§4.11 step 3).
    pub fn render(&self, context: &Value) -> String {
        let mut out = String::new();
        for segment in &self.0 {
            match segment {
                TemplateSegment::Literal(s) => out.push_str(s),
                TemplateSegment::Placeholder(path) => {
                    if let Some(v) = resolve_path(context, path) {
                        out.push_str(&value_to_string(&v));
                    }
                }
            }
        }
        out
    }
}

fn resolve_path(context: &Value, path: &[String]) -> Option<Value> {
    let mut current = context;
    for key in path {
        current = current.get(key)?;
    }
    Some(current.clone())
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Compiled form of an arbitrary JSON value that may contain string
/// templates at any leaf. Non-string leaves pass through untouched.
#[derive(Debug, Clone)]
pub enum ValueTemplate {
    Literal(Value),
    Str(Template),
    Array(Vec<ValueTemplate>),
    Object(Vec<(String, ValueTemplate)>),
}

impl ValueTemplate {
    pub fn compile(value: &Value) -> Self {
        match value {
            Value::String(s) => ValueTemplate::Str(Template::parse(s)),
            Value::Array(items) => ValueTemplate::Array(items.iter().map(ValueTemplate::compile).collect()),
            Value::Object(map) => ValueTemplate::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), ValueTemplate::compile(v)))
                    .collect(),
            ),
            other => ValueTemplate::Literal(other.clone()),
        }
    }

    pub fn render(&self, context: &Value) -> Value {
        match self {
            ValueTemplate::Literal(v) => v.clone(),
            ValueTemplate::Str(t) => Value::String(t.render(context)),
            ValueTemplate::Array(items) => Value::Array(items.iter().map(|i| i.render(context)).collect()),
            ValueTemplate::Object(entries) => {
                let mut map = Map::new();
                for (k, v) in entries {
                    map.insert(k.clone(), v.render(context));
                }
                Value::Object(map)
            }
        }
    }
}

pub struct CompiledQuery {
    pub name: String,
    pub http_method: String,
    pub backend_url: Template,
    pub params: Option<ValueTemplate>,
    pub body: Option<ValueTemplate>,
    pub adapter: Option<Adapter>,
}

pub struct CompiledAggregation {
    pub public_path: String,
    pub required_role: String,
    pub queries: Vec<CompiledQuery>,
    pub cache_ttl: Option<Duration>,
}

impl CompiledAggregation {
    pub fn compile(agg: &Aggregation) -> Self {
        CompiledAggregation {
            public_path: agg.public_path.clone(),
            required_role: agg.required_role.clone(),
            queries: agg.queries.iter().map(CompiledQuery::compile).collect(),
            cache_ttl: agg.cache_ttl_secs.map(Duration::from_secs),
        }
    }
}

impl CompiledQuery {
    fn compile(q: &QueryConfig) -> Self {
        CompiledQuery {
            name: q.name.clone(),
            http_method: q.http_method.clone(),
            backend_url: Template::parse(&q.backend_url),
            params: q.params.as_ref().map(ValueTemplate::compile),
            body: q.body.as_ref().map(ValueTemplate::compile),
            adapter: q.adapter.clone(),
        }
    }
}

/// Build `{ jwt, path_params, query_params }` (§4.11 step 2).
pub fn build_context(
    claims: &UserClaims,
    path_params: &HashMap<String, String>,
    query_params: &HashMap<String, String>,
) -> Value {
    serde_json::json!({
        "jwt": claims.to_value(),
        "path_params": path_params,
        "query_params": query_params,
    })
}

async fn run_query(client: &reqwest::Client, query: &CompiledQuery, context: &Value) -> Value {
    let url = query.backend_url.render(context);
    let params = query.params.as_ref().map(|p| p.render(context));
    let body = query.body.as_ref().map(|b| b.render(context));

    let method = match reqwest::Method::from_bytes(query.http_method.to_uppercase().as_bytes()) {
        Ok(m) => m,
        Err(_) => reqwest::Method::GET,
    };

    let mut req = client.request(method, &url);
    if let Some(params) = &params {
        if let Some(obj) = params.as_object() {
            let pairs: Vec<(String, String)> = obj
                .iter()
                .map(|(k, v)| (k.clone(), value_to_string(v)))
                .collect();
            req = req.query(&pairs);
        }
    }
    if let Some(body) = &body {
        req = req.json(body);
    }

    let response = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("BFF backend connection error for '{}': {}", query.name, e);
            return serde_json::json!({ "error": "backend unreachable" });
        }
    };

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        tracing::error!("BFF backend error for '{}': {}", query.name, status);
        return serde_json::json!({
            "error": format!("backend error: {}", status.as_u16()),
            "detail": detail,
        });
    }

    let data: Value = match response.json().await {
        Ok(v) => v,
        Err(_) => return serde_json::json!({ "error": "backend returned non-JSON body" }),
    };

    match &query.adapter {
        Some(adapter) => apply_adapter(data, adapter),
        None => data,
    }
}

fn apply_adapter_object(mut obj: Map<String, Value>, adapter: &Adapter) -> Map<String, Value> {
    if let Some(select) = &adapter.select {
        let mut selected = Map::new();
        for field in select {
            if let Some(v) = obj.remove(field) {
                selected.insert(field.clone(), v);
            }
        }
        obj = selected;
    }
    if let Some(rename) = &adapter.rename {
        for (from, to) in rename {
            if let Some(v) = obj.remove(from) {
                obj.insert(to.clone(), v);
            }
        }
    }
    obj
}

fn apply_adapter(data: Value, adapter: &Adapter) -> Value {
    match data {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(obj) => Value::Object(apply_adapter_object(obj, adapter)),
                    other => other,
                })
                .collect(),
        ),
        Value::Object(obj) => Value::Object(apply_adapter_object(obj, adapter)),
        other => other,
    }
}

/// Dispatch every query in parallel under one global deadline. A
/// timeout produces `Err(AppError::GatewayTimeout)`; individual query
/// failures are folded into that query's own result (§4.11 step 5).
pub async fn fan_out(client: &reqwest::Client, queries: &[CompiledQuery], context: &Value) -> Result<Map<String, Value>, AppError> {
    let futures = queries.iter().map(|q| run_query(client, q, context));
    let results = tokio::time::timeout(GLOBAL_DEADLINE, join_all(futures))
        .await
        .map_err(|_| AppError::GatewayTimeout)?;

    let mut merged = Map::new();
    for (query, result) in queries.iter().zip(results) {
        merged.insert(query.name.clone(), result);
    }
    Ok(merged)
}

pub fn cache_key(public_path: &str, user_id_or_anon: &str) -> String {
    format!("aggregation:{}:{}", public_path, user_id_or_anon)
}

/// Consult the response cache before fanning out; store the result on a
/// miss (§4.11 final bullet, §9 "decorator-based response caching" made
/// explicit).
pub async fn run_cached(
    cache: &dyn Cache,
    client: &reqwest::Client,
    agg: &CompiledAggregation,
    user_id_or_anon: &str,
    context: &Value,
) -> Result<Map<String, Value>, AppError> {
    let key = cache_key(&agg.public_path, user_id_or_anon);

    if let Some(ttl) = agg.cache_ttl {
        if let Some(cached) = cache.get_json::<Map<String, Value>>(&key).await {
            return Ok(cached);
        }
        let result = fan_out(client, &agg.queries, context).await?;
        let _ = cache.set_json(&key, &result, ttl).await;
        return Ok(result);
    }

    fan_out(client, &agg.queries, context).await
}
