// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the worker.

use std::path::PathBuf;

/// Redis connection URL assembled from `REDIS_HOST` / `REDIS_PORT` / `REDIS_DB`.
pub fn redis_url() -> String {
    let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("REDIS_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(6379);
    let db = std::env::var("REDIS_DB").ok().and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);
    format!("redis://{host}:{port}/{db}")
}

/// Default backend API root; individual commands may override it.
pub fn backend_api_url() -> String {
    std::env::var("BACKEND_API_URL").unwrap_or_else(|_| "http://backend:8000".to_string())
}

/// Container registry that built images are pushed to.
pub fn registry_url() -> String {
    std::env::var("REGISTRY_URL").unwrap_or_default()
}

/// Public gateway URL that fronts deployed agents.
pub fn gateway_url() -> String {
    std::env::var("GATEWAY_URL").unwrap_or_default()
}

/// Identity service root for permission creation.
pub fn auth_service_url() -> String {
    std::env::var("AUTH_SERVICE_URL").unwrap_or_else(|_| "http://auth:8000".to_string())
}

/// API key handed to deployed agents and gating AgentCard generation.
pub fn llm_api_key() -> Option<String> {
    std::env::var("LLM_API_KEY").ok().filter(|v| !v.is_empty())
}

/// Whether deployed agents get tracing wired up (default on).
pub fn tracing_enabled() -> bool {
    flag("TRACING_ENABLED", true)
}

/// Whether the pre-build tracing injection step runs (default on).
pub fn injection_enabled() -> bool {
    flag("OBSERVABILITY_INJECTION_ENABLED", true)
}

/// Trace collector endpoint exported to deployed agents.
pub fn collector_endpoint() -> String {
    std::env::var("OBSERVABILITY_COLLECTOR_ENDPOINT")
        .unwrap_or_else(|_| "http://collector:6006/v1/traces".to_string())
}

/// Cluster namespace that agent resources live in.
pub fn agent_namespace() -> String {
    std::env::var("AGENT_NAMESPACE").unwrap_or_else(|_| "agents".to_string())
}

/// Stream consumer name. Defaults to the pod hostname so replicas never
/// share a consumer identity.
pub fn consumer_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| format!("k8s-worker-{}", std::process::id()))
}

/// External tracing injector binary, if installed.
pub fn injector_bin() -> Option<PathBuf> {
    std::env::var("TRACING_INJECTOR_BIN").ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// External AgentCard generator binary, if installed.
pub fn generator_bin() -> Option<PathBuf> {
    std::env::var("AGENTCARD_GENERATOR_BIN").ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => v.eq_ignore_ascii_case("true") || v == "1",
        Err(_) => default,
    }
}
