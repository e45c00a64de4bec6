// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker configuration, assembled from the environment at startup and
//! injected into the dispatcher.

use std::path::PathBuf;

use crate::env;

/// Everything the dispatcher needs to know about its surroundings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Redis connection URL (stream + volatile status store).
    pub redis_url: String,
    /// Default backend API root; commands may override per message.
    pub backend_api_url: String,
    /// Registry that built images are pushed to.
    pub registry_url: String,
    /// Public gateway fronting deployed agents.
    pub gateway_url: String,
    /// Cluster namespace for agent resources.
    pub namespace: String,
    /// API key handed to deployed agents; also gates AgentCard generation.
    pub llm_api_key: Option<String>,
    /// Whether deployed agents get tracing env vars.
    pub tracing_enabled: bool,
    /// Whether the pre-build injection step runs.
    pub injection_enabled: bool,
    /// Trace collector endpoint exported to agents.
    pub collector_endpoint: String,
    /// Stream consumer name (unique per replica).
    pub consumer_name: String,
    /// External tracing injector binary.
    pub injector_bin: Option<PathBuf>,
    /// External AgentCard generator binary.
    pub generator_bin: Option<PathBuf>,
}

impl WorkerConfig {
    /// Load configuration from the environment.
    pub fn load() -> Self {
        Self {
            redis_url: env::redis_url(),
            backend_api_url: env::backend_api_url(),
            registry_url: env::registry_url(),
            gateway_url: env::gateway_url(),
            namespace: env::agent_namespace(),
            llm_api_key: env::llm_api_key(),
            tracing_enabled: env::tracing_enabled(),
            injection_enabled: env::injection_enabled(),
            collector_endpoint: env::collector_endpoint(),
            consumer_name: env::consumer_name(),
            injector_bin: env::injector_bin(),
            generator_bin: env::generator_bin(),
        }
    }

    /// Backend API root for one command: the message's `base_url` when
    /// present, the configured default otherwise.
    pub fn base_url_for(&self, command_base_url: Option<&str>) -> String {
        command_base_url
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.backend_api_url.clone())
    }
}

#[cfg(any(test, feature = "test-support"))]
impl WorkerConfig {
    /// Configuration for tests: local URLs, no external binaries.
    pub fn for_tests() -> Self {
        Self {
            redis_url: "redis://localhost:6379/0".to_string(),
            backend_api_url: "http://backend.test:8000".to_string(),
            registry_url: "registry.test:5000".to_string(),
            gateway_url: "http://gw.example".to_string(),
            namespace: "agents".to_string(),
            llm_api_key: Some("test-key".to_string()),
            tracing_enabled: true,
            injection_enabled: false,
            collector_endpoint: "http://collector.test:6006/v1/traces".to_string(),
            consumer_name: "test-worker".to_string(),
            injector_bin: None,
            generator_bin: None,
        }
    }
}
