// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AgentCard finalization.
//!
//! The registry document is the agent's AgentCard with a few fields the
//! orchestrator owns: `id`, `url`, `deployment_type`, and (when known)
//! `owner_id`. Everything else passes through verbatim.

use serde_json::{json, Map, Value};

/// Deployment type stamped on every registry document this worker produces.
pub const DEPLOYMENT_TYPE: &str = "kubernetes";

/// Minimal capability document for agents without an AgentCard and with no
/// way to generate one: empty tool and prompt lists, version 1.0.0.
pub fn minimal_card(agent_name: &str) -> Value {
    json!({
        "id": agent_name,
        "name": agent_name,
        "description": "Agent deployed via the build orchestrator",
        "capabilities": {
            "tools": [],
            "prompts": []
        },
        "version": "1.0.0",
    })
}

/// Produce the registry document from a resolved AgentCard.
///
/// `card` may be anything JSON-shaped; non-object values are replaced by the
/// minimal card so the overrides always have somewhere to land.
pub fn finalize(
    card: Option<Value>,
    agent_name: &str,
    service_url: &str,
    owner_id: Option<&str>,
) -> Value {
    let mut doc: Map<String, Value> = match card {
        Some(Value::Object(map)) => map,
        _ => match minimal_card(agent_name) {
            Value::Object(map) => map,
            // minimal_card always builds an object
            _ => Map::new(),
        },
    };

    doc.insert("id".to_string(), json!(agent_name));
    doc.insert("url".to_string(), json!(service_url));
    doc.insert("deployment_type".to_string(), json!(DEPLOYMENT_TYPE));
    if let Some(owner) = owner_id {
        doc.insert("owner_id".to_string(), json!(owner));
    }

    Value::Object(doc)
}

#[cfg(test)]
#[path = "card_tests.rs"]
mod tests;
