use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "llm": { "$ref": "#/$defs/llm" },
            "agents": {
                "type": "object",
                "properties": {
                    "defaults": {
                        "type": "object",
                        "properties": {
                            "retry": {
                                "type": "object",
                                "properties": {
                                    "max_attempts": { "type": "integer", "minimum": 1 },
                                    "base_delay_ms": { "type": "integer", "minimum": 0 },
                                    "max_delay_ms": { "type": "integer", "minimum": 0 }
                                }
                            },
                            "circuit_breaker": {
                                "type": "object",
                                "properties": {
                                    "threshold": { "type": "integer", "minimum": 1 },
                                    "reset_secs": { "type": "number", "minimum": 0 }
                                }
                            },
                            "llm": { "$ref": "#/$defs/generation" }
                        }
                    },
                    "overrides": {
                        "type": "object",
                        "additionalProperties": {
                            "type": "object",
                            "properties": {
                                "role": { "type": "string" },
                                "goal": { "type": "string" },
                                "max_attempts": { "type": "integer", "minimum": 1 },
                                "base_delay_ms": { "type": "integer", "minimum": 0 },
                                "max_delay_ms": { "type": "integer", "minimum": 0 },
                                "circuit_breaker_threshold": { "type": "integer", "minimum": 1 },
                                "circuit_breaker_reset_secs": { "type": "number", "minimum": 0 },
                                "llm": { "$ref": "#/$defs/generation" }
                            }
                        }
                    },
                    "enabled": { "type": "array", "items": { "type": "string" } }
                }
            },
            "persistence": {
                "type": "object",
                "properties": {
                    "backend": { "type": "string", "enum": ["sqlite", "memory", "none"] },
                    "path": { "type": "string" },
                    "ttl_days": { "type": "integer", "minimum": 1 }
                }
            },
            "router": {
                "type": "object",
                "properties": {
                    "default_agent_type": { "type": ["string", "null"] },
                    "use_classifier": { "type": "boolean" }
                }
            },
            "tracing": {
                "type": "object",
                "properties": {
                    "directory": { "type": "string" }
                }
            },
            "workflows": { "type": "array", "items": { "$ref": "#/$defs/workflow" } }
        },
        "$defs": {
            "llm": {
                "type": "object",
                "properties": {
                    "provider": { "type": "string", "enum": ["anthropic", "openai", "local", "scripted"] },
                    "model": { "type": "string" },
                    "api_key": { "type": "string" },
                    "base_url": { "type": "string" }
                }
            },
            "generation": {
                "type": "object",
                "properties": {
                    "model": { "type": "string" },
                    "temperature": { "type": "number", "minimum": 0 },
                    "max_tokens": { "type": "integer", "minimum": 1 }
                }
            },
            "workflow": {
                "type": "object",
                "required": ["name", "steps"],
                "properties": {
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                    "steps": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["name", "agent_type", "task"],
                            "properties": {
                                "name": { "type": "string" },
                                "agent_type": { "type": "string" },
                                "agent_id": { "type": "string" },
                                "task": { "type": "string" },
                                "output_key": { "type": "string" },
                                "timeout_secs": { "type": "number", "exclusiveMinimum": 0 }
                            }
                        }
                    }
                }
            }
        }
    })
});
