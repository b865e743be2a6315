//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use sendgate::rules::{load_rules, MessagingRules};
use sendgate::validator::Validator;

/// Path to the JSON rule table used across tests.
pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/messaging-rules.json")
}

/// The fixture rule table.
pub fn fixture_rules() -> MessagingRules {
    match load_rules(&fixture_path()) {
        Ok(rules) => rules,
        Err(err) => panic!("fixture rules should load: {err}"),
    }
}

/// A validator bound to the fixture rule table.
pub fn fixture_validator() -> Validator {
    match Validator::new(fixture_rules()) {
        Ok(v) => v,
        Err(err) => panic!("fixture rules should validate: {err}"),
    }
}

/// Minimal rule table built from JSON, for tests that need custom rules.
pub fn validator_from_json(value: serde_json::Value) -> Validator {
    let rules: MessagingRules = match serde_json::from_value(value) {
        Ok(rules) => rules,
        Err(err) => panic!("test rules should deserialize: {err}"),
    };
    match Validator::new(rules) {
        Ok(v) => v,
        Err(err) => panic!("test rules should validate: {err}"),
    }
}
