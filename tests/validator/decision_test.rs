//! Decision order of `Validator::validate`.

use sendgate::rules::Action;
use sendgate::validator::MessageContext;

use crate::common::{fixture_validator, validator_from_json};

fn ctx(content: &str, destination: &str) -> MessageContext {
    MessageContext::new(content, destination).with_channel("telegram")
}

// ---------- override ----------

#[test]
fn override_code_allows_anything() {
    let v = fixture_validator();
    let result = v.validate(&ctx("#force-send urgent", "anything"));
    assert!(result.allowed);
    assert_eq!(result.action, Action::Allow);
    assert_eq!(result.reason.as_deref(), Some("Override code used"));
    assert!(!result.needs_confirmation);
}

#[test]
fn override_code_bypasses_blocks_and_unknown_types() {
    let v = fixture_validator();
    for (content, dest) in [
        ("quarterly revenue report #force-send", "work_group"),
        ("hello #force-send there", "boss_dm"),
        ("Daily digest#force-send", "family_chat"),
    ] {
        let result = v.validate(&ctx(content, dest));
        assert!(result.allowed, "content: {content}");
        assert_eq!(result.action, Action::Allow, "content: {content}");
    }
}

#[test]
fn override_code_is_case_sensitive_literal() {
    let v = fixture_validator();
    let result = v.validate(&ctx("quarterly revenue report #FORCE-SEND", "work_group"));
    assert_eq!(result.action, Action::Block);
}

// ---------- allowed ----------

#[test]
fn digest_to_listed_destination_is_allowed() {
    let v = fixture_validator();
    let result = v.validate(&ctx("Morning digest \u{1F9BE}", "boss_dm"));
    assert!(result.allowed);
    assert_eq!(result.action, Action::Allow);
    assert_eq!(result.message_type.as_deref(), Some("digest.*"));
    assert_eq!(result.matched_rule.as_deref(), Some("digest.*"));
    assert!(!result.needs_confirmation);
}

#[test]
fn wildcard_allowed_list_matches_every_known_destination() {
    let v = fixture_validator();
    for dest in ["boss_dm", "work_group", "family_chat"] {
        let result = v.validate(&ctx("Reminder: stand-up at 10", dest));
        assert!(result.allowed, "destination: {dest}");
    }
}

// ---------- unknown type / destination ----------

#[test]
fn unknown_type_uses_configured_default() {
    let v = fixture_validator();
    let result = v.validate(&ctx("hello there", "boss_dm"));
    assert!(!result.allowed);
    assert_eq!(result.action, Action::Ask);
    assert!(result.needs_confirmation);
    assert_eq!(result.message_type.as_deref(), Some("unknown"));
    let reason = result.reason.unwrap_or_default();
    assert!(reason.contains("Unknown message type: unknown"), "{reason}");
    assert!(reason.contains("Unrecognized message type"), "{reason}");
}

#[test]
fn unknown_type_default_allow_still_reports_not_allowed() {
    let v = validator_from_json(serde_json::json!({
        "version": "1",
        "destinations": {
            "boss_dm": { "id": "1", "platform": "telegram", "name": "Boss" }
        },
        "defaults": {
            "unknownMessageType": { "action": "allow" },
            "unknownDestination": { "action": "ask" }
        },
        "overrideCode": "!!"
    }));
    let result = v.validate(&ctx("hello", "boss_dm"));
    assert!(!result.allowed);
    assert_eq!(result.action, Action::Allow);
    assert!(result.needs_confirmation);
}

#[test]
fn unknown_type_is_checked_before_unknown_destination() {
    let v = fixture_validator();
    let result = v.validate(&ctx("hello there", "nowhere"));
    assert_eq!(result.action, Action::Ask);
    assert!(result.reason.unwrap_or_default().contains("Unknown message type"));
}

#[test]
fn unknown_destination_uses_configured_default() {
    let v = fixture_validator();
    let result = v.validate(&ctx("weekly summary", "nowhere"));
    assert!(!result.allowed);
    assert_eq!(result.action, Action::Block);
    assert!(result.needs_confirmation);
    assert_eq!(result.message_type.as_deref(), Some("digest.weekly"));
    assert_eq!(
        result.reason.as_deref(),
        Some("Unknown destination: nowhere")
    );
}

#[test]
fn destination_ids_are_case_sensitive() {
    let v = fixture_validator();
    let result = v.validate(&ctx("Morning digest", "Boss_DM"));
    assert_eq!(result.action, Action::Block);
    assert!(result.reason.unwrap_or_default().contains("Unknown destination"));
}

// ---------- blocked ----------

#[test]
fn blocked_revenue_suggests_first_allowed_destination() {
    let v = fixture_validator();
    let result = v.validate(&ctx("quarterly revenue report", "work_group"));
    assert!(!result.allowed);
    assert_eq!(result.action, Action::Block);
    assert_eq!(result.message_type.as_deref(), Some("business.revenue"));
    assert_eq!(result.matched_rule.as_deref(), Some("business.revenue"));
    assert_eq!(result.suggested_destination.as_deref(), Some("finance_channel"));
    assert_eq!(
        result.reason.as_deref(),
        Some("Revenue numbers stay out of shared channels")
    );
    assert!(result.needs_confirmation);
}

#[test]
fn blocked_without_rule_reason_generates_one() {
    let v = fixture_validator();
    let result = v.validate(&ctx("Daily digest", "family_chat"));
    assert_eq!(result.action, Action::Block);
    assert_eq!(
        result.reason.as_deref(),
        Some("digest.* is blocked in Family Chat")
    );
    assert_eq!(result.suggested_destination.as_deref(), Some("boss_dm"));
}

#[test]
fn blocked_beats_allowed_for_same_destination() {
    let v = fixture_validator();
    let result = v.validate(&ctx("ALERT: disk full", "work_group"));
    assert_eq!(result.action, Action::Block);
    assert!(!result.allowed);
    assert_eq!(result.matched_rule.as_deref(), Some("alert.*"));
}

#[test]
fn blocked_with_empty_allowed_list_has_no_suggestion() {
    let v = validator_from_json(serde_json::json!({
        "version": "1",
        "destinations": {
            "team": { "id": "1", "platform": "slack", "name": "Team" }
        },
        "messageTypes": {
            "digest": { "*": { "blockedIn": ["*"] } }
        },
        "overrideCode": "!!"
    }));
    let result = v.validate(&ctx("digest", "team"));
    assert_eq!(result.action, Action::Block);
    assert!(result.suggested_destination.is_none());
}

#[test]
fn blocked_also_applies_to_replies() {
    let v = fixture_validator();
    let result = v.validate(&ctx("quarterly revenue report", "work_group").with_reply(true));
    assert_eq!(result.action, Action::Block);
}

// ---------- confirmation ----------

#[test]
fn listed_destination_requires_confirmation() {
    let v = fixture_validator();
    let result = v.validate(&ctx("r/programming thread", "boss_dm"));
    assert!(!result.allowed);
    assert_eq!(result.action, Action::Ask);
    assert_eq!(result.message_type.as_deref(), Some("digest.reddit"));
    assert_eq!(result.matched_rule.as_deref(), Some("digest.reddit"));
    assert!(result.needs_confirmation);
    assert!(result
        .reason
        .unwrap_or_default()
        .contains("requires confirmation"));
}

#[test]
fn reply_bypasses_confirmation_and_is_allowed() {
    let v = fixture_validator();
    let result = v.validate(&ctx("r/programming thread", "boss_dm").with_reply(true));
    assert!(result.allowed);
    assert_eq!(result.action, Action::Allow);
}

#[test]
fn reply_bypassing_confirmation_falls_through_to_default_ask() {
    let v = fixture_validator();
    let plain = v.validate(&ctx("r/programming thread", "family_chat"));
    assert_eq!(plain.action, Action::Ask);
    assert!(plain.reason.unwrap_or_default().contains("requires confirmation"));

    let reply = v.validate(&ctx("r/programming thread", "family_chat").with_reply(true));
    assert_eq!(reply.action, Action::Ask);
    assert!(!reply.allowed);
    assert!(reply.needs_confirmation);
    assert!(reply
        .reason
        .unwrap_or_default()
        .contains("not explicitly allowed"));
}

#[test]
fn reply_category_confirms_only_non_replies() {
    let v = fixture_validator();
    let plain = v.validate(&ctx("In response to your question", "work_group"));
    assert_eq!(plain.action, Action::Ask);
    let reply = v.validate(&ctx("In response to your question", "work_group").with_reply(true));
    assert_eq!(reply.action, Action::Allow);
}

// ---------- default ask ----------

#[test]
fn unlisted_destination_defaults_to_ask() {
    let v = fixture_validator();
    let result = v.validate(&ctx("business plan draft", "work_group"));
    assert!(!result.allowed);
    assert_eq!(result.action, Action::Ask);
    assert!(result.needs_confirmation);
    assert_eq!(
        result.reason.as_deref(),
        Some("business.* is not explicitly allowed in Work Group")
    );
}

#[test]
fn validate_is_deterministic() {
    let v = fixture_validator();
    let c = ctx("quarterly revenue report", "work_group");
    assert_eq!(v.validate(&c), v.validate(&c));
}
