//! Message validator: classify, resolve the rule, decide allow/block/ask.
//!
//! [`Validator::validate`] is a pure function of the rule table and the
//! message context. Evaluation order is fixed: override code, then
//! classification, unknown type, unknown destination, blocked,
//! confirmation, allowed, and finally the default ask.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rules::{
    split_path, Action, MessageTypeRule, MessagingRules, RulesError,
    UNKNOWN_TYPE, WILDCARD,
};

/// Maximum number of content characters shown in a confirmation preview.
pub const PREVIEW_CHARS: usize = 100;

/// Marker appended to a truncated preview.
pub const ELLIPSIS: &str = "...";

/// Keyword fallback, checked in order against lower-cased content.
const KEYWORD_FALLBACK: &[(&[&str], &str)] = &[
    (&["digest", "\u{1F9BE}"], "digest.*"),
    (&["reminder", "don't forget"], "reminder.*"),
    (&["replying to", "in response to"], "reply.*"),
    (&["revenue", "business"], "business.*"),
];

// ---------------------------------------------------------------------------
// Context and result
// ---------------------------------------------------------------------------

/// One outgoing send attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    /// Message body.
    pub content: String,
    /// Destination identifier (table key).
    pub destination: String,
    /// Channel tag reported by the host.
    #[serde(default)]
    pub channel: String,
    /// Whether the message answers an earlier one.
    #[serde(default)]
    pub is_reply: bool,
    /// Thread the message belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Free-form host metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl MessageContext {
    /// Context for a non-reply message with no channel tag.
    pub fn new(content: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            destination: destination.into(),
            ..Self::default()
        }
    }

    /// Set the reply flag.
    #[must_use]
    pub fn with_reply(mut self, is_reply: bool) -> Self {
        self.is_reply = is_reply;
        self
    }

    /// Set the channel tag.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }
}

/// Verdict for one send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Whether the send may proceed without further action.
    pub allowed: bool,
    /// Action the host should take.
    pub action: Action,
    /// Human-readable explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Classification path of the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    /// `category.subtype` of the rule that decided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    /// Where the message would be allowed instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_destination: Option<String>,
    /// Whether a human should see the message before it goes out.
    pub needs_confirmation: bool,
}

impl ValidationResult {
    fn denied(action: Action, reason: String, message_type: &str) -> Self {
        Self {
            allowed: false,
            action,
            reason: Some(reason),
            message_type: Some(message_type.to_owned()),
            matched_rule: None,
            suggested_destination: None,
            needs_confirmation: true,
        }
    }

    /// Fail-closed block used when validation itself could not complete.
    pub fn validation_error() -> Self {
        Self {
            allowed: false,
            action: Action::Block,
            reason: Some("validation error".to_owned()),
            message_type: None,
            matched_rule: None,
            suggested_destination: None,
            needs_confirmation: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// A detection rule with its patterns compiled.
#[derive(Debug)]
struct CompiledDetection {
    name: String,
    patterns: Vec<Regex>,
    classify_as: String,
}

/// Decision engine bound to one immutable rule table.
#[derive(Debug)]
pub struct Validator {
    rules: MessagingRules,
    detections: Vec<CompiledDetection>,
}

impl Validator {
    /// Check the table and compile its detection patterns.
    ///
    /// # Errors
    ///
    /// Returns a [`RulesError`] if the table fails [`MessagingRules::check`].
    pub fn new(rules: MessagingRules) -> Result<Self, RulesError> {
        rules.check_layout()?;

        let detections = rules
            .detection_rules
            .iter()
            .zip(rules.compile_detections()?)
            .map(|(rule, patterns)| CompiledDetection {
                name: rule.name.clone(),
                patterns,
                classify_as: rule.classify_as.clone(),
            })
            .collect();

        Ok(Self { rules, detections })
    }

    /// The rule table this validator is bound to.
    pub fn rules(&self) -> &MessagingRules {
        &self.rules
    }

    /// Classify content. Detection rules win over the keyword fallback.
    pub fn detect_message_type(&self, content: &str) -> String {
        for detection in &self.detections {
            if detection.patterns.iter().any(|re| re.is_match(content)) {
                debug!(rule = %detection.name, path = %detection.classify_as, "detection rule matched");
                return detection.classify_as.clone();
            }
        }

        let lower = content.to_lowercase();
        KEYWORD_FALLBACK
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(*k)))
            .map_or_else(|| UNKNOWN_TYPE.to_owned(), |(_, path)| (*path).to_owned())
    }

    /// Exact subtype rule, else the category's `*` rule, else `None`.
    pub fn find_rule(&self, path: &str) -> Option<&MessageTypeRule> {
        let (category, subtype) = parse_message_type(path);
        let subtypes = self.rules.message_types.get(category)?;
        if subtype != WILDCARD {
            if let Some(rule) = subtypes.get(subtype) {
                return Some(rule);
            }
        }
        subtypes.get(WILDCARD)
    }

    /// Decide whether `ctx` may be sent.
    pub fn validate(&self, ctx: &MessageContext) -> ValidationResult {
        if ctx.content.contains(self.rules.override_code.as_str()) {
            debug!(destination = %ctx.destination, "override code used");
            return ValidationResult {
                allowed: true,
                action: Action::Allow,
                reason: Some("Override code used".to_owned()),
                message_type: None,
                matched_rule: None,
                suggested_destination: None,
                needs_confirmation: false,
            };
        }

        let message_type = self.detect_message_type(&ctx.content);
        let (category, subtype) = parse_message_type(&message_type);
        let dest = ctx.destination.as_str();

        let Some(rule) = self.find_rule(&message_type) else {
            let default = &self.rules.defaults.unknown_message_type;
            let reason = with_default_message(
                default.message.as_deref(),
                format!("Unknown message type: {message_type}"),
            );
            debug!(message_type = %message_type, action = %default.action, "no rule for message type");
            return ValidationResult::denied(default.action, reason, &message_type);
        };

        let Some(destination) = self.rules.destinations.get(dest) else {
            let default = &self.rules.defaults.unknown_destination;
            let reason = with_default_message(
                default.message.as_deref(),
                format!("Unknown destination: {dest}"),
            );
            debug!(destination = %dest, action = %default.action, "unknown destination");
            return ValidationResult::denied(default.action, reason, &message_type);
        };

        let matched_rule = format!("{category}.{subtype}");
        let dest_name = destination.name.as_str();

        let result = if destination_listed(&rule.blocked_in, dest) {
            let reason = rule
                .reason
                .clone()
                .unwrap_or_else(|| format!("{message_type} is blocked in {dest_name}"));
            ValidationResult {
                allowed: false,
                action: Action::Block,
                reason: Some(reason),
                message_type: Some(message_type.clone()),
                matched_rule: Some(matched_rule),
                suggested_destination: rule.allowed_in.first().cloned(),
                needs_confirmation: true,
            }
        } else if !ctx.is_reply && destination_listed(&rule.requires_confirmation, dest) {
            ValidationResult {
                allowed: false,
                action: Action::Ask,
                reason: Some(format!("{message_type} requires confirmation in {dest_name}")),
                message_type: Some(message_type.clone()),
                matched_rule: Some(matched_rule),
                suggested_destination: None,
                needs_confirmation: true,
            }
        } else if destination_listed(&rule.allowed_in, dest) {
            ValidationResult {
                allowed: true,
                action: Action::Allow,
                reason: None,
                message_type: Some(message_type.clone()),
                matched_rule: Some(matched_rule),
                suggested_destination: None,
                needs_confirmation: false,
            }
        } else {
            ValidationResult::denied(
                Action::Ask,
                format!("{message_type} is not explicitly allowed in {dest_name}"),
                &message_type,
            )
        };

        debug!(
            message_type = %message_type,
            destination = %dest,
            action = %result.action,
            "message validated"
        );
        result
    }

    /// Human-readable confirmation prompt for a withheld send.
    pub fn format_confirmation(&self, ctx: &MessageContext, result: &ValidationResult) -> String {
        let dest_name = self.rules.destination_name(&ctx.destination);
        let message_type = result.message_type.as_deref().unwrap_or(UNKNOWN_TYPE);
        let reason = result.reason.as_deref().unwrap_or("");

        let mut preview: String = ctx.content.chars().take(PREVIEW_CHARS).collect();
        if ctx.content.chars().nth(PREVIEW_CHARS).is_some() {
            preview.push_str(ELLIPSIS);
        }

        let mut out = format!(
            "\u{26A0}\u{FE0F} Confirm message before sending\n\n\
             Destination: {dest_name}\n\
             Type: {message_type}\n\
             Reason: {reason}\n\n\
             Preview:\n{preview}\n"
        );
        // `*` names no particular destination, so there is nothing to suggest.
        if let Some(suggested) = result
            .suggested_destination
            .as_deref()
            .filter(|d| *d != WILDCARD)
        {
            let suggested_name = self.rules.destination_name(suggested);
            out.push_str(&format!("\nSuggested destination: {suggested_name}\n"));
        }
        out.push_str("\nReply \"yes\" to send or \"no\" to cancel.");
        out
    }
}

/// Split a classification path into `(category, subtype)`.
pub fn parse_message_type(path: &str) -> (&str, &str) {
    split_path(path)
}

/// Whether a single pattern matches a destination id: `*` or exact equality.
pub fn destination_matches(pattern: &str, id: &str) -> bool {
    pattern == WILDCARD || pattern == id
}

/// Whether any pattern in `list` matches `id`.
pub fn destination_listed(list: &[String], id: &str) -> bool {
    list.iter().any(|p| destination_matches(p, id))
}

fn with_default_message(message: Option<&str>, generated: String) -> String {
    match message {
        Some(m) if !m.is_empty() => format!("{m} ({generated})"),
        _ => generated,
    }
}
