//! Rule table: destinations, message-type rules, detection patterns, defaults.
//!
//! The table is parsed once from an external file (JSON or TOML) and is
//! read-only afterwards. Schema checks happen here, at the loader boundary,
//! so the validator can trust every table it is handed.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Wildcard token used in subtype keys and destination pattern lists.
pub const WILDCARD: &str = "*";

/// Classification path for content no rule or keyword recognised.
pub const UNKNOWN_TYPE: &str = "unknown";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from loading or checking a rule table.
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    /// The rules file could not be read.
    #[error("failed to read rules at {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// JSON rules failed to deserialize.
    #[error("invalid JSON rules: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML rules failed to deserialize.
    #[error("invalid TOML rules: {0}")]
    Toml(#[from] toml::de::Error),

    /// A content pattern is not a valid regular expression.
    #[error("invalid pattern {pattern:?} in {owner}: {source}")]
    Pattern {
        /// Detection rule name or message-type path owning the pattern.
        owner: String,
        /// The offending pattern.
        pattern: String,
        /// Regex compile error.
        #[source]
        source: regex::Error,
    },

    /// The table parsed but violates a structural invariant.
    #[error("invalid rule table: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Messaging platform a destination lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Telegram chat or group.
    Telegram,
    /// Discord channel.
    Discord,
    /// Slack channel.
    Slack,
    /// Web chat session.
    Webchat,
}

impl Platform {
    /// Lowercase tag as written in rule files.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Telegram => "telegram",
            Platform::Discord => "discord",
            Platform::Slack => "slack",
            Platform::Webchat => "webchat",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome a rule or default prescribes for a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Send proceeds.
    Allow,
    /// Send is rejected.
    Block,
    /// Send is withheld until a human confirms.
    Ask,
}

impl Action {
    /// Lowercase string (`"allow"`, `"block"`, `"ask"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Block => "block",
            Action::Ask => "ask",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named sendable target. The table key is its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Transport-level id (chat id, channel id).
    pub id: String,
    /// Platform the destination lives on.
    pub platform: Platform,
    /// Human-readable display name.
    pub name: String,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Listing priority; higher sorts first.
    #[serde(default)]
    pub priority: u32,
}

/// Where one message type may, may not, or may only with confirmation go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTypeRule {
    /// Destination ids (or `*`) this type is allowed in.
    #[serde(default)]
    pub allowed_in: Vec<String>,
    /// Destination ids (or `*`) this type is blocked in.
    #[serde(default)]
    pub blocked_in: Vec<String>,
    /// Destination ids (or `*`) that need a human to confirm the send.
    #[serde(default)]
    pub requires_confirmation: Vec<String>,
    /// Optional content patterns documenting what this type looks like.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<String>>,
    /// Explanation surfaced when the type is blocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Subtype name (or `*`) to rule, for one category.
pub type MessageTypeCategory = HashMap<String, MessageTypeRule>;

/// Content pattern set that classifies matching messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRule {
    /// Rule name, used in logs and errors.
    pub name: String,
    /// Regex patterns tried in order.
    pub patterns: Vec<String>,
    /// Classification path, `category.subtype` or `category.*`.
    pub classify_as: String,
}

/// Fallback behaviour for unrecognised types or destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultBehavior {
    /// Action to report.
    pub action: Action,
    /// Optional explanation prepended to the generated reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Default for DefaultBehavior {
    fn default() -> Self {
        Self {
            action: Action::Ask,
            message: None,
        }
    }
}

/// Defaults for the two unrecognised cases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Defaults {
    /// Used when no rule covers the classified message type.
    #[serde(default)]
    pub unknown_message_type: DefaultBehavior,
    /// Used when the destination id is not in the table.
    #[serde(default)]
    pub unknown_destination: DefaultBehavior,
}

/// The full rule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagingRules {
    /// Schema/version tag.
    pub version: String,
    /// Destination identifier to destination.
    #[serde(default)]
    pub destinations: HashMap<String, Destination>,
    /// Category name to its subtype rules.
    #[serde(default)]
    pub message_types: HashMap<String, MessageTypeCategory>,
    /// Detection rules in evaluation order.
    #[serde(default)]
    pub detection_rules: Vec<DetectionRule>,
    /// Unknown-type and unknown-destination defaults.
    #[serde(default)]
    pub defaults: Defaults,
    /// Literal substring that bypasses every check.
    ///
    /// This is a blunt shared-secret escape hatch, not an authorization
    /// mechanism. Matching is a plain case-sensitive substring test with no
    /// cryptography, so anyone who knows or guesses the code, or whose
    /// message happens to contain it, skips every routing rule. Keep it
    /// long and unlikely to appear in ordinary text.
    pub override_code: String,
}

impl MessagingRules {
    /// Parse a JSON rule table and check it.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::Json`] on malformed input or any error from
    /// [`MessagingRules::check`].
    pub fn from_json_str(s: &str) -> Result<Self, RulesError> {
        let rules: MessagingRules = serde_json::from_str(s)?;
        rules.check()?;
        Ok(rules)
    }

    /// Parse a TOML rule table and check it.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::Toml`] on malformed input or any error from
    /// [`MessagingRules::check`].
    pub fn from_toml_str(s: &str) -> Result<Self, RulesError> {
        let rules: MessagingRules = toml::from_str(s)?;
        rules.check()?;
        Ok(rules)
    }

    /// Verify structural invariants the validator relies on.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::Invalid`] for empty override codes, empty
    /// names or patterns, and malformed classification paths, and
    /// [`RulesError::Pattern`] for patterns that do not compile.
    pub fn check(&self) -> Result<(), RulesError> {
        self.check_layout()?;
        self.compile_detections()?;
        Ok(())
    }

    /// Everything [`MessagingRules::check`] covers except compiling the
    /// detection patterns.
    pub(crate) fn check_layout(&self) -> Result<(), RulesError> {
        // An empty code is a substring of every message.
        if self.override_code.is_empty() {
            return Err(RulesError::Invalid("override code is empty".to_owned()));
        }

        for (key, dest) in &self.destinations {
            if key.is_empty() {
                return Err(RulesError::Invalid("empty destination identifier".to_owned()));
            }
            if dest.name.is_empty() {
                return Err(RulesError::Invalid(format!(
                    "destination {key} has an empty name"
                )));
            }
        }

        for (category, subtypes) in &self.message_types {
            if category.is_empty() {
                return Err(RulesError::Invalid("empty category name".to_owned()));
            }
            for (subtype, rule) in subtypes {
                let path = format!("{category}.{subtype}");
                let lists = [&rule.allowed_in, &rule.blocked_in, &rule.requires_confirmation];
                if lists.iter().any(|list| list.iter().any(String::is_empty)) {
                    return Err(RulesError::Invalid(format!(
                        "{path} has an empty destination pattern"
                    )));
                }
                for pattern in rule.patterns.iter().flatten() {
                    compile_pattern(pattern).map_err(|source| RulesError::Pattern {
                        owner: path.clone(),
                        pattern: pattern.clone(),
                        source,
                    })?;
                }
            }
        }

        for rule in &self.detection_rules {
            let (category, _) = split_path(&rule.classify_as);
            if category.is_empty() {
                return Err(RulesError::Invalid(format!(
                    "detection rule {} has no category in {:?}",
                    rule.name, rule.classify_as
                )));
            }
        }

        Ok(())
    }

    /// Compile the patterns of every detection rule, in table order.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::Pattern`] naming the first rule whose pattern
    /// does not compile.
    pub fn compile_detections(&self) -> Result<Vec<Vec<Regex>>, RulesError> {
        self.detection_rules
            .iter()
            .map(|rule| {
                rule.patterns
                    .iter()
                    .map(|pattern| {
                        compile_pattern(pattern).map_err(|source| RulesError::Pattern {
                            owner: rule.name.clone(),
                            pattern: pattern.clone(),
                            source,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect()
    }

    /// Display name for a destination, or the raw id when unknown.
    pub fn destination_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.destinations
            .get(id)
            .map_or(id, |dest| dest.name.as_str())
    }

    /// Destinations ordered by descending priority, then identifier.
    pub fn destinations_by_priority(&self) -> Vec<(&str, &Destination)> {
        let mut list: Vec<(&str, &Destination)> = self
            .destinations
            .iter()
            .map(|(key, dest)| (key.as_str(), dest))
            .collect();
        list.sort_by(|a, b| b.1.priority.cmp(&a.1.priority).then_with(|| a.0.cmp(b.0)));
        list
    }
}

/// Compile a content pattern: unanchored, case-insensitive.
///
/// # Errors
///
/// Returns the regex compile error for invalid syntax.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Split a classification path on its first `.`; subtype defaults to `*`.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.split_once('.') {
        Some((category, subtype)) => (category, subtype),
        None => (path, WILDCARD),
    }
}

/// Load and check a rule table. `.toml` files parse as TOML, anything
/// else as JSON.
///
/// # Errors
///
/// Returns [`RulesError::Read`] if the file cannot be read, or any parse or
/// check error.
pub fn load_rules(path: &Path) -> Result<MessagingRules, RulesError> {
    let contents = std::fs::read_to_string(path).map_err(|source| RulesError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

    let rules = if is_toml {
        MessagingRules::from_toml_str(&contents)?
    } else {
        MessagingRules::from_json_str(&contents)?
    };

    info!(
        path = %path.display(),
        version = %rules.version,
        destinations = rules.destinations.len(),
        categories = rules.message_types.len(),
        detection_rules = rules.detection_rules.len(),
        "rule table loaded"
    );
    Ok(rules)
}
