//! Pre-send hook: maps a validation result onto what the host does next.
//!
//! The host calls [`PreSendHook::check`] before every send. Anything that
//! goes wrong while deciding, including a panic inside the decider, turns
//! into [`SendVerdict::Reject`] with a generic "validation error" reason.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::rules::{Action, RulesError};
use crate::validator::{MessageContext, ValidationResult, Validator};

/// Errors raised while producing a decision.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// Rule table could not be loaded or checked.
    #[error("rules error: {0}")]
    Rules(#[from] RulesError),

    /// The shared validator lock was poisoned by a panicking writer.
    #[error("rules lock poisoned: {0}")]
    LockPoisoned(String),

    /// The decider panicked.
    #[error("decider panicked: {0}")]
    Panicked(String),
}

/// A validation result together with the prompt built from the same table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// The verdict for the send attempt.
    pub result: ValidationResult,
    /// Confirmation prompt, present when the result asks for one.
    pub prompt: Option<String>,
}

/// Narrow decision seam the hook depends on.
pub trait Decide {
    /// Produce the validation result for one send attempt.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError`] when no decision could be made.
    fn decide(&self, ctx: &MessageContext) -> Result<ValidationResult, GuardError>;

    /// Produce the result and, for ask results, its confirmation prompt.
    /// Both must come from one rule table.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError`] when no decision could be made.
    fn decide_with_prompt(&self, ctx: &MessageContext) -> Result<Decision, GuardError>;
}

impl Decide for Validator {
    fn decide(&self, ctx: &MessageContext) -> Result<ValidationResult, GuardError> {
        Ok(self.validate(ctx))
    }

    fn decide_with_prompt(&self, ctx: &MessageContext) -> Result<Decision, GuardError> {
        let result = self.validate(ctx);
        let prompt = (result.action == Action::Ask).then(|| self.format_confirmation(ctx, &result));
        Ok(Decision { result, prompt })
    }
}

impl<D: Decide + ?Sized> Decide for Arc<D> {
    fn decide(&self, ctx: &MessageContext) -> Result<ValidationResult, GuardError> {
        (**self).decide(ctx)
    }

    fn decide_with_prompt(&self, ctx: &MessageContext) -> Result<Decision, GuardError> {
        (**self).decide_with_prompt(ctx)
    }
}

/// What the host should do with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendVerdict {
    /// Send the message.
    Proceed,
    /// Drop the message and surface the reason to the caller.
    Reject {
        /// Why the send was rejected.
        reason: String,
    },
    /// Withhold the message and route the prompt to a human.
    Confirm {
        /// Formatted confirmation prompt.
        prompt: String,
        /// The result that triggered the confirmation.
        result: ValidationResult,
    },
}

impl SendVerdict {
    fn validation_error() -> Self {
        SendVerdict::Reject {
            reason: ValidationResult::validation_error()
                .reason
                .unwrap_or_default(),
        }
    }
}

/// Fail-closed pre-send hook around a [`Decide`] implementation.
#[derive(Debug)]
pub struct PreSendHook<D> {
    decider: D,
}

impl<D: Decide> PreSendHook<D> {
    /// Wrap a decider.
    pub fn new(decider: D) -> Self {
        Self { decider }
    }

    /// The wrapped decider.
    pub fn decider(&self) -> &D {
        &self.decider
    }

    /// Validation result for `ctx`; errors and panics become a block.
    pub fn evaluate(&self, ctx: &MessageContext) -> ValidationResult {
        match guarded(|| self.decider.decide(ctx)) {
            Ok(result) => result,
            Err(e) => {
                warn!(destination = %ctx.destination, error = %e, "validation failed, blocking send");
                ValidationResult::validation_error()
            }
        }
    }

    /// Decide what to do with `ctx`. Never fails open.
    pub fn check(&self, ctx: &MessageContext) -> SendVerdict {
        let Decision { result, prompt } = match guarded(|| self.decider.decide_with_prompt(ctx)) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(destination = %ctx.destination, error = %e, "validation failed, blocking send");
                return SendVerdict::validation_error();
            }
        };

        debug!(destination = %ctx.destination, action = %result.action, "pre-send verdict");
        match result.action {
            Action::Allow => SendVerdict::Proceed,
            Action::Block => SendVerdict::Reject {
                reason: result
                    .reason
                    .unwrap_or_else(|| "blocked by routing rules".to_owned()),
            },
            Action::Ask => match prompt {
                Some(prompt) => SendVerdict::Confirm { prompt, result },
                None => {
                    warn!(destination = %ctx.destination, "ask result without a prompt, blocking send");
                    SendVerdict::validation_error()
                }
            },
        }
    }
}

/// Run `f`, turning a panic into [`GuardError::Panicked`].
fn guarded<T>(f: impl FnOnce() -> Result<T, GuardError>) -> Result<T, GuardError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            Err(GuardError::Panicked(detail))
        }
    }
}
