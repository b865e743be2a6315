//! Sendgate: a pre-send routing guard for outgoing chat messages.
//!
//! Before a message goes out, sendgate classifies it, looks up the rule for
//! its type, and decides whether the destination may receive it: allow,
//! block, or ask a human first. The rule table is an immutable value loaded
//! from a file; reloads swap in a whole new table.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;

pub mod rules;
pub mod validator;

pub mod handle;
pub mod hook;
