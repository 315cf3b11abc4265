//! Prompt detection and response injection.
//!
//! This module holds the byte-stream automation layer: rule tables
//! describing which prompts to answer, and the intercepting sink that
//! forwards session output while injecting responses into stdin.

mod rules;
mod sink;

pub use rules::{PromptRule, PromptRules};
pub use sink::{Downstream, InterceptingSink, MatchWindow};
