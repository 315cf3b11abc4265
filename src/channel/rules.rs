//! Prompt rule tables for automated responses.
//!
//! A rule is a (suffix, response) pair. Rules are evaluated in order
//! against the tail of observed output; the first suffix that matches
//! wins and its response is sent, followed by a newline.

use secrecy::{ExposeSecret, SecretString};

/// A single prompt rule: when output ends with `suffix`, answer `response`.
#[derive(Debug, Clone)]
pub struct PromptRule {
    /// Exact trailing text that triggers this rule.
    pub suffix: String,

    /// The canned answer, sent with a trailing newline.
    pub response: String,
}

impl PromptRule {
    /// Create a new prompt rule.
    pub fn new(suffix: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            response: response.into(),
        }
    }
}

/// An ordered rule table. Order is priority: within one observed chunk
/// the first matching rule fires and evaluation stops.
#[derive(Debug, Clone, Default)]
pub struct PromptRules {
    rules: Vec<PromptRule>,
}

impl PromptRules {
    /// An empty table. No output ever triggers a response.
    pub fn none() -> Self {
        Self::default()
    }

    /// Caller-supplied ordered rules; answer i corresponds to suffix i.
    pub fn custom<S, R>(pairs: impl IntoIterator<Item = (S, R)>) -> Self
    where
        S: Into<String>,
        R: Into<String>,
    {
        Self {
            rules: pairs
                .into_iter()
                .map(|(s, r)| PromptRule::new(s, r))
                .collect(),
        }
    }

    /// Rules answering the usual password prompts with the stored password:
    /// sudo's prompt for the given user, a bare `Password: `, and the
    /// `'s password: ` form printed by ssh itself.
    pub fn password(username: &str, password: &SecretString) -> Self {
        let password = password.expose_secret();
        Self::custom([
            (format!("[sudo] password for {username}: "), password),
            ("Password: ".to_string(), password),
            ("'s password: ".to_string(), password),
        ])
    }

    /// Rule answering a `(yes/no)? ` confirmation with the literal "yes".
    pub fn yes() -> Self {
        Self::custom([("(yes/no)? ", "yes")])
    }

    /// Rules for a password-change dialog. Both the `New password: ` and
    /// `Retype new password: ` prompts are answered with the same password;
    /// there is no state distinguishing the first prompt from the second.
    pub fn password_change(password: &SecretString) -> Self {
        let password = password.expose_secret();
        Self::custom([
            ("New password: ", password),
            ("Retype new password: ", password),
        ])
    }

    /// Find the first rule whose suffix matches the tail of `window`
    /// and return its response.
    pub fn match_tail(&self, window: &[u8]) -> Option<&str> {
        let text = String::from_utf8_lossy(window);
        self.rules
            .iter()
            .find(|rule| text.ends_with(&rule.suffix))
            .map(|rule| rule.response.as_str())
    }

    /// Number of rules in the table.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
