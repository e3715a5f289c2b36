//! Secret handling for elevated execution

use std::fmt;

pub const REDACTED: &str = "***";

/// A privilege-escalation secret. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", REDACTED)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Replaces known secrets in captured output before it is stored or shown
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<Secret>,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, secret: &Secret) -> Self {
        self.add(secret);
        self
    }

    pub fn add(&mut self, secret: &Secret) {
        if !secret.is_empty() && !self.secrets.contains(secret) {
            self.secrets.push(secret.clone());
            // longest first so a secret containing another is fully masked
            self.secrets.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        }
    }

    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.expose(), REDACTED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_never_formatted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{}", secret), "***");
        assert_eq!(format!("{:?}", secret), "Secret(***)");
    }

    #[test]
    fn test_redaction() {
        let redactor = Redactor::new()
            .with_secret(&Secret::new("pass"))
            .with_secret(&Secret::new("password1"));

        assert_eq!(
            redactor.redact("sudo: password1 rejected, pass again"),
            "sudo: *** rejected, *** again"
        );
        assert_eq!(Redactor::new().redact("untouched"), "untouched");
    }

    #[test]
    fn test_empty_secret_ignored() {
        let redactor = Redactor::new().with_secret(&Secret::new(""));
        assert_eq!(redactor.redact("abc"), "abc");
    }
}
