use std::fmt;

/// A registry credential. It has no `Display` implementation and its `Debug` output is redacted,
/// so it can not end up in a log line by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Grants access to the raw value. Only hand this to a child process through stdin.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(\"***\")")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let secret = Secret::new("tok123");
        assert_eq!(format!("{secret:?}"), "Secret(\"***\")");
        assert!(!format!("{:?}", Some(&secret)).contains("tok123"));
        assert_eq!(secret.expose(), "tok123");
    }
}
