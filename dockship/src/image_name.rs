use std::{borrow::Cow, fmt, sync::LazyLock};

use regex::Regex;

static IMAGE_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9._-]*[a-z0-9]$").unwrap());

fn is_lowercase_alphanumeric(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit()
}

fn is_separator(c: char) -> bool {
    matches!(c, '.' | '_' | '-')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidImageName {
    Empty,
    TooShort,
    Uppercase(char),
    DisallowedCharacter(char),
    LeadingSeparator(char),
    TrailingSeparator(char),
}

impl std::error::Error for InvalidImageName {}

impl fmt::Display for InvalidImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidImageName::Empty => f.write_str("image name must not be empty"),
            InvalidImageName::TooShort => {
                f.write_str("image name must be at least 2 characters long")
            }
            InvalidImageName::Uppercase(c) => {
                write!(f, "image name must be lowercase, found {c:?}")
            }
            InvalidImageName::DisallowedCharacter(c) => write!(
                f,
                "image name may only contain lowercase letters, digits, '.', '-' and '_', found {c:?}"
            ),
            InvalidImageName::LeadingSeparator(c) => write!(
                f,
                "image name must start with a lowercase letter or digit, found {c:?}"
            ),
            InvalidImageName::TrailingSeparator(c) => write!(
                f,
                "image name must end with a lowercase letter or digit, found {c:?}"
            ),
        }
    }
}

/// Returns `Ok` if the name matches `^[a-z0-9][a-z0-9._-]*[a-z0-9]$`. Names of a single character
/// never match.
pub fn validate(name: &str) -> Result<(), InvalidImageName> {
    if name.is_empty() {
        return Err(InvalidImageName::Empty);
    }

    if IMAGE_NAME_REGEX.is_match(name) {
        return Ok(());
    }

    // Explain the first rule that is violated.
    if let Some(c) = name.chars().find(char::is_ascii_uppercase) {
        return Err(InvalidImageName::Uppercase(c));
    }
    if let Some(c) = name
        .chars()
        .find(|&c| !is_lowercase_alphanumeric(c) && !is_separator(c))
    {
        return Err(InvalidImageName::DisallowedCharacter(c));
    }
    if let Some(c) = name.chars().next().filter(|&c| is_separator(c)) {
        return Err(InvalidImageName::LeadingSeparator(c));
    }
    if let Some(c) = name.chars().next_back().filter(|&c| is_separator(c)) {
        return Err(InvalidImageName::TrailingSeparator(c));
    }
    debug_assert_eq!(name.chars().count(), 1);
    Err(InvalidImageName::TooShort)
}

/// Attempts to lossily convert the input into a name accepted by [`validate`]. Letters are
/// lowercased, runs of other characters become a single separator and leading or trailing runs
/// are dropped. Returns `None` if the result would still be invalid, e.g. when fewer than two
/// alphanumeric characters remain.
pub fn to_image_name_lossy(input: &str) -> Option<Cow<'_, str>> {
    if validate(input).is_ok() {
        return Some(Cow::Borrowed(input));
    }

    let mut output = String::with_capacity(input.len());
    let mut run_start: Option<char> = None;
    let mut run_len = 0usize;

    for c in input.chars().map(|c| c.to_ascii_lowercase()) {
        if is_lowercase_alphanumeric(c) {
            if run_len > 0 && !output.is_empty() {
                output.push(match run_start {
                    Some(separator) if run_len == 1 && is_separator(separator) => separator,
                    _ => '-',
                });
            }
            run_start = None;
            run_len = 0;
            output.push(c);
        } else {
            if run_len == 0 {
                run_start = Some(c);
            }
            run_len += 1;
        }
    }

    validate(&output).ok().map(|()| Cow::Owned(output))
}
