//! User command parsing

use regex::{Regex, RegexBuilder};

use crate::Error;

/// Regular expression command parser.
///
/// The first capture group of the pattern holds the command argument.
///
/// # Example
///
/// ```rust
/// use vkcraft::command::Command;
/// let command = Command::new(r"^/bonus\s*(\w*)", "i").unwrap();
/// assert_eq!(command.parse("/bonus Notch"), Some("Notch"));
/// assert_eq!(command.parse("/BONUS"), Some(""));
/// assert_eq!(command.parse("hello"), None);
/// ```
#[derive(Debug, Clone)]
pub struct Command {
    /// The compiled pattern to match against.
    regex: Regex,
}

impl Command {
    /// Compiles `pattern` with the given JavaScript-style `flags`.
    ///
    /// Supported flags are `i` (case-insensitive), `m` (multi-line), `s` (dot matches newline),
    /// `x` (ignore whitespace) and `U` (swap greed). `g` and `u` are accepted and have no effect.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPatternFlag`] if `flags` contains an unknown flag.
    /// - [`Error::InvalidPattern`] if the pattern doesn't compile.
    /// - [`Error::MissingCaptureGroup`] if the pattern has no capture group.
    pub fn new(pattern: &str, flags: &str) -> Result<Self, Error> {
        let mut builder = RegexBuilder::new(pattern);

        for flag in flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                'U' => builder.swap_greed(true),
                'g' | 'u' => &mut builder,
                other => return Err(Error::InvalidPatternFlag(other)),
            };
        }

        let regex = builder.build().map_err(Error::InvalidPattern)?;

        // The implicit group 0 is the whole match.
        if regex.captures_len() < 2 {
            return Err(Error::MissingCaptureGroup);
        }

        Ok(Self { regex })
    }

    /// Checks if the supplied input matches the pattern, and if so, returns the text of the first
    /// capture group.
    ///
    /// Returns an empty string when the pattern matched but the group didn't participate.
    #[must_use]
    pub fn parse<'a>(&self, input: &'a str) -> Option<&'a str> {
        let captures = self.regex.captures(input)?;

        Some(captures.get(1).map_or("", |group| group.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_nickname() {
        let command = Command::new(r"^!bonus (\S+)", "").unwrap();

        assert_eq!(command.parse("!bonus Notch"), Some("Notch"));
    }

    #[test]
    fn parse_command_is_some() {
        let command = Command::new(r"^!bonus\s*(\S*)", "").unwrap();

        assert_eq!(command.parse("!bonus"), Some(""));
    }

    #[test]
    fn parse_optional_group_is_empty() {
        let command = Command::new(r"^!bonus(?: (\S+))?$", "").unwrap();

        assert_eq!(command.parse("!bonus"), Some(""));
        assert_eq!(command.parse("!bonus jeb_"), Some("jeb_"));
    }

    #[test]
    fn parse_searches_anywhere() {
        let command = Command::new(r"bonus (\w+)", "").unwrap();

        assert_eq!(command.parse("give me my bonus Dinnerbone please"), Some("Dinnerbone"));
    }

    #[test]
    fn skip_on_no_match() {
        let command = Command::new(r"^!bonus (\S+)", "").unwrap();

        assert_eq!(command.parse("!bonuses Notch"), None);
        assert_eq!(command.parse("hello"), None);
    }

    #[test]
    fn case_insensitive_flag() {
        let command = Command::new(r"^!bonus (\S+)", "gi").unwrap();

        assert_eq!(command.parse("!BoNuS Notch"), Some("Notch"));
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(matches!(
            Command::new(r"(\w+)", "iy"),
            Err(Error::InvalidPatternFlag('y'))
        ));
    }

    #[test]
    fn rejects_pattern_without_group() {
        assert!(matches!(
            Command::new(r"^!bonus", ""),
            Err(Error::MissingCaptureGroup)
        ));
    }

    #[test]
    fn rejects_invalid_pattern() {
        assert!(matches!(
            Command::new(r"(unclosed", ""),
            Err(Error::InvalidPattern(_))
        ));
    }
}
