//! Validated text primitives shared by the regulation crates.
//!
//! Free-text fields that carry meaning in the request lifecycle (a denial justification, a
//! return reason, an actor's display name) must never be blank. Wrapping them in
//! [`NonEmptyText`] moves that check to the boundary where the value is first received.

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The trimmed input is shorter than the required minimum
    #[error("Text must have at least {min} characters")]
    TooShort { min: usize },
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] if the input is empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Creates a `NonEmptyText` whose trimmed content has at least `min` characters.
    ///
    /// Characters are counted as Unicode scalar values, so accented names are not penalised.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] for blank input and [`TextError::TooShort`] when the trimmed
    /// text has fewer than `min` characters.
    pub fn with_min_chars(input: impl AsRef<str>, min: usize) -> Result<Self, TextError> {
        let text = Self::new(input)?;
        if text.0.chars().count() < min {
            return Err(TextError::TooShort { min });
        }
        Ok(text)
    }

    /// Converts an optional raw string into an optional `NonEmptyText`, treating blank input
    /// as absent.
    pub fn from_optional(input: Option<impl AsRef<str>>) -> Option<Self> {
        input.and_then(|s| Self::new(s).ok())
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the owned string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_surrounding_whitespace() {
        let text = NonEmptyText::new("  exame incompleto \n").unwrap();
        assert_eq!(text.as_str(), "exame incompleto");
    }

    #[test]
    fn rejects_blank_input() {
        assert_eq!(NonEmptyText::new("   ").unwrap_err(), TextError::Empty);
        assert_eq!(NonEmptyText::new("").unwrap_err(), TextError::Empty);
    }

    #[test]
    fn min_chars_counts_unicode_scalars() {
        assert!(NonEmptyText::with_min_chars("Zé ", 2).is_ok());
        assert_eq!(
            NonEmptyText::with_min_chars("Jo", 3).unwrap_err(),
            TextError::TooShort { min: 3 }
        );
    }

    #[test]
    fn from_optional_drops_blank_values() {
        assert!(NonEmptyText::from_optional(Some("  ")).is_none());
        assert!(NonEmptyText::from_optional(None::<&str>).is_none());
        assert_eq!(
            NonEmptyText::from_optional(Some("motivo")).unwrap().as_str(),
            "motivo"
        );
    }

    #[test]
    fn deserialize_rejects_blank_string() {
        let err = serde_json::from_str::<NonEmptyText>("\"  \"");
        assert!(err.is_err());

        let ok: NonEmptyText = serde_json::from_str("\"UBS Norte\"").unwrap();
        assert_eq!(ok.as_str(), "UBS Norte");
    }
}
