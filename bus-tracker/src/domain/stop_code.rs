//! Bus stop code type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when parsing an invalid stop code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid stop code: {reason}")]
pub struct InvalidStopCode {
    reason: &'static str,
}

/// An opaque identifier for a physical bus stop.
///
/// Stop codes are assigned by the tracker service and carry no structure we
/// rely on. The only validation is that they are non-empty once surrounding
/// whitespace is removed, so a `StopCode` is always usable as a query key.
///
/// # Examples
///
/// ```
/// use bus_tracker::domain::StopCode;
///
/// let stop = StopCode::new("36232151").unwrap();
/// assert_eq!(stop.as_str(), "36232151");
///
/// // Blank codes are rejected
/// assert!(StopCode::new("").is_err());
/// assert!(StopCode::new("   ").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StopCode(String);

impl StopCode {
    /// Create a stop code, trimming surrounding whitespace.
    pub fn new(s: impl AsRef<str>) -> Result<Self, InvalidStopCode> {
        let trimmed = s.as_ref().trim();
        if trimmed.is_empty() {
            return Err(InvalidStopCode {
                reason: "stop code cannot be empty",
            });
        }
        Ok(StopCode(trimmed.to_string()))
    }

    /// Returns the stop code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the StopCode and returns the inner String.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for StopCode {
    type Error = InvalidStopCode;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        StopCode::new(s)
    }
}

impl From<StopCode> for String {
    fn from(code: StopCode) -> Self {
        code.0
    }
}

impl fmt::Debug for StopCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StopCode({})", self.0)
    }
}

impl fmt::Display for StopCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_valid_code() {
        assert!(StopCode::new("36232151").is_ok());
        assert!(StopCode::new("6200206070").is_ok());
        assert!(StopCode::new("x").is_ok());
    }

    #[test]
    fn trims_whitespace() {
        let stop = StopCode::new("  36232151\n").unwrap();
        assert_eq!(stop.as_str(), "36232151");
    }

    #[test]
    fn reject_blank() {
        assert!(StopCode::new("").is_err());
        assert!(StopCode::new(" \t").is_err());
    }

    #[test]
    fn display_and_debug() {
        let stop = StopCode::new("36232151").unwrap();
        assert_eq!(format!("{}", stop), "36232151");
        assert_eq!(format!("{:?}", stop), "StopCode(36232151)");
    }

    #[test]
    fn serde_rejects_empty() {
        let ok: StopCode = serde_json::from_str("\"36232151\"").unwrap();
        assert_eq!(ok.as_str(), "36232151");

        let err = serde_json::from_str::<StopCode>("\"\"");
        assert!(err.is_err());
    }
}
