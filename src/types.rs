//! Core identifier type for stored curves.
//!
//! COD ids are 7-digit decimal codes. They arrive as integers, exact
//! strings, or embedded in longer strings such as `cod1234567.npy`
//! filenames and container entry names; all forms canonicalize to the same
//! fixed-width value.

use crate::error::{PdfError, PdfResult};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

const ID_MIN: u32 = 1_000_000;
const ID_MAX: u32 = 9_999_999;

/// Type-safe wrapper for a 7-digit COD identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodId(u32);

impl CodId {
    /// Creates an id from an integer, range-checked to 7 digits.
    pub fn new(id: u32) -> PdfResult<Self> {
        if !(ID_MIN..=ID_MAX).contains(&id) {
            return Err(PdfError::IdOutOfRange(id as u64));
        }
        Ok(Self(id))
    }

    /// Canonicalizes an id from text.
    ///
    /// Accepts an exact 7-digit string, or any string containing a unique
    /// maximal run of exactly 7 digits (`cod1234567.npy`, `pdfc/cod1234567`).
    /// Fails when no such run exists or when two distinct runs do.
    pub fn parse(text: &str) -> PdfResult<Self> {
        static DIGIT_RUN: OnceLock<Regex> = OnceLock::new();
        let rx = DIGIT_RUN.get_or_init(|| Regex::new(r"\d+").expect("static regex"));
        let mut found: Option<&str> = None;
        for m in rx.find_iter(text) {
            let run = m.as_str();
            if run.len() != 7 {
                continue;
            }
            match found {
                None => found = Some(run),
                // The same id repeated in a path is fine; distinct runs are not.
                Some(prev) if prev == run => {}
                Some(prev) => {
                    return Err(PdfError::AmbiguousId {
                        input: text.to_string(),
                        first: prev.to_string(),
                        second: run.to_string(),
                    });
                }
            }
        }
        let run = found.ok_or_else(|| PdfError::NoIdSegment {
            input: text.to_string(),
        })?;
        let value: u32 = run.parse().expect("7 ascii digits fit in u32");
        Self::new(value)
    }

    /// Returns the underlying integer value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Returns the store entry name for this id, `cod<7-digit-id>`.
    #[must_use]
    pub fn entry_name(self) -> String {
        format!("cod{self}")
    }

    /// Converts to little-endian bytes for the flat id array.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Creates from little-endian bytes, range-checked.
    pub fn from_bytes(bytes: [u8; 4]) -> PdfResult<Self> {
        Self::new(u32::from_le_bytes(bytes))
    }
}

impl fmt::Display for CodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:07}", self.0)
    }
}

impl FromStr for CodId {
    type Err = PdfError;

    fn from_str(s: &str) -> PdfResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<u32> for CodId {
    type Error = PdfError;

    fn try_from(id: u32) -> PdfResult<Self> {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_range() {
        assert_eq!(CodId::new(1234567).unwrap().get(), 1234567);
        assert!(matches!(CodId::new(12), Err(PdfError::IdOutOfRange(12))));
        assert!(CodId::new(99999999).is_err());
    }

    #[test]
    fn test_canonical_forms_agree() {
        let a = CodId::new(1234567).unwrap();
        let b = CodId::parse("1234567").unwrap();
        let c = CodId::parse("cod1234567.npy").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.to_string(), "1234567");
        assert_eq!(a.entry_name(), "cod1234567");
    }

    #[test]
    fn test_extraction_failures() {
        assert!(matches!(
            CodId::parse("12"),
            Err(PdfError::NoIdSegment { .. })
        ));
        assert!(matches!(
            CodId::parse("no digits here"),
            Err(PdfError::NoIdSegment { .. })
        ));
        // An 8-digit run is not a 7-digit id.
        assert!(CodId::parse("cod12345678").is_err());
    }

    #[test]
    fn test_repeated_run_is_not_ambiguous() {
        let id = CodId::parse("cod1234567/1234567.npy").unwrap();
        assert_eq!(id.get(), 1234567);
    }

    #[test]
    fn test_distinct_runs_are_ambiguous() {
        assert!(matches!(
            CodId::parse("cod1234567-7654321"),
            Err(PdfError::AmbiguousId { .. })
        ));
    }

    #[test]
    fn test_byte_round_trip() {
        let id = CodId::new(7654321).unwrap();
        assert_eq!(CodId::from_bytes(id.to_bytes()).unwrap(), id);
    }
}
