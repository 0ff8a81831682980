//! Offline phone number geocoding.
//!
//! Numbers must be in international format: a leading `+`, the calling code,
//! then the national significant number (NSN). Spaces, dashes, dots, slashes
//! and parentheses are ignored. Anything else is rejected as not a number.
//!
//! Parsing and validation are separate steps, so callers can tell "this is
//! not a phone number" apart from "this is a number no region assigns":
//!
//! ```text
//! "asdf"            -> NOT_A_NUMBER
//! "5591996109"      -> INVALID_COUNTRY_CODE (no calling code)
//! "+1 155 555 0100" -> parses, but invalid for NANP
//! "+1 650 455 6864" -> US, California
//! ```

mod plan;

use super::{LookupError, PhoneLookup};
use crate::protocol::Location;
use std::fmt;

/// Inputs longer than this are not parsed.
const MAX_INPUT_LENGTH: usize = 250;

/// Shortest NSN accepted by the parser.
const MIN_NSN_LENGTH: usize = 2;

/// Longest NSN accepted by the parser.
const MAX_NSN_LENGTH: usize = 17;

/// Longest calling code, in digits.
const MAX_CALLING_CODE_LENGTH: usize = 3;

/// Why an input failed to parse as a phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    InvalidCountryCode,
    NotANumber,
    TooShortAfterIdd,
    TooShortNsn,
    TooLong,
}

impl ParseErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseErrorKind::InvalidCountryCode => "INVALID_COUNTRY_CODE",
            ParseErrorKind::NotANumber => "NOT_A_NUMBER",
            ParseErrorKind::TooShortAfterIdd => "TOO_SHORT_AFTER_IDD",
            ParseErrorKind::TooShortNsn => "TOO_SHORT_NSN",
            ParseErrorKind::TooLong => "TOO_LONG",
        }
    }

    /// Human-readable explanation.
    pub fn detail(&self) -> &'static str {
        match self {
            ParseErrorKind::InvalidCountryCode => "Could not interpret numbers after plus-sign.",
            ParseErrorKind::NotANumber => "The string supplied did not seem to be a phone number.",
            ParseErrorKind::TooShortAfterIdd => {
                "Phone number had an IDD, but after this was not long enough to be a viable phone number."
            }
            ParseErrorKind::TooShortNsn => "The string supplied is too short to be a phone number.",
            ParseErrorKind::TooLong => "The string supplied is too long to be a phone number.",
        }
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed, not necessarily valid, phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNumber {
    pub calling_code: u16,
    /// National significant number, digits only.
    pub national_number: String,
}

/// Parse an international-format phone number.
pub fn parse(input: &str) -> Result<PhoneNumber, ParseErrorKind> {
    let trimmed = input.trim();
    if trimmed.len() > MAX_INPUT_LENGTH {
        return Err(ParseErrorKind::TooLong);
    }

    let mut digits = String::with_capacity(trimmed.len());
    let mut has_plus = false;
    for c in trimmed.chars() {
        match c {
            '0'..='9' => digits.push(c),
            '+' if digits.is_empty() && !has_plus => has_plus = true,
            ' ' | '\t' | '-' | '.' | '/' | '(' | ')' => {}
            _ => return Err(ParseErrorKind::NotANumber),
        }
    }

    if digits.len() < MIN_NSN_LENGTH {
        return Err(ParseErrorKind::NotANumber);
    }
    if !has_plus {
        return Err(ParseErrorKind::InvalidCountryCode);
    }
    if digits.len() <= MIN_NSN_LENGTH {
        return Err(ParseErrorKind::TooShortAfterIdd);
    }

    let code_len = (1..=MAX_CALLING_CODE_LENGTH)
        .find(|&len| {
            !digits.starts_with('0')
                && digits[..len]
                    .parse::<u16>()
                    .map(plan::is_calling_code)
                    .unwrap_or(false)
        })
        .ok_or(ParseErrorKind::InvalidCountryCode)?;

    let calling_code = digits[..code_len]
        .parse::<u16>()
        .map_err(|_| ParseErrorKind::InvalidCountryCode)?;
    let national_number = digits.split_off(code_len);

    if national_number.len() < MIN_NSN_LENGTH {
        return Err(ParseErrorKind::TooShortNsn);
    }
    if national_number.len() > MAX_NSN_LENGTH {
        return Err(ParseErrorKind::TooLong);
    }

    Ok(PhoneNumber {
        calling_code,
        national_number,
    })
}

/// [`PhoneLookup`] backed by the built-in numbering plan.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflinePhoneLookup;

impl OfflinePhoneLookup {
    pub fn new() -> Self {
        Self
    }
}

impl PhoneLookup for OfflinePhoneLookup {
    fn lookup(&self, number: &str) -> Result<Location, LookupError> {
        let parsed = parse(number).map_err(|kind| LookupError::PhoneParse {
            kind,
            input: number.to_string(),
        })?;

        let region = plan::region_for(parsed.calling_code, &parsed.national_number)
            .filter(|region| region.is_valid(&parsed.national_number))
            .ok_or_else(|| LookupError::InvalidNumber(number.to_string()))?;

        let subdivision = region
            .describe(&parsed.national_number)
            .unwrap_or(region.name);

        Ok(Location {
            country_iso: region.iso.to_string(),
            country_name: region.name.to_string(),
            subdivision_name: subdivision.to_string(),
            ..Default::default()
        })
    }
}
