//! Username policy: syntax, reservation, and availability checks.
//!
//! Checks run in a fixed order and short-circuit on the first failure, so
//! callers always surface exactly one reason.

use std::fmt::{Display, Formatter};
use std::time::SystemTime;

use crate::{Account, ReservedUsernames};

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 30;

/// The single failing reason of a username check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsernameIssue {
    Empty,
    TooShortOrLong,
    BadChars,
    LeadingOrTrailingHyphen,
    ConsecutiveHyphens,
    Reserved,
    Taken,
}

impl UsernameIssue {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            UsernameIssue::Empty => "empty",
            UsernameIssue::TooShortOrLong => "too_short_or_long",
            UsernameIssue::BadChars => "bad_chars",
            UsernameIssue::LeadingOrTrailingHyphen => "leading_or_trailing_hyphen",
            UsernameIssue::ConsecutiveHyphens => "consecutive_hyphens",
            UsernameIssue::Reserved => "reserved",
            UsernameIssue::Taken => "taken",
        }
    }

    /// Human-readable message shown to the end user.
    pub fn message(&self) -> &'static str {
        match self {
            UsernameIssue::Empty => "Username is required",
            UsernameIssue::TooShortOrLong => "Username must be between 3 and 30 characters",
            UsernameIssue::BadChars => {
                "Username can only contain lowercase letters, numbers, and hyphens"
            }
            UsernameIssue::LeadingOrTrailingHyphen => {
                "Username cannot start or end with a hyphen"
            }
            UsernameIssue::ConsecutiveHyphens => "Username cannot have consecutive hyphens",
            UsernameIssue::Reserved => "This username is reserved",
            UsernameIssue::Taken => "Username is already taken",
        }
    }
}

impl Display for UsernameIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Syntax checks (non-empty, length, charset, hyphen placement), in order.
/// Comparison is case-insensitive: the candidate is lower-cased first.
pub fn validate_format(candidate: &str) -> Result<(), UsernameIssue> {
    if candidate.is_empty() {
        return Err(UsernameIssue::Empty);
    }
    let len = candidate.chars().count();
    if len < USERNAME_MIN_LEN || len > USERNAME_MAX_LEN {
        return Err(UsernameIssue::TooShortOrLong);
    }
    let lowered = candidate.to_lowercase();
    if !lowered
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(UsernameIssue::BadChars);
    }
    if lowered.starts_with('-') || lowered.ends_with('-') {
        return Err(UsernameIssue::LeadingOrTrailingHyphen);
    }
    if lowered.contains("--") {
        return Err(UsernameIssue::ConsecutiveHyphens);
    }
    Ok(())
}

/// Full policy check against the reserved set and the row (if any) currently
/// holding the candidate name. `holder` is whatever a case-insensitive
/// lookup of the stored username returned, soft-deleted rows included; a
/// soft-deleted holder blocks until its grace period has elapsed at `now`.
pub fn check_username(
    candidate: &str,
    reserved: &ReservedUsernames,
    holder: Option<&Account>,
    now: SystemTime,
) -> Result<(), UsernameIssue> {
    validate_format(candidate)?;
    if reserved.contains(candidate) {
        return Err(UsernameIssue::Reserved);
    }
    if holder.is_some_and(|acct| acct.blocks_username(now)) {
        return Err(UsernameIssue::Taken);
    }
    Ok(())
}
