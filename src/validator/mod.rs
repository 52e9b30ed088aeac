// =====================================================
// IDENTIFIER / QUERY VALIDATOR
// Whitelist guards for names and ad-hoc SQL
// =====================================================

use crate::error::{BridgeError, BridgeResult};
use regex::Regex;
use std::sync::LazyLock;

static IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("identifier pattern is valid"));

static FREEFORM_QUERY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_ \t\n\x0B\x0C\r,=*'();]+$").expect("query pattern is valid"));

/// Accepts plain `[A-Za-z0-9_]+` names only.
///
/// Quoted, schema-qualified and non-ASCII names are rejected, even when the
/// engine itself would accept them.
pub fn validate_identifier(name: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(name)
}

/// Accepts queries built from a conservative character class.
///
/// This blocks obvious injection through the ad-hoc query path; it is not a
/// SQL parser. Blank input is rejected.
pub fn validate_freeform_query(text: &str) -> bool {
    !text.trim().is_empty() && FREEFORM_QUERY_PATTERN.is_match(text)
}

pub fn ensure_identifier(name: &str) -> BridgeResult<()> {
    if validate_identifier(name) {
        Ok(())
    } else {
        Err(BridgeError::InvalidIdentifier(name.to_string()))
    }
}

pub fn ensure_freeform_query(text: &str) -> BridgeResult<()> {
    if validate_freeform_query(text) {
        Ok(())
    } else {
        Err(BridgeError::InvalidQuery)
    }
}
