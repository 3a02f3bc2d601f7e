//! Formula normalization and content-addressed hashing.
//!
//! Pure, synchronous, no I/O. The only job of this crate is to turn raw
//! client input into the canonical `(normalized_input, hash)` pair that
//! [`sat-store`] uses as the dedup key, and to reject malformed input before
//! it ever reaches a database transaction or the job queue.

use sha2::{Digest, Sha256};
use std::fmt;

/// Maximum accepted input length, in characters.
pub const MAX_INPUT_LEN: usize = 300_000;
/// Maximum accepted token count.
pub const MAX_TOKEN_COUNT: usize = 85_000;

/// Operators allowed alongside alphanumeric variable tokens.
const ALLOWED_OPERATORS: &[&str] = &["&&", "||", "<=>", "=>", "!"];

/// The notation a submitted formula is expressed in.
///
/// A closed variant set rather than a free-form string: adding a notation is
/// a data change (new variant + new validation arm), never a new dispatch
/// path grafted on elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notation {
    Rpn,
}

impl Notation {
    /// Parses the wire-level notation name (`"RPN"`). Anything else is an
    /// `InvalidNotation` at the call site, not here — callers hold the raw
    /// string for error reporting, so parsing and validation are kept
    /// separate.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "RPN" => Some(Notation::Rpn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Notation::Rpn => "RPN",
        }
    }
}

impl fmt::Display for Notation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized formula ready for hashing and storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub notation: Notation,
    pub normalized_input: String,
    pub hash: String,
}

/// Why a submission was rejected. `Display` renders the human-readable
/// reason that `sat-core` surfaces as `InvalidFormula`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    InvalidNotation(String),
    Empty,
    TooLong { len: usize },
    ContainsNul,
    TooManyTokens { count: usize },
    InvalidToken(String),
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeError::InvalidNotation(n) => write!(f, "unsupported notation: {n}"),
            NormalizeError::Empty => write!(f, "formula is empty or whitespace-only"),
            NormalizeError::TooLong { len } => {
                write!(f, "formula length {len} exceeds max of {MAX_INPUT_LEN}")
            }
            NormalizeError::ContainsNul => write!(f, "formula contains a NUL byte"),
            NormalizeError::TooManyTokens { count } => write!(
                f,
                "token count {count} exceeds max of {MAX_TOKEN_COUNT}"
            ),
            NormalizeError::InvalidToken(tok) => write!(f, "invalid token: {tok}"),
        }
    }
}

impl std::error::Error for NormalizeError {}

fn is_valid_token(tok: &str) -> bool {
    tok.chars().all(|c| c.is_ascii_alphanumeric()) || ALLOWED_OPERATORS.contains(&tok)
}

/// Validates and canonicalizes `raw` under `notation`, then computes its
/// content hash.
///
/// Canonicalization splits on runs of whitespace and rejoins with single
/// spaces; the token sequence itself is never reordered (RPN is
/// position-sensitive). The hash is `sha256("<NOTATION>:" + normalized)`,
/// lowercase hex.
pub fn normalize_and_hash(raw: &str, notation: &str) -> Result<Normalized, NormalizeError> {
    let notation = Notation::parse(notation)
        .ok_or_else(|| NormalizeError::InvalidNotation(notation.to_string()))?;

    if raw.contains('\0') {
        return Err(NormalizeError::ContainsNul);
    }
    if raw.len() > MAX_INPUT_LEN {
        return Err(NormalizeError::TooLong { len: raw.len() });
    }

    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(NormalizeError::Empty);
    }
    if tokens.len() > MAX_TOKEN_COUNT {
        return Err(NormalizeError::TooManyTokens {
            count: tokens.len(),
        });
    }
    for tok in &tokens {
        if !is_valid_token(tok) {
            return Err(NormalizeError::InvalidToken((*tok).to_string()));
        }
    }

    let normalized_input = tokens.join(" ");
    let hash = hash_for(notation, &normalized_input);

    Ok(Normalized {
        notation,
        normalized_input,
        hash,
    })
}

fn hash_for(notation: Notation, normalized_input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(notation.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(normalized_input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_whitespace_without_reordering_tokens() {
        let n = normalize_and_hash("A   B\t&&\n", "RPN").unwrap();
        assert_eq!(n.normalized_input, "A B &&");
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(normalize_and_hash("   ", "RPN"), Err(NormalizeError::Empty));
    }

    #[test]
    fn rejects_input_over_max_len() {
        let raw = "A".repeat(MAX_INPUT_LEN + 1);
        assert_eq!(
            normalize_and_hash(&raw, "RPN"),
            Err(NormalizeError::TooLong {
                len: MAX_INPUT_LEN + 1
            })
        );
    }

    #[test]
    fn rejects_nul_byte() {
        assert_eq!(
            normalize_and_hash("A\0B", "RPN"),
            Err(NormalizeError::ContainsNul)
        );
    }

    #[test]
    fn rejects_too_many_tokens() {
        let raw = vec!["A"; MAX_TOKEN_COUNT + 1].join(" ");
        assert_eq!(
            normalize_and_hash(&raw, "RPN"),
            Err(NormalizeError::TooManyTokens {
                count: MAX_TOKEN_COUNT + 1
            })
        );
    }

    #[test]
    fn rejects_disallowed_token() {
        assert_eq!(
            normalize_and_hash("A @ B", "RPN"),
            Err(NormalizeError::InvalidToken("@".to_string()))
        );
    }

    #[test]
    fn rejects_non_rpn_notation() {
        assert_eq!(
            normalize_and_hash("A B &&", "CNF"),
            Err(NormalizeError::InvalidNotation("CNF".to_string()))
        );
    }

    #[test]
    fn accepts_all_allowed_operators() {
        let n = normalize_and_hash("A B && C || D <=> E => F !", "RPN").unwrap();
        assert_eq!(n.normalized_input, "A B && C || D <=> E => F !");
    }

    #[test]
    fn normalize_round_trip_is_stable() {
        let first = normalize_and_hash("A   B &&", "RPN").unwrap();
        let second = normalize_and_hash(&first.normalized_input, "RPN").unwrap();
        assert_eq!(first.normalized_input, second.normalized_input);
        assert_eq!(first.hash, second.hash);
    }

    #[test]
    fn hash_is_position_sensitive() {
        let a = normalize_and_hash("A B &&", "RPN").unwrap();
        let b = normalize_and_hash("B A &&", "RPN").unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn hash_is_lowercase_hex_sha256_of_notation_prefixed_input() {
        let n = normalize_and_hash("A B &&", "RPN").unwrap();
        assert_eq!(n.hash.len(), 64);
        assert!(n.hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
