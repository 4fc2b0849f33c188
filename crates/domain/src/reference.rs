//! Bank-remittance-safe payment references.
//!
//! A reference is `PAY` followed by seventeen Crockford base32 symbols: seven
//! encode the issue time in seconds, nine are random, the last one is a check
//! symbol over the preceding sixteen. Twenty uppercase alphanumerics fit every
//! SEPA remittance field and survive case folding by bank front ends.

use paygate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Literal prefix of every payment reference.
pub const REFERENCE_PREFIX: &str = "PAY";

/// Total reference length in characters.
pub const REFERENCE_LENGTH: usize = 20;

/// Number of random symbols in one reference.
pub const RANDOM_COMPONENT_LENGTH: usize = 9;

const TIME_COMPONENT_LENGTH: usize = 7;
const BODY_LENGTH: usize = TIME_COMPONENT_LENGTH + RANDOM_COMPONENT_LENGTH;
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Unique token embedded in a bank remittance to match a transaction to a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentReference(String);

impl PaymentReference {
    /// Builds a reference from a time component and random bytes.
    ///
    /// Only the low five bits of each random byte are used.
    #[must_use]
    pub fn compose(issued_at_unix_seconds: i64, random: &[u8; RANDOM_COMPONENT_LENGTH]) -> Self {
        let mut body = [0_u8; BODY_LENGTH];

        let mut remaining = issued_at_unix_seconds.rem_euclid(1_i64 << (5 * TIME_COMPONENT_LENGTH));
        for slot in body[..TIME_COMPONENT_LENGTH].iter_mut().rev() {
            *slot = (remaining & 0x1f) as u8;
            remaining >>= 5;
        }

        for (slot, byte) in body[TIME_COMPONENT_LENGTH..].iter_mut().zip(random) {
            *slot = byte & 0x1f;
        }

        let mut value = String::with_capacity(REFERENCE_LENGTH);
        value.push_str(REFERENCE_PREFIX);
        value.extend(body.iter().map(|symbol| char::from(ALPHABET[usize::from(*symbol)])));
        value.push(char::from(ALPHABET[usize::from(check_symbol(&body))]));

        Self(value)
    }

    /// Parses and validates a stored or transmitted reference.
    pub fn parse(value: &str) -> AppResult<Self> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::parse_bytes(normalized.as_bytes()).ok_or_else(|| {
            AppError::Validation(format!("'{value}' is not a valid payment reference"))
        })
    }

    /// Returns the reference string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn parse_bytes(candidate: &[u8]) -> Option<Self> {
        if candidate.len() != REFERENCE_LENGTH || !candidate.starts_with(REFERENCE_PREFIX.as_bytes())
        {
            return None;
        }

        let symbols = &candidate[REFERENCE_PREFIX.len()..];
        let mut body = [0_u8; BODY_LENGTH];
        for (slot, byte) in body.iter_mut().zip(symbols) {
            *slot = symbol_value(*byte)?;
        }

        let check = symbol_value(symbols[BODY_LENGTH])?;
        if check != check_symbol(&body) {
            return None;
        }

        let text = std::str::from_utf8(candidate).ok()?;
        Some(Self(text.to_owned()))
    }
}

impl std::fmt::Display for PaymentReference {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Scans free remittance text for every distinct valid reference, in order of appearance.
#[must_use]
pub fn extract_references(remittance_text: &str) -> Vec<PaymentReference> {
    let normalized = remittance_text.to_ascii_uppercase();
    let bytes = normalized.as_bytes();
    let prefix = REFERENCE_PREFIX.as_bytes();

    let mut found: Vec<PaymentReference> = Vec::new();
    let mut index = 0;
    while index + REFERENCE_LENGTH <= bytes.len() {
        if bytes[index..].starts_with(prefix)
            && let Some(reference) =
                PaymentReference::parse_bytes(&bytes[index..index + REFERENCE_LENGTH])
        {
            if !found.contains(&reference) {
                found.push(reference);
            }
            index += REFERENCE_LENGTH;
            continue;
        }
        index += 1;
    }

    found
}

fn symbol_value(byte: u8) -> Option<u8> {
    ALPHABET
        .iter()
        .position(|symbol| *symbol == byte)
        .and_then(|position| u8::try_from(position).ok())
}

// Odd weights are invertible mod 32, so any single substituted symbol changes the sum.
fn check_symbol(body: &[u8; BODY_LENGTH]) -> u8 {
    let sum = body
        .iter()
        .enumerate()
        .fold(0_usize, |acc, (position, symbol)| {
            acc + usize::from(*symbol) * (2 * position + 1)
        });
    (sum % ALPHABET.len()) as u8
}
