//! Format checks for account e-mail addresses and Brazilian CPF numbers.

use regex::Regex;
use std::sync::OnceLock;

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Invalid e-mail regex")
    })
}

/// Trim and lowercase an e-mail so lookups and uniqueness are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Strip `.`/`-` punctuation and return the 11 CPF digits if the check digits
/// are correct.
///
/// Sequences of a single repeated digit pass the arithmetic but are not
/// issued, so they are rejected.
pub fn normalize_cpf(cpf: &str) -> Option<String> {
    let digits: Vec<u32> = cpf
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | ' '))
        .map(|c| c.to_digit(10))
        .collect::<Option<Vec<u32>>>()?;

    if digits.len() != 11 || digits.iter().all(|d| *d == digits[0]) {
        return None;
    }

    if check_digit(&digits[..9]) != digits[9] || check_digit(&digits[..10]) != digits[10] {
        return None;
    }

    Some(digits.iter().filter_map(|d| char::from_digit(*d, 10)).collect())
}

fn check_digit(digits: &[u32]) -> u32 {
    let weight_start = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| d * (weight_start - i as u32))
        .sum();
    match sum % 11 {
        r if r < 2 => 0,
        r => 11 - r,
    }
}
