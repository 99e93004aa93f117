//! CPF (Brazilian taxpayer id) normalisation.
//!
//! CPFs arrive formatted (`111.222.333-44`) or bare (`11122233344`). They are
//! compared and stored digits-only. Check digits are not validated; the
//! directory owns identity authenticity.

use crate::{Error, Result};

/// Number of digits in a CPF.
pub const CPF_LEN: usize = 11;

/// Strip every non-digit character.
pub fn normalize(raw: &str) -> String {
  raw.chars().filter(char::is_ascii_digit).collect()
}

/// Normalise and require exactly [`CPF_LEN`] digits.
pub fn parse(raw: &str) -> Result<String> {
  let digits = normalize(raw);
  if digits.len() == CPF_LEN {
    Ok(digits)
  } else {
    Err(Error::InvalidCpf(raw.to_owned()))
  }
}

/// `true` if `raw` is written only with digits and the usual separators and
/// carries exactly [`CPF_LEN`] digits.
pub fn looks_like_cpf(raw: &str) -> bool {
  raw
    .chars()
    .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | ' '))
    && normalize(raw).len() == CPF_LEN
}

/// Render digits as `ddd.ddd.ddd-dd`. Input that is not a normalised CPF is
/// returned unchanged.
pub fn format(digits: &str) -> String {
  if digits.len() != CPF_LEN || !digits.chars().all(|c| c.is_ascii_digit()) {
    return digits.to_owned();
  }
  format!(
    "{}.{}.{}-{}",
    &digits[0..3],
    &digits[3..6],
    &digits[6..9],
    &digits[9..11]
  )
}
