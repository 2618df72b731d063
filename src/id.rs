//! Canonical JSON-RPC id keys.
//!
//! Responses and `$/cancel_request` notifications are routed by the *value*
//! of the JSON-RPC `id`, not its encoding: a peer may write `1` on the
//! request and `1e0` on the response and both must land on the same entry.
//! Numbers are normalized textually; converting through floating point would
//! collide distinct ids above 2^53.

use thiserror::Error;

/// Maximum length of a canonical id key.
pub(crate) const MAX_ID_KEY_LEN: usize = 4096;
/// Maximum absolute decimal exponent accepted on a numeric id.
pub(crate) const MAX_ID_ABS_EXP10: i64 = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum IdKeyError {
    #[error("empty json-rpc id")]
    Empty,
    #[error("invalid json-rpc id: {0}")]
    Invalid(&'static str),
    #[error("invalid json-rpc numeric id")]
    InvalidNumber,
    #[error("json-rpc numeric id too large")]
    TooLarge,
}

/// Map the raw JSON text of an id to its canonical routing key.
///
/// `null` maps to `"null"`, strings map to their JSON re-encoding, and
/// numbers map to a canonical decimal rendering with the exponent folded in.
pub(crate) fn canonical_id_key(raw: &str) -> Result<String, IdKeyError> {
    let trimmed = raw.trim_matches(|c: char| c.is_ascii_whitespace());
    if trimmed.is_empty() {
        return Err(IdKeyError::Empty);
    }

    match trimmed.as_bytes()[0] {
        b'n' => {
            if trimmed == "null" {
                Ok("null".to_string())
            } else {
                Err(IdKeyError::Invalid("expected null"))
            }
        }
        b'"' => {
            // serde_json rejects trailing data, so a full parse doubles as
            // the single-value check.
            let value: String = serde_json::from_str(trimmed)
                .map_err(|_| IdKeyError::Invalid("malformed string"))?;
            serde_json::to_string(&value).map_err(|_| IdKeyError::Invalid("malformed string"))
        }
        b'-' | b'0'..=b'9' => canonical_numeric_key(trimmed),
        _ => Err(IdKeyError::Invalid("id must be string, number, or null")),
    }
}

fn canonical_numeric_key(raw: &str) -> Result<String, IdKeyError> {
    let (negative, digits, exp10) = parse_numeric_id(raw)?;
    format_canonical_numeric(negative, &digits, exp10)
}

/// Parse a JSON number into `(sign, significant digits, power of ten)`.
///
/// Enforces JSON number syntax: no leading zero followed by a digit, no empty
/// fraction or exponent. The returned digit string has leading zeros removed;
/// an empty string means the value is zero.
fn parse_numeric_id(raw: &str) -> Result<(bool, String, i64), IdKeyError> {
    let bytes = raw.as_bytes();
    let mut i = 0;

    let mut negative = false;
    if bytes[i] == b'-' {
        negative = true;
        i += 1;
        if i >= bytes.len() {
            return Err(IdKeyError::InvalidNumber);
        }
    }

    let int_start = i;
    match bytes[i] {
        b'0' => {
            i += 1;
            if i < bytes.len() && bytes[i].is_ascii_digit() {
                return Err(IdKeyError::InvalidNumber);
            }
        }
        b'1'..=b'9' => {
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
        _ => return Err(IdKeyError::InvalidNumber),
    }
    let int_digits = &raw[int_start..i];

    let mut frac_digits = "";
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if frac_start == i {
            return Err(IdKeyError::InvalidNumber);
        }
        frac_digits = &raw[frac_start..i];
    }

    let mut exponent: i64 = 0;
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i >= bytes.len() {
            return Err(IdKeyError::InvalidNumber);
        }

        let mut exponent_sign = 1i64;
        if bytes[i] == b'+' || bytes[i] == b'-' {
            if bytes[i] == b'-' {
                exponent_sign = -1;
            }
            i += 1;
            if i >= bytes.len() {
                return Err(IdKeyError::InvalidNumber);
            }
        }

        let exponent_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if exponent_start == i {
            return Err(IdKeyError::InvalidNumber);
        }

        let magnitude = parse_bounded_int(&raw[exponent_start..i], MAX_ID_ABS_EXP10)?;
        exponent = exponent_sign * magnitude;
    }

    if i != bytes.len() {
        return Err(IdKeyError::InvalidNumber);
    }

    let combined = format!("{int_digits}{frac_digits}");
    let digits = combined.trim_start_matches('0');
    if digits.is_empty() {
        return Ok((false, String::new(), 0));
    }
    if digits.len() > MAX_ID_KEY_LEN {
        return Err(IdKeyError::TooLarge);
    }

    let exp10 = exponent - frac_digits.len() as i64;
    Ok((negative, digits.to_string(), exp10))
}

fn parse_bounded_int(digits: &str, max: i64) -> Result<i64, IdKeyError> {
    if digits.is_empty() {
        return Err(IdKeyError::InvalidNumber);
    }

    let mut value: i64 = 0;
    for byte in digits.bytes() {
        if !byte.is_ascii_digit() {
            return Err(IdKeyError::InvalidNumber);
        }
        let digit = i64::from(byte - b'0');
        if value > (max - digit) / 10 {
            return Err(IdKeyError::TooLarge);
        }
        value = value * 10 + digit;
    }
    Ok(value)
}

/// Recompose a canonical decimal string: an integer when `exp10 >= 0`,
/// otherwise `integer.fraction` or `0.<zeros><digits>`.
fn format_canonical_numeric(
    negative: bool,
    digits: &str,
    exp10: i64,
) -> Result<String, IdKeyError> {
    let trimmed = digits.trim_end_matches('0');
    let exp10 = exp10 + (digits.len() - trimmed.len()) as i64;

    if trimmed.is_empty() {
        return Ok("0".to_string());
    }

    let sign = if negative { "-" } else { "" };

    if exp10 >= 0 {
        if exp10 > (MAX_ID_KEY_LEN.saturating_sub(trimmed.len())) as i64 {
            return Err(IdKeyError::TooLarge);
        }
        return Ok(format!("{sign}{trimmed}{}", "0".repeat(exp10 as usize)));
    }

    let scale = exp10.unsigned_abs() as usize;
    if scale > MAX_ID_KEY_LEN {
        return Err(IdKeyError::TooLarge);
    }

    if trimmed.len() > scale {
        let (int_part, frac_part) = trimmed.split_at(trimmed.len() - scale);
        if int_part.len() + 1 + frac_part.len() > MAX_ID_KEY_LEN {
            return Err(IdKeyError::TooLarge);
        }
        return Ok(format!("{sign}{int_part}.{frac_part}"));
    }

    let leading_zeros = scale - trimmed.len();
    if leading_zeros > MAX_ID_KEY_LEN.saturating_sub(trimmed.len()).saturating_sub(2) {
        return Err(IdKeyError::TooLarge);
    }
    Ok(format!(
        "{sign}0.{}{}",
        "0".repeat(leading_zeros),
        trimmed
    ))
}
