//! short text <-> field value codec
//!
//! names, bios and donation messages travel on-chain as a single `field`
//! scalar. text is packed big-endian into at most 31 bytes so the value
//! always stays below the field modulus.
//!
//! decoding is a heuristic: the same integer range also carries plain
//! numbers, so anything that does not look like printable text is handed
//! back as its decimal string.

use num_bigint::BigUint;

/// bytes of text that fit in one field element
pub const FIELD_TEXT_MAX_BYTES: usize = 31;

/// canonical encoding of the empty string
pub const ZERO_FIELD: &str = "0field";

/// type and visibility tags that may trail a literal
const TYPE_SUFFIXES: &[&str] = &[
    ".private", ".public", ".constant", "field", "scalar", "group", "u128", "u64", "u32", "u16",
    "u8", "i128", "i64", "i32", "i16", "i8",
];

/// encode text as a `<decimal>field` literal
///
/// only the first 31 utf-8 bytes are kept; longer input is silently
/// truncated, possibly mid-character.
pub fn encode_field(text: &str) -> String {
    let bytes = text.as_bytes();
    let bytes = &bytes[..bytes.len().min(FIELD_TEXT_MAX_BYTES)];
    if bytes.is_empty() {
        return ZERO_FIELD.to_string();
    }

    let value = BigUint::from_bytes_be(bytes);
    format!("{}field", value)
}

/// decode a field literal back into text
///
/// returns the input unchanged when it holds no digits, and the bare decimal
/// string when the value does not decode to printable utf-8.
pub fn decode_field(literal: &str) -> String {
    let stripped = strip_type_suffixes(literal.trim());
    let digits: String = stripped.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return literal.to_string();
    }

    let value = match BigUint::parse_bytes(digits.as_bytes(), 10) {
        Some(v) => v,
        None => return literal.to_string(),
    };
    let numeric = value.to_string();

    // peel low bytes until the value is exhausted, then restore order
    let mut bytes = Vec::new();
    let mut rest = value;
    let zero = BigUint::default();
    let mask = BigUint::from(0xffu32);
    while rest > zero {
        let low = (&rest & &mask).to_u32_digits().first().copied().unwrap_or(0);
        bytes.push(low as u8);
        rest >>= 8u32;
    }
    bytes.reverse();

    if bytes.is_empty() {
        return numeric;
    }
    if bytes.iter().any(|&b| b < 32) {
        return numeric;
    }

    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => numeric,
    }
}

/// strip any trailing run of known type/visibility tags
pub fn strip_type_suffixes(literal: &str) -> &str {
    let mut s = literal;
    loop {
        match TYPE_SUFFIXES.iter().find(|suffix| s.ends_with(*suffix)) {
            Some(suffix) => s = &s[..s.len() - suffix.len()],
            None => return s,
        }
    }
}
