//! donation record parsing
//!
//! a decrypted record body is loosely structured text:
//!
//! ```text
//! {
//!   owner: aleo1...private,
//!   sender: aleo1...private,
//!   amount: 1500000u64.private,
//!   message: 478560413032field.private,
//!   timestamp: 1700000000u64.private,
//!   _nonce: 3149...group.public
//! }
//! ```
//!
//! the format belongs to the wallet, not to us, so the tokenizer below is
//! forgiving: any whitespace around `:`, unknown keys ignored,
//! first occurrence of a key wins. a body that does not carry exactly one of
//! `sender` / `recipient` is not a donation.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::codec;

/// address prefix on the target chain
pub const ADDRESS_PREFIX: &str = "aleo1";

/// 2020-01-01T00:00:00Z
pub const MIN_TIMESTAMP: u64 = 1_577_836_800;
/// 2100-12-31T23:59:59Z
pub const MAX_TIMESTAMP: u64 = 4_133_980_799;

/// which side of a donation the record owner is on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

/// the other party, doubling as the shape discriminant
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Counterparty {
    /// record says who sent it: the owner received
    Sender(String),
    /// record says who got it: the owner sent
    Recipient(String),
}

impl Counterparty {
    pub fn address(&self) -> &str {
        match self {
            Counterparty::Sender(a) | Counterparty::Recipient(a) => a,
        }
    }
}

/// a parsed donation record
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DonationRecord {
    pub owner: String,
    pub counterparty: Counterparty,
    pub amount_microcredits: u64,
    /// raw `<digits>field` literal
    pub message: Option<String>,
    /// unix seconds
    pub timestamp: u64,
    pub nonce: Option<String>,
}

impl DonationRecord {
    pub fn direction(&self) -> Direction {
        match self.counterparty {
            Counterparty::Sender(_) => Direction::Received,
            Counterparty::Recipient(_) => Direction::Sent,
        }
    }

    pub fn sender(&self) -> Option<&str> {
        match &self.counterparty {
            Counterparty::Sender(a) => Some(a),
            Counterparty::Recipient(_) => None,
        }
    }

    pub fn recipient(&self) -> Option<&str> {
        match &self.counterparty {
            Counterparty::Recipient(a) => Some(a),
            Counterparty::Sender(_) => None,
        }
    }

    /// best-effort decoded message text
    pub fn message_text(&self) -> Option<String> {
        self.message
            .as_deref()
            .map(codec::decode_field)
            .filter(|text| !text.is_empty() && text != "0")
    }
}

/// split a record body into `key -> raw value` pairs
pub fn tokenize_fields(body: &str) -> HashMap<&str, &str> {
    let bytes = body.as_bytes();
    let mut fields = HashMap::new();
    let mut i = 0;

    while i < bytes.len() {
        if !is_key_byte(bytes[i]) {
            i += 1;
            continue;
        }

        let key_start = i;
        while i < bytes.len() && is_key_byte(bytes[i]) {
            i += 1;
        }
        let key = &body[key_start..i];

        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != b':' {
            continue;
        }
        j += 1;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }

        let value_start = j;
        while j < bytes.len() && !is_value_terminator(bytes[j]) {
            j += 1;
        }
        if j > value_start {
            fields.entry(key).or_insert(&body[value_start..j]);
        }
        i = j;
    }

    fields
}

fn is_key_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_value_terminator(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b',' | b'{' | b'}')
}

/// leading `aleo1[a-z0-9]+` of a value
fn address_token(value: &str) -> Option<&str> {
    let rest = value.strip_prefix(ADDRESS_PREFIX)?;
    let len = rest
        .bytes()
        .take_while(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        .count();
    (len > 0).then(|| &value[..ADDRESS_PREFIX.len() + len])
}

/// `<digits><suffix>` -> digits
fn typed_digits<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let len = value.bytes().take_while(u8::is_ascii_digit).count();
    (len > 0 && value[len..].starts_with(suffix)).then(|| &value[..len])
}

fn alphanumeric_token(value: &str) -> Option<&str> {
    let len = value.bytes().take_while(u8::is_ascii_alphanumeric).count();
    (len > 0).then(|| &value[..len])
}

fn nonce_value<'a>(fields: &HashMap<&str, &'a str>) -> Option<&'a str> {
    fields
        .iter()
        .filter(|(key, _)| **key == "nonce" || key.ends_with("_nonce"))
        // deterministic pick when several nonce-like keys exist
        .min_by_key(|(key, _)| **key)
        .and_then(|(_, value)| alphanumeric_token(*value))
}

/// normalize a raw timestamp into plausible unix seconds
///
/// values past the upper bound are assumed to be milliseconds. anything
/// still out of range is replaced by `now`.
pub fn normalize_timestamp(raw: u64, now: u64) -> u64 {
    let secs = if raw > MAX_TIMESTAMP { raw / 1000 } else { raw };
    if (MIN_TIMESTAMP..=MAX_TIMESTAMP).contains(&secs) {
        secs
    } else {
        now
    }
}

/// wall clock in unix seconds
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(MIN_TIMESTAMP)
}

/// parse a record body, falling back to the wall clock for bad timestamps
pub fn parse_record(body: &str) -> Option<DonationRecord> {
    parse_record_at(body, unix_now())
}

/// parse a record body with an explicit `now` (unix seconds)
pub fn parse_record_at(body: &str, now: u64) -> Option<DonationRecord> {
    let fields = tokenize_fields(body);
    let field = |key: &str| fields.get(key).copied();

    let owner = field("owner").and_then(address_token);
    let sender = field("sender").and_then(address_token);
    let recipient = field("recipient").and_then(address_token);
    let amount = field("amount").and_then(|v| typed_digits(v, "u64"));
    let message = field("message").and_then(|v| typed_digits(v, "field"));
    let timestamp = field("timestamp").and_then(|v| typed_digits(v, "u64"));
    let nonce = nonce_value(&fields);

    let (Some(owner), Some(amount), Some(timestamp)) = (owner, amount, timestamp) else {
        trace!("rejecting record: missing owner, amount or timestamp");
        return None;
    };

    let counterparty = match (sender, recipient) {
        (Some(s), None) => Counterparty::Sender(s.to_string()),
        (None, Some(r)) => Counterparty::Recipient(r.to_string()),
        (None, None) => {
            trace!("rejecting record: neither sender nor recipient");
            return None;
        }
        (Some(_), Some(_)) => {
            trace!("rejecting record: both sender and recipient");
            return None;
        }
    };

    let Ok(amount_microcredits) = amount.parse::<u64>() else {
        trace!("rejecting record: amount overflows u64");
        return None;
    };
    let Ok(raw_timestamp) = timestamp.parse::<u64>() else {
        trace!("rejecting record: timestamp overflows u64");
        return None;
    };

    Some(DonationRecord {
        owner: owner.to_string(),
        counterparty,
        amount_microcredits,
        message: message.map(|digits| format!("{}field", digits)),
        timestamp: normalize_timestamp(raw_timestamp, now),
        nonce: nonce.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "aleo1owner0000000000000000000000000000000000000000000000000q9r";
    const OTHER: &str = "aleo1other0000000000000000000000000000000000000000000000000x2z";
    const NOW: u64 = 1_760_000_000;

    fn received_body(timestamp: &str) -> String {
        format!(
            "{{\n  owner: {OWNER}.private,\n  sender: {OTHER}.private,\n  amount: 1500000u64.private,\n  message: 26729field.private,\n  timestamp: {timestamp}.private,\n  _nonce: 4451group.public\n}}"
        )
    }

    #[test]
    fn test_parse_received_shape() {
        let record = parse_record_at(&received_body("1700000000u64"), NOW).unwrap();

        assert_eq!(record.owner, OWNER);
        assert_eq!(record.counterparty, Counterparty::Sender(OTHER.into()));
        assert_eq!(record.direction(), Direction::Received);
        assert_eq!(record.amount_microcredits, 1_500_000);
        assert_eq!(record.message.as_deref(), Some("26729field"));
        assert_eq!(record.message_text().as_deref(), Some("hi"));
        assert_eq!(record.timestamp, 1_700_000_000);
        assert_eq!(record.nonce.as_deref(), Some("4451group"));
    }

    #[test]
    fn test_parse_sent_shape_compact_whitespace() {
        let body = format!(
            "{{owner:{OWNER}.private,recipient :   {OTHER}.private,amount:5u64.private,timestamp:1700000000u64.private}}"
        );
        let record = parse_record_at(&body, NOW).unwrap();

        assert_eq!(record.direction(), Direction::Sent);
        assert_eq!(record.recipient(), Some(OTHER));
        assert_eq!(record.sender(), None);
        assert_eq!(record.message, None);
        assert_eq!(record.nonce, None);
    }

    #[test]
    fn test_reject_missing_required() {
        let body = format!("{{ owner: {OWNER}.private, sender: {OTHER}.private, timestamp: 1700000000u64 }}");
        assert!(parse_record_at(&body, NOW).is_none());

        let body = format!("{{ sender: {OTHER}.private, amount: 1u64, timestamp: 1700000000u64 }}");
        assert!(parse_record_at(&body, NOW).is_none());

        // amount without its u64 suffix does not count
        let body = format!(
            "{{ owner: {OWNER}, sender: {OTHER}, amount: 1field, timestamp: 1700000000u64 }}"
        );
        assert!(parse_record_at(&body, NOW).is_none());
    }

    #[test]
    fn test_reject_ambiguous_discriminant() {
        let both = format!(
            "{{ owner: {OWNER}, sender: {OTHER}, recipient: {OTHER}, amount: 1u64, timestamp: 1700000000u64 }}"
        );
        assert!(parse_record_at(&both, NOW).is_none());

        let neither = format!("{{ owner: {OWNER}, amount: 1u64, timestamp: 1700000000u64 }}");
        assert!(parse_record_at(&neither, NOW).is_none());
    }

    #[test]
    fn test_reject_non_address_owner() {
        let body = format!("{{ owner: 12field, sender: {OTHER}, amount: 1u64, timestamp: 1700000000u64 }}");
        assert!(parse_record_at(&body, NOW).is_none());
    }

    #[test]
    fn test_reject_overflowing_amount() {
        let body = format!(
            "{{ owner: {OWNER}, sender: {OTHER}, amount: 99999999999999999999999u64, timestamp: 1700000000u64 }}"
        );
        assert!(parse_record_at(&body, NOW).is_none());
    }

    #[test]
    fn test_timestamp_passthrough() {
        assert_eq!(normalize_timestamp(1_700_000_000, NOW), 1_700_000_000);
    }

    #[test]
    fn test_timestamp_milliseconds_converted() {
        assert_eq!(normalize_timestamp(1_700_000_000_000, NOW), 1_700_000_000);
    }

    #[test]
    fn test_timestamp_out_of_range_uses_now() {
        // ms -> 4_200_000_000 s, still past 2100
        assert_eq!(normalize_timestamp(4_200_000_000_000, NOW), NOW);
        // before 2020
        assert_eq!(normalize_timestamp(1_000, NOW), NOW);
        let record = parse_record_at(&received_body("4200000000000u64"), NOW).unwrap();
        assert_eq!(record.timestamp, NOW);
    }

    #[test]
    fn test_timestamp_bounds_inclusive() {
        assert_eq!(normalize_timestamp(MIN_TIMESTAMP, NOW), MIN_TIMESTAMP);
        assert_eq!(normalize_timestamp(MAX_TIMESTAMP, NOW), MAX_TIMESTAMP);
    }

    #[test]
    fn test_wall_clock_fallback_is_plausible() {
        let record = parse_record(&received_body("5u64")).unwrap();
        assert!((MIN_TIMESTAMP..=MAX_TIMESTAMP).contains(&record.timestamp));
    }

    #[test]
    fn test_tokenizer_first_key_wins() {
        let fields = tokenize_fields("a: 1, a: 2, b :3 }");
        assert_eq!(fields.get("a"), Some(&"1"));
        assert_eq!(fields.get("b"), Some(&"3"));
    }

    #[test]
    fn test_plain_nonce_key() {
        let body = format!(
            "owner: {OWNER}\nsender: {OTHER}\namount: 1u64\ntimestamp: 1700000000u64\n nonce: abc123"
        );
        let record = parse_record_at(&body, NOW).unwrap();
        assert_eq!(record.nonce.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_garbage_never_panics() {
        for body in ["", ":", "owner:", "{{{{", "owner: aleo1", "amount: u64", "é: ü,"] {
            assert!(parse_record_at(body, NOW).is_none());
        }
    }
}
