//! Index value codec: bidirectional mapping between raw column values and their
//! sortable index-byte form, including the legacy character code table.

use crate::column::{Column, DataType};
use crate::error::{Error, Result};

/// Bias applied to integer-family values so their big-endian byte form sorts the same
/// as their signed natural order. `i64` avoids overflow while widening.
const INT32_BIAS: i64 = i32::MAX as i64 + 1;

/// Same translation, scaled to a 2-byte field, for the SHORT member of the integer
/// family: the bias is half the unsigned range of the column's own fixed size;
/// `INT32_BIAS` is that formula's 4-byte instance.
const INT16_BIAS: i64 = i16::MAX as i64 + 1;

/// Codes in this set must be preceded on the wire by the sentinel byte [`PREFIX_BYTE`].
const PREFIXED_CODES: [u8; 6] = [2, 3, 9, 11, 13, 15];

/// Sentinel byte marking that the following byte is a prefixed code.
pub const PREFIX_BYTE: u8 = 0x2B;

fn is_prefixed(code: u8) -> bool {
    PREFIXED_CODES.contains(&code)
}

/// Legacy code table: ASCII subset of space, digits, uppercase letters, and a
/// fixed punctuation set, each mapped to a single byte. Six of the codes (the
/// [`PREFIXED_CODES`]) require the [`PREFIX_BYTE`] sentinel whenever they appear.
///
/// The punctuation assignment below fixes the six prefixed codes to `#`, `_`, `$`,
/// `%`, `&`, `(` — chosen so that `_` lands on code 3 and `A` lands on code 0x4A,
/// the two fixed anchor assignments this table must reproduce. See DESIGN.md for
/// why the remaining assignment is this crate's own reconstruction rather than a
/// byte-for-byte copy of an unavailable reference table.
const CODE_TABLE: &[(char, u8)] = &[
    ('#', 2),
    ('_', 3),
    (')', 4),
    ('*', 5),
    (',', 6),
    ('/', 7),
    (':', 8),
    ('$', 9),
    (';', 10),
    ('%', 11),
    ('?', 12),
    ('&', 13),
    ('@', 14),
    ('(', 15),
    ('+', 16),
    ('<', 17),
    ('=', 18),
    ('>', 19),
    ('^', 20),
    ('{', 21),
    ('|', 22),
    ('}', 23),
    ('~', 24),
    (' ', 25),
    ('0', 26),
    ('1', 27),
    ('2', 28),
    ('3', 29),
    ('4', 30),
    ('5', 31),
    ('6', 32),
    ('7', 33),
    ('8', 34),
    ('9', 35),
    ('A', 74),
    ('B', 75),
    ('C', 76),
    ('D', 77),
    ('E', 78),
    ('F', 79),
    ('G', 80),
    ('H', 81),
    ('I', 82),
    ('J', 83),
    ('K', 84),
    ('L', 85),
    ('M', 86),
    ('N', 87),
    ('O', 88),
    ('P', 89),
    ('Q', 90),
    ('R', 91),
    ('S', 92),
    ('T', 93),
    ('U', 94),
    ('V', 95),
    ('W', 96),
    ('X', 97),
    ('Y', 98),
    ('Z', 99),
];

fn char_to_code(c: char) -> Option<u8> {
    CODE_TABLE.iter().find(|(ch, _)| *ch == c).map(|(_, code)| *code)
}

fn code_to_char(code: u8) -> Option<char> {
    CODE_TABLE.iter().find(|(_, co)| *co == code).map(|(ch, _)| *ch)
}

/// Validate that `column` may participate in an index.
pub fn check_indexable(column: &Column) -> Result<()> {
    let ok = !column.is_variable_length
        || matches!(column.data_type, DataType::Text | DataType::Memo);
    if ok {
        Ok(())
    } else {
        Err(Error::UnsupportedIndexColumnType {
            column: column.name.clone(),
            reason: format!("{:?} is variable-length and not textual", column.data_type),
        })
    }
}

/// Actual form: the original character sequence uppercased.
pub fn actual_form(s: &str) -> String {
    s.to_uppercase()
}

/// Index form: the actual form with every `.` removed.
pub fn index_form(actual: &str) -> String {
    actual.chars().filter(|&c| c != '.').collect()
}

/// Encode the bare character codes for `s` (no presence byte, terminator, or trailing
/// zero), reproducing the "_"-string anomaly verbatim.
pub fn encode_chars(s: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(s.len() + 1);
    for c in s.chars() {
        let code = char_to_code(c).ok_or(Error::UnmappedIndexCharacter { ch: c })?;
        if is_prefixed(code) {
            out.push(PREFIX_BYTE);
        }
        out.push(code);
    }
    if s == "_" {
        out.push(3);
    }
    Ok(out)
}

/// Decode a character stream previously produced by [`encode_chars`]. `bytes` must not
/// include the terminator. A bare byte equal to 3 (i.e. not preceded by
/// [`PREFIX_BYTE`]) can only be the "_"-string anomaly, since every legitimate
/// occurrence of a prefixed code is always escaped; it is therefore dropped silently.
pub fn decode_chars(bytes: &[u8]) -> Result<String> {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == PREFIX_BYTE {
            i += 1;
            let code = *bytes
                .get(i)
                .ok_or_else(|| Error::FormatViolation("truncated prefixed code".into()))?;
            out.push(code_to_char(code).ok_or_else(|| {
                Error::FormatViolation(format!("code {code} has no legacy character"))
            })?);
        } else if b == 3 {
            // bare code 3 is never emitted for a real character (always prefixed);
            // it can only be the "_"-string anomaly byte.
        } else {
            out.push(code_to_char(b).ok_or_else(|| {
                Error::FormatViolation(format!("code {b} has no legacy character"))
            })?);
        }
        i += 1;
    }
    Ok(out)
}

/// Count of characters in `s` whose code requires the [`PREFIX_BYTE`].
pub fn prefixed_char_count(s: &str) -> Result<usize> {
    let mut count = 0;
    for c in s.chars() {
        let code = char_to_code(c).ok_or(Error::UnmappedIndexCharacter { ch: c })?;
        if is_prefixed(code) {
            count += 1;
        }
    }
    Ok(count)
}

/// Encode an integer-family raw value into its sortable on-disk form.
pub fn encode_int_family(raw: i64) -> i64 {
    raw + INT32_BIAS
}

/// Decode an integer-family on-disk value back to its raw form.
pub fn decode_int_family(encoded: i64) -> i64 {
    encoded - INT32_BIAS
}

/// Encode a SHORT raw value into its sortable 2-byte on-disk form.
pub fn encode_short_family(raw: i64) -> i64 {
    raw + INT16_BIAS
}

/// Decode a SHORT on-disk value back to its raw form.
pub fn decode_short_family(encoded: i64) -> i64 {
    encoded - INT16_BIAS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_table_is_bijective() {
        let mut codes: Vec<u8> = CODE_TABLE.iter().map(|(_, c)| *c).collect();
        codes.sort_unstable();
        let mut deduped = codes.clone();
        deduped.dedup();
        assert_eq!(codes.len(), deduped.len(), "duplicate codes in CODE_TABLE");

        let mut chars: Vec<char> = CODE_TABLE.iter().map(|(c, _)| *c).collect();
        chars.sort_unstable();
        let mut deduped_chars = chars.clone();
        deduped_chars.dedup();
        assert_eq!(chars.len(), deduped_chars.len(), "duplicate chars in CODE_TABLE");
    }

    #[test]
    fn anchors_match_worked_examples() {
        assert_eq!(char_to_code('A'), Some(0x4A));
        assert_eq!(char_to_code('_'), Some(0x03));
        assert!(is_prefixed(char_to_code('_').unwrap()));
    }

    #[test]
    fn int_bias_roundtrips() {
        for v in [i32::MIN as i64, -1, 0, 1, i32::MAX as i64] {
            assert_eq!(decode_int_family(encode_int_family(v)), v);
        }
        assert_eq!(encode_int_family(0), 0x8000_0000u32 as i64);
    }

    #[test]
    fn short_bias_roundtrips() {
        for v in [i16::MIN as i64, -1, 0, 1, i16::MAX as i64] {
            assert_eq!(decode_short_family(encode_short_family(v)), v);
        }
    }

    #[test]
    fn underscore_anomaly_roundtrips() {
        let encoded = encode_chars("_").unwrap();
        assert_eq!(encoded, vec![PREFIX_BYTE, 3, 3]);
        assert_eq!(decode_chars(&encoded).unwrap(), "_");
    }

    #[test]
    fn a_underscore_has_no_anomaly() {
        let encoded = encode_chars("A_").unwrap();
        assert_eq!(encoded, vec![0x4A, PREFIX_BYTE, 3]);
        assert_eq!(decode_chars(&encoded).unwrap(), "A_");
    }

    #[test]
    fn unmapped_character_fails() {
        assert!(encode_chars("a").is_err());
    }

    #[test]
    fn dotted_text_equivalence() {
        assert_eq!(index_form(&actual_form("U.S.A")), index_form(&actual_form("USA")));
    }
}
