//! Index entries: one row-pointer plus its per-column coded values.
//!
//! `EntryColumn` is a tagged variant over `{Fixed, Text}`: no cross-hierarchy
//! inheritance is needed, and each column resolves its owning [`Column`] only
//! transiently, at construction time, never storing a reference back — ordering and
//! (re)serialization need nothing more.

use std::cell::RefCell;
use std::cmp::Ordering;

use crate::codec;
use crate::column::{Column, DataType};
use crate::error::{Error, Result};

/// A value supplied for one key column when building an entry from a row. The
/// byte-level row reader that would normally produce these is an external
/// collaborator; callers assemble `IndexableValue`s from whatever values they already
/// have in hand.
#[derive(Debug, Clone)]
pub enum IndexableValue {
    Int(i32),
    Short(i16),
    Text(String),
    /// Pre-encoded, order-preserving big-endian bytes for any other fixed-size type.
    /// The core applies no bias to these (only INT/SHORT get the biased translation).
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FixedValue {
    Int(i32),
    Short(i16),
    Raw(Vec<u8>),
}

impl FixedValue {
    fn compare(&self, other: &FixedValue) -> Ordering {
        match (self, other) {
            (FixedValue::Int(a), FixedValue::Int(b)) => a.cmp(b),
            (FixedValue::Short(a), FixedValue::Short(b)) => a.cmp(b),
            (FixedValue::Raw(a), FixedValue::Raw(b)) => a.cmp(b),
            // Different columns never compare against each other; treat defensively.
            _ => Ordering::Equal,
        }
    }
}

/// A fixed-size key column within one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedEntryColumn {
    value: Option<FixedValue>,
}

impl FixedEntryColumn {
    pub fn from_value(column: &Column, value: Option<&IndexableValue>) -> Result<Self> {
        let value = match value {
            None => None,
            Some(IndexableValue::Int(v)) if column.data_type == DataType::Int => {
                Some(FixedValue::Int(*v))
            }
            Some(IndexableValue::Short(v)) if column.data_type == DataType::Short => {
                Some(FixedValue::Short(*v))
            }
            Some(IndexableValue::Raw(bytes)) => Some(FixedValue::Raw(bytes.clone())),
            Some(_) => {
                return Err(Error::FormatViolation(format!(
                    "value kind does not match column {} ({:?})",
                    column.name, column.data_type
                )))
            }
        };
        Ok(Self { value })
    }

    pub fn from_buffer(column: &Column, buf: &[u8], pos: &mut usize) -> Result<Self> {
        let presence = read_u8(buf, pos)?;
        if presence == 0 {
            return Ok(Self { value: None });
        }
        let size = column.fixed_size as usize;
        let raw = buf
            .get(*pos..*pos + size)
            .ok_or_else(|| Error::FormatViolation("truncated fixed entry column".into()))?;
        *pos += size;
        let value = match column.data_type {
            DataType::Int => {
                let mut arr = [0u8; 4];
                arr.copy_from_slice(raw);
                let on_disk = u32::from_be_bytes(arr) as i64;
                FixedValue::Int(codec::decode_int_family(on_disk) as i32)
            }
            DataType::Short => {
                let mut arr = [0u8; 2];
                arr.copy_from_slice(raw);
                let on_disk = u16::from_be_bytes(arr) as i64;
                FixedValue::Short(codec::decode_short_family(on_disk) as i16)
            }
            _ => FixedValue::Raw(raw.to_vec()),
        };
        Ok(Self { value: Some(value) })
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        match &self.value {
            None => buf.push(0x00),
            Some(value) => {
                buf.push(0x7F);
                match value {
                    FixedValue::Int(v) => {
                        let on_disk = codec::encode_int_family(*v as i64) as u32;
                        buf.extend_from_slice(&on_disk.to_be_bytes());
                    }
                    FixedValue::Short(v) => {
                        let on_disk = codec::encode_short_family(*v as i64) as u16;
                        buf.extend_from_slice(&on_disk.to_be_bytes());
                    }
                    FixedValue::Raw(bytes) => buf.extend_from_slice(bytes),
                }
            }
        }
    }

    pub fn size(&self) -> usize {
        match &self.value {
            None => 1,
            Some(FixedValue::Int(_)) => 1 + 4,
            Some(FixedValue::Short(_)) => 1 + 2,
            Some(FixedValue::Raw(bytes)) => 1 + bytes.len(),
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (&self.value, &other.value) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.compare(b),
        }
    }
}

/// A textual key column within one entry.
///
/// `actual_value` is modeled as a lazily-rebuilt cache rather than a true soft
/// reference (Rust has no GC-integrated soft references): [`Self::drop_cache`] lets a
/// caller simulate memory pressure, and the next [`Self::actual_value`] call
/// reconstructs it from the index value — lossily, since '.' removal is not
/// invertible.
#[derive(Debug)]
pub struct TextEntryColumn {
    actual_value: RefCell<Option<String>>,
    value: Option<String>,
    extra_bytes: Vec<u8>,
    orig_index: Option<usize>,
}

impl Clone for TextEntryColumn {
    fn clone(&self) -> Self {
        Self {
            actual_value: RefCell::new(self.actual_value.borrow().clone()),
            value: self.value.clone(),
            extra_bytes: self.extra_bytes.clone(),
            orig_index: self.orig_index,
        }
    }
}

impl TextEntryColumn {
    pub fn from_value(value: Option<&str>) -> Result<Self> {
        match value {
            None => Ok(Self {
                actual_value: RefCell::new(None),
                value: None,
                extra_bytes: Vec::new(),
                orig_index: None,
            }),
            Some(v) => {
                let actual = codec::actual_form(v);
                let index_value = codec::index_form(&actual);
                codec::encode_chars(&index_value)?; // validate eagerly
                Ok(Self {
                    actual_value: RefCell::new(Some(actual)),
                    value: Some(index_value),
                    extra_bytes: Vec::new(),
                    orig_index: None,
                })
            }
        }
    }

    pub fn from_buffer(buf: &[u8], pos: &mut usize, orig_index: usize) -> Result<Self> {
        let presence = read_u8(buf, pos)?;
        if presence == 0 {
            return Ok(Self {
                actual_value: RefCell::new(None),
                value: None,
                extra_bytes: Vec::new(),
                orig_index: Some(orig_index),
            });
        }

        let start = *pos;
        loop {
            match buf.get(*pos) {
                Some(0x01) => break,
                Some(_) => *pos += 1,
                None => return Err(Error::FormatViolation("unterminated text entry column".into())),
            }
        }
        let coded = &buf[start..*pos];
        let value = codec::decode_chars(coded)?;
        *pos += 1; // consume the 0x01 terminator

        let trailer = read_u8(buf, pos)?;
        let extra_bytes = if trailer == 0 {
            Vec::new()
        } else {
            let extra_start = *pos - 1;
            let mut end = extra_start;
            loop {
                match buf.get(end) {
                    Some(0) => break,
                    Some(_) => end += 1,
                    None => return Err(Error::FormatViolation("unterminated extra bytes".into())),
                }
            }
            let extra = buf[extra_start..end].to_vec();
            *pos = end + 1; // consume the terminating 0x00
            extra
        };

        Ok(Self {
            actual_value: RefCell::new(None),
            value: Some(value),
            extra_bytes,
            orig_index: Some(orig_index),
        })
    }

    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        match &self.value {
            None => buf.push(0x00),
            Some(value) => {
                buf.push(0x7F);
                buf.extend_from_slice(&codec::encode_chars(value)?);
                buf.push(0x01);
                if !self.extra_bytes.is_empty() {
                    buf.extend_from_slice(&self.extra_bytes);
                }
                buf.push(0x00);
            }
        }
        Ok(())
    }

    /// Full wire size: presence byte + coded characters + terminator + optional extra
    /// bytes + trailing byte. Computed from the actual encoding rather than trusted
    /// verbatim, since the anomaly byte only applies to some strings (see DESIGN.md).
    pub fn size(&self) -> Result<usize> {
        match &self.value {
            None => Ok(1),
            Some(value) => {
                let prefixed = codec::prefixed_char_count(value)?;
                let anomaly = usize::from(value == "_");
                // +1 presence byte, +2 terminator/trailing byte.
                Ok(3 + value.chars().count() + prefixed + anomaly + self.extra_bytes.len())
            }
        }
    }

    /// The uppercased pre-code form, reconstructed from the index value if the cache
    /// has been dropped.
    pub fn actual_value(&self) -> Option<String> {
        self.value.as_ref()?;
        let mut cache = self.actual_value.borrow_mut();
        if cache.is_none() {
            *cache = self.value.clone();
        }
        cache.clone()
    }

    /// Simulate the soft reference being reclaimed under memory pressure.
    pub fn drop_cache(&self) {
        *self.actual_value.borrow_mut() = None;
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (&self.value, &other.value) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(_), Some(_)) => match (self.orig_index, other.orig_index) {
                (Some(a), Some(b)) => a.cmp(&b),
                // Compare by index form (dots already removed), not actual_value():
                // two values that differ only by '.' must sort equal here and fall
                // through to the (page, row) tiebreak in Entry::compare.
                _ => self.value.cmp(&other.value),
            },
        }
    }
}

/// One key column of an entry: a [`FixedEntryColumn`] or a [`TextEntryColumn`].
#[derive(Debug, Clone)]
pub enum EntryColumn {
    Fixed(FixedEntryColumn),
    Text(TextEntryColumn),
}

impl EntryColumn {
    pub fn from_value(column: &Column, value: Option<&IndexableValue>) -> Result<Self> {
        codec::check_indexable(column)?;
        match column.data_type {
            DataType::Text | DataType::Memo => {
                let text = match value {
                    None => None,
                    Some(IndexableValue::Text(s)) => Some(s.as_str()),
                    Some(_) => {
                        return Err(Error::FormatViolation(format!(
                            "column {} expects a textual value",
                            column.name
                        )))
                    }
                };
                Ok(EntryColumn::Text(TextEntryColumn::from_value(text)?))
            }
            _ => Ok(EntryColumn::Fixed(FixedEntryColumn::from_value(column, value)?)),
        }
    }

    pub fn from_buffer(
        column: &Column,
        buf: &[u8],
        pos: &mut usize,
        orig_index: usize,
    ) -> Result<Self> {
        codec::check_indexable(column)?;
        match column.data_type {
            DataType::Text | DataType::Memo => {
                Ok(EntryColumn::Text(TextEntryColumn::from_buffer(buf, pos, orig_index)?))
            }
            _ => Ok(EntryColumn::Fixed(FixedEntryColumn::from_buffer(column, buf, pos)?)),
        }
    }

    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            EntryColumn::Fixed(f) => {
                f.write(buf);
                Ok(())
            }
            EntryColumn::Text(t) => t.write(buf),
        }
    }

    pub fn size(&self) -> Result<usize> {
        match self {
            EntryColumn::Fixed(f) => Ok(f.size()),
            EntryColumn::Text(t) => t.size(),
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (EntryColumn::Fixed(a), EntryColumn::Fixed(b)) => a.compare(b),
            (EntryColumn::Text(a), EntryColumn::Text(b)) => a.compare(b),
            // Mismatched column kinds at the same position indicate a shape error
            // upstream; ordering falls back to Equal since `Entry::compare` already
            // rejects mismatched arity before comparing column-by-column.
            _ => Ordering::Equal,
        }
    }
}

/// One row-pointer plus its coded key-column values.
#[derive(Debug, Clone)]
pub struct Entry {
    /// 3-byte big-endian row pointer (masked to 24 bits on the wire).
    pub page: u32,
    pub row: u8,
    pub columns: Vec<EntryColumn>,
}

fn read_u8(buf: &[u8], pos: &mut usize) -> Result<u8> {
    let b = *buf
        .get(*pos)
        .ok_or_else(|| Error::FormatViolation("truncated entry".into()))?;
    *pos += 1;
    Ok(b)
}

impl Entry {
    /// Construct from values keyed by column number.
    pub fn from_values(
        columns: &[Column],
        row: &[Option<IndexableValue>],
        page: u32,
        row_num: u8,
    ) -> Result<Self> {
        let mut entry_columns = Vec::with_capacity(columns.len());
        for column in columns {
            let value = row.get(column.column_number as usize).and_then(|v| v.as_ref());
            entry_columns.push(EntryColumn::from_value(column, value)?);
        }
        Ok(Self {
            page,
            row: row_num,
            columns: entry_columns,
        })
    }

    /// Construct from a buffer: one [`EntryColumn`] per key column, then the 3-byte
    /// page and 1-byte row.
    pub fn from_buffer(
        columns: &[Column],
        buf: &[u8],
        pos: &mut usize,
        next_entry_index: usize,
    ) -> Result<Self> {
        let mut entry_columns = Vec::with_capacity(columns.len());
        for column in columns {
            entry_columns.push(EntryColumn::from_buffer(column, buf, pos, next_entry_index)?);
        }
        let page_bytes = buf
            .get(*pos..*pos + 3)
            .ok_or_else(|| Error::FormatViolation("truncated entry page pointer".into()))?;
        let page = u32::from_be_bytes([0, page_bytes[0], page_bytes[1], page_bytes[2]]);
        *pos += 3;
        let row = read_u8(buf, pos)?;
        Ok(Self {
            page,
            row,
            columns: entry_columns,
        })
    }

    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        for column in &self.columns {
            column.write(buf)?;
        }
        let page = self.page.to_be_bytes();
        buf.extend_from_slice(&page[1..4]);
        buf.push(self.row);
        Ok(())
    }

    /// `4 + sum(entryColumn.size)`: the 3-byte page pointer plus the 1-byte row; see
    /// DESIGN.md for why this trailer width is 4, not 5.
    pub fn size(&self) -> Result<usize> {
        let mut total = 4;
        for column in &self.columns {
            total += column.size()?;
        }
        Ok(total)
    }

    /// Lexicographic compare over entry-columns, then `(page, row)`.
    pub fn compare(&self, other: &Self) -> Result<Ordering> {
        if self.columns.len() != other.columns.len() {
            return Err(Error::IncompatibleEntryShape {
                left: self.columns.len(),
                right: other.columns.len(),
            });
        }
        for (a, b) in self.columns.iter().zip(other.columns.iter()) {
            match a.compare(b) {
                Ordering::Equal => continue,
                ord => return Ok(ord),
            }
        }
        Ok(self.page.cmp(&other.page).then(self.row.cmp(&other.row)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::DataType;

    fn int_column() -> Column {
        Column::new("id", DataType::Int, 4)
    }

    fn text_column() -> Column {
        Column::new("name", DataType::Text, 0)
    }

    #[test]
    fn fixed_entry_column_int_bias_roundtrip() {
        let column = int_column();
        let ec = FixedEntryColumn::from_value(&column, Some(&IndexableValue::Int(0))).unwrap();
        let mut buf = Vec::new();
        ec.write(&mut buf);
        assert_eq!(buf, vec![0x7F, 0x80, 0x00, 0x00, 0x00]);

        let mut pos = 0;
        let parsed = FixedEntryColumn::from_buffer(&column, &buf, &mut pos).unwrap();
        assert_eq!(parsed, ec);
    }

    #[test]
    fn fixed_entry_column_absent_sorts_first() {
        let column = int_column();
        let absent = FixedEntryColumn::from_value(&column, None).unwrap();
        let present = FixedEntryColumn::from_value(&column, Some(&IndexableValue::Int(-5))).unwrap();
        assert_eq!(absent.compare(&present), Ordering::Less);
    }

    #[test]
    fn text_entry_column_underscore_wire_bytes() {
        let ec = TextEntryColumn::from_value(Some("_")).unwrap();
        let mut buf = Vec::new();
        ec.write(&mut buf).unwrap();
        assert_eq!(buf, vec![0x7F, 0x2B, 0x03, 0x03, 0x01, 0x00]);
    }

    #[test]
    fn text_entry_column_a_underscore_wire_bytes() {
        let ec = TextEntryColumn::from_value(Some("A_")).unwrap();
        let mut buf = Vec::new();
        ec.write(&mut buf).unwrap();
        assert_eq!(buf, vec![0x7F, 0x4A, 0x2B, 0x03, 0x01, 0x00]);
    }

    #[test]
    fn dotted_values_are_index_equal() {
        let a = TextEntryColumn::from_value(Some("U.S.A")).unwrap();
        let b = TextEntryColumn::from_value(Some("USA")).unwrap();
        assert_eq!(a.compare(&b), Ordering::Equal);
    }

    #[test]
    fn entry_size_matches_written_bytes() {
        let columns = vec![text_column()];
        let row = vec![Some(IndexableValue::Text("A_".into()))];
        let entry = Entry::from_values(&columns, &row, 1, 0).unwrap();
        let mut buf = Vec::new();
        entry.write(&mut buf).unwrap();
        assert_eq!(buf.len(), entry.size().unwrap());
    }

    #[test]
    fn mismatched_arity_fails() {
        let columns = vec![int_column()];
        let row = vec![Some(IndexableValue::Int(1))];
        let a = Entry::from_values(&columns, &row, 1, 0).unwrap();
        let b = Entry {
            page: 1,
            row: 0,
            columns: vec![],
        };
        assert!(a.compare(&b).is_err());
    }
}
