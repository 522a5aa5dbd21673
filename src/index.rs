//! Index runtime state and its on-disk page.
//!
//! An [`Index`] owns an ordered set of [`Entry`] values plus the key-column order it
//! was built against; [`Index::write`]/[`Index::read`] translate that set to and from
//! exactly one storage page.

use std::io::Cursor;

use binrw::{binrw, BinRead, BinWrite};

use crate::column::Column;
use crate::entry::{Entry, IndexableValue};
use crate::error::{Error, Result};
use crate::format::FormatDescriptor;
use crate::storage::{PagedStorage, INVALID_PAGE_NUMBER};

/// Number of fixed column slots in the index-descriptor area.
pub const MAX_INDEX_COLUMNS: usize = 10;

/// The –1 sentinel for an unused column slot, in its on-disk `u16` form.
const UNUSED_COLUMN_SLOT: u16 = 0xFFFF;

const PAGE_TYPE_INDEX: u8 = 0x04;
const INDEX_PAGE_HEADER_UNKNOWN: u8 = 0x01;

/// One key column of an index together with its declared sort order.
#[derive(Debug, Clone)]
pub struct IndexColumn {
    pub column: Column,
    /// Insertion-order position among the index's key columns, preserved verbatim;
    /// ascending/descending is carried by the external index descriptor and is opaque
    /// to the byte-level codec, which defines no reversed comparator.
    pub order: u8,
}

/// Runtime state for one index.
pub struct Index {
    pub page_number: i32,
    pub parent_page_number: i32,
    pub index_number: u32,
    pub name: String,
    pub primary_key: bool,
    pub columns: Vec<IndexColumn>,
    entries: Vec<Entry>,
}

impl Index {
    /// Build an as-yet-unpersisted index for the write path.
    pub fn new(
        name: impl Into<String>,
        index_number: u32,
        primary_key: bool,
        parent_page_number: i32,
        columns: Vec<IndexColumn>,
    ) -> Self {
        Self {
            page_number: INVALID_PAGE_NUMBER,
            parent_page_number,
            index_number,
            name: name.into(),
            primary_key,
            columns,
            entries: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Insert a new entry, preserving the entries' total order. A sorted vector with
    /// binary insert is sufficient at page-bounded `n`.
    pub fn add_row(
        &mut self,
        row: &[Option<IndexableValue>],
        page_number: u32,
        row_number: u8,
    ) -> Result<()> {
        let descriptor_columns: Vec<Column> =
            self.columns.iter().map(|ic| ic.column.clone()).collect();
        let entry = Entry::from_values(&descriptor_columns, row, page_number, row_number)?;
        let pos = self.insertion_position(&entry)?;
        self.entries.insert(pos, entry);
        Ok(())
    }

    fn insertion_position(&self, entry: &Entry) -> Result<usize> {
        let mut lo = 0usize;
        let mut hi = self.entries.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.entries[mid].compare(entry)? == std::cmp::Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Parse the index-descriptor slot area (ten `[u16 columnNumber][u8 order]` slots)
    /// plus the trailing header fields that precede the page-level read.
    /// `available_columns` resolves the column numbers found in the slots.
    pub fn read(
        buf: &[u8],
        available_columns: &[Column],
        format: &FormatDescriptor,
        storage: &mut dyn PagedStorage,
        parent_page_number: i32,
        index_number: u32,
        name: impl Into<String>,
        primary_key: bool,
    ) -> Result<Self> {
        let mut cursor = Cursor::new(buf);
        let area = DescriptorArea::read(&mut cursor)
            .map_err(|e| Error::FormatViolation(format!("index descriptor area: {e}")))?;

        let mut columns = Vec::new();
        for slot in area.slots {
            if slot.column_number == UNUSED_COLUMN_SLOT {
                continue;
            }
            let column = available_columns
                .iter()
                .find(|c| c.column_number == slot.column_number)
                .ok_or_else(|| {
                    Error::FormatViolation(format!(
                        "index references unknown column {}",
                        slot.column_number
                    ))
                })?;
            columns.push(IndexColumn {
                column: column.clone(),
                order: slot.order,
            });
        }

        let page_number = area.page_number as i32;

        tracing::trace!(page_number, "reading index page");
        let mut page = vec![0u8; format.page_size];
        storage.read_page(&mut page, page_number)?;

        let mut header_cursor = Cursor::new(&page[..format.offset_index_entry_mask]);
        let header = IndexPageHeader::read(&mut header_cursor)
            .map_err(|e| Error::FormatViolation(format!("index page header: {e}")))?;
        if header.page_type != PAGE_TYPE_INDEX {
            return Err(Error::FormatViolation("not an index page".into()));
        }

        let mask_start = format.offset_index_entry_mask;
        let mask = page
            .get(mask_start..mask_start + format.size_index_entry_mask)
            .ok_or_else(|| Error::FormatViolation("entry mask runs past page bounds".into()))?;

        let mut entries = Vec::new();
        let mut entry_start = mask_start + format.size_index_entry_mask;
        let mut next_entry_index = 0usize;
        let descriptor_columns: Vec<Column> = columns.iter().map(|ic| ic.column.clone()).collect();

        for k in 0..mask.len() * 8 {
            let byte = mask[k / 8];
            let bit_set = byte & (1 << (k % 8)) != 0;
            if !bit_set {
                continue;
            }
            let entry_end = entry_start_offset(mask_start + format.size_index_entry_mask, k);
            let mut read_pos = entry_start;
            let entry = Entry::from_buffer(
                &descriptor_columns,
                &page,
                &mut read_pos,
                next_entry_index,
            )?;
            if read_pos != entry_end {
                return Err(Error::FormatViolation(
                    "entry mask boundary disagrees with parsed entry length".into(),
                ));
            }
            entries.push(entry);
            entry_start = entry_end;
            next_entry_index += 1;
        }

        Ok(Self {
            page_number,
            parent_page_number: header.parent_page_number as i32,
            index_number,
            name: name.into(),
            primary_key,
            columns,
            entries,
        })
    }

    /// Serialize this index's entries to a fresh page buffer.
    pub fn write(&self, format: &FormatDescriptor) -> Result<Vec<u8>> {
        let mut page = vec![0u8; format.page_size];

        let header = IndexPageHeader {
            page_type: PAGE_TYPE_INDEX,
            header_unknown: INDEX_PAGE_HEADER_UNKNOWN,
            free_space: 0, // placeholder, patched below once the entries region is known
            parent_page_number: self.parent_page_number as u32,
            reserved: [0u8; 19],
        };
        {
            let mut cursor = Cursor::new(&mut page[..format.offset_index_entry_mask]);
            header
                .write(&mut cursor)
                .map_err(|e| Error::FormatViolation(format!("index page header: {e}")))?;
        }

        let mask_start = format.offset_index_entry_mask;
        let mut mask = vec![0u8; format.size_index_entry_mask];
        let mut total_size = 0usize;
        let mut encoded_entries = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let mut buf = Vec::new();
            entry.write(&mut buf)?;
            total_size += buf.len();
            let bit = total_size % 8;
            let byte = total_size / 8;
            if byte >= mask.len() {
                return Err(Error::FormatViolation("entry mask overflow".into()));
            }
            mask[byte] |= 1 << bit;
            encoded_entries.push(buf);
        }

        page[mask_start..mask_start + mask.len()].copy_from_slice(&mask);

        let mut pos = mask_start + mask.len();
        for buf in &encoded_entries {
            page[pos..pos + buf.len()].copy_from_slice(buf);
            pos += buf.len();
        }

        if pos > format.page_size {
            return Err(Error::FormatViolation("index page overflow".into()));
        }
        let free_space = (format.page_size - pos) as u16;
        page[2..4].copy_from_slice(&free_space.to_be_bytes());

        Ok(page)
    }

    /// Reserialize and write this index's page back to storage.
    pub fn update(&mut self, storage: &mut dyn PagedStorage, format: &FormatDescriptor) -> Result<()> {
        if self.page_number == INVALID_PAGE_NUMBER {
            self.page_number = storage.reserve_page_number()?;
        }
        let page = self.write(format)?;
        tracing::trace!(page_number = self.page_number, rows = self.entries.len(), "writing index page");
        storage.write_page(&page, self.page_number)
    }

    /// The ten fixed `[u16 columnNumber][u8 order]` slots for the table-definition
    /// area, unused slots filled with the sentinel.
    pub fn descriptor_slots(&self) -> [(u16, u8); MAX_INDEX_COLUMNS] {
        let mut slots = [(UNUSED_COLUMN_SLOT, 0u8); MAX_INDEX_COLUMNS];
        for (slot, ic) in slots.iter_mut().zip(self.columns.iter()) {
            *slot = (ic.column.column_number, ic.order);
        }
        slots
    }
}

/// The fixed page header preceding the entry-length mask: page type, a housekeeping
/// unknown byte, the free-space counter, and the parent page pointer, followed by
/// reserved bytes this crate never interprets. Same fixed-layout shape as a database
/// file header, so it's parsed and written with `binrw` rather than by hand.
#[binrw]
#[brw(big)]
struct IndexPageHeader {
    page_type: u8,
    header_unknown: u8,
    free_space: u16,
    parent_page_number: u32,
    reserved: [u8; 19],
}

/// One `[u16 columnNumber][u8 order]` slot in the index-descriptor area.
#[binrw]
#[brw(big)]
#[derive(Clone, Copy)]
struct DescriptorSlot {
    column_number: u16,
    order: u8,
}

/// The fixed region preceding an index's page-level read: ten descriptor slots, then
/// the root page number and its surrounding unknown bytes.
#[binrw]
#[brw(big)]
struct DescriptorArea {
    slots: [DescriptorSlot; MAX_INDEX_COLUMNS],
    unknown_before_page_number: u32,
    page_number: u32,
    unknown_after_page_number: [u8; 10],
}

/// Translate mask-bit index `k` (= `byte*8 + bit`, matching how `write` derives
/// `byte = totalSize/8, bit = totalSize%8`) into the absolute page offset of the entry
/// boundary that bit marks: `k` itself is the cumulative byte count since the start of
/// the entries region.
fn entry_start_offset(entries_base: usize, k: usize) -> usize {
    entries_base + k
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::DataType;
    use crate::entry::IndexableValue;
    use crate::storage::MemPagedStorage;

    fn id_column() -> Column {
        let mut c = Column::new("ID", DataType::Int, 4);
        c.column_number = 0;
        c
    }

    fn new_index(parent: i32) -> Index {
        Index::new(
            "idx",
            0,
            true,
            parent,
            vec![IndexColumn {
                column: id_column(),
                order: 0,
            }],
        )
    }

    #[test]
    fn empty_index_page_round_trip() {
        let format = FormatDescriptor::JET_4;
        let index = new_index(42);
        let page = index.write(&format).unwrap();
        assert_eq!(page[0], 0x04);
        assert_eq!(page[1], 0x01);
        let expected_free =
            (format.page_size - (format.offset_index_entry_mask + format.size_index_entry_mask))
                as u16;
        assert_eq!(u16::from_be_bytes([page[2], page[3]]), expected_free);
        assert_eq!(u32::from_be_bytes([page[4], page[5], page[6], page[7]]), 42);
        let mask_region = &page[format.offset_index_entry_mask
            ..format.offset_index_entry_mask + format.size_index_entry_mask];
        assert!(mask_region.iter().all(|&b| b == 0));
    }

    #[test]
    fn add_row_then_write_then_read_roundtrips() {
        let format = FormatDescriptor::JET_4;
        let mut index = new_index(42);
        index.add_row(&[Some(IndexableValue::Int(0))], 7, 3).unwrap();
        assert_eq!(index.row_count(), 1);

        let page = index.write(&format).unwrap();
        let mut storage = MemPagedStorage::new(format.page_size);
        let page_number = storage.reserve_page_number().unwrap();
        storage.write_page(&page, page_number).unwrap();

        // Ten [u16 columnNumber][u8 order] slots, then 4 unknown bytes, a 4-byte page
        // number, and 10 trailing unknown bytes.
        let mut slot_area = vec![0u8; MAX_INDEX_COLUMNS * 3 + 4 + 4 + 10];
        slot_area[0..2].copy_from_slice(&0u16.to_be_bytes()); // column 0
        slot_area[2] = 0; // order
        for slot in 1..MAX_INDEX_COLUMNS {
            let off = slot * 3;
            slot_area[off..off + 2].copy_from_slice(&UNUSED_COLUMN_SLOT.to_be_bytes());
        }
        let page_number_offset = MAX_INDEX_COLUMNS * 3 + 4;
        slot_area[page_number_offset..page_number_offset + 4]
            .copy_from_slice(&(page_number as u32).to_be_bytes());

        let columns = vec![id_column()];
        let read_back = Index::read(
            &slot_area,
            &columns,
            &format,
            &mut storage,
            42,
            0,
            "idx",
            true,
        )
        .unwrap();

        assert_eq!(read_back.row_count(), 1);
        assert_eq!(read_back.entries()[0].page, 7);
        assert_eq!(read_back.entries()[0].row, 3);

        let rewritten = read_back.write(&format).unwrap();
        assert_eq!(rewritten[5..], page[5..], "round trip modulo free-space field");
    }

    #[test]
    fn descriptor_slots_fill_unused_with_sentinel() {
        let index = new_index(1);
        let slots = index.descriptor_slots();
        assert_eq!(slots[0], (0, 0));
        for slot in &slots[1..] {
            assert_eq!(slot.0, UNUSED_COLUMN_SLOT);
        }
    }
}
