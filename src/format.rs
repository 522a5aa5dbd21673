//! Format descriptor: read-only, version-dependent numeric limits.
//!
//! The core never chooses a [`FormatDescriptor`] for itself — the collaborator that
//! reads the database file header does that, then lends the core a reference for the
//! duration of a call. The two constants below stand in for that lookup table; see
//! DESIGN.md for how their exact numbers were chosen.

/// Immutable per-database-version limits, consumed read-only by every other component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FormatDescriptor {
    /// Size in bytes of every page in the database file.
    pub page_size: usize,
    /// Size in bytes of the bit-packed entry-length mask on an index page.
    pub size_index_entry_mask: usize,
    /// Byte offset, from the start of an index page, where the entry-length mask begins.
    pub offset_index_entry_mask: usize,
    /// Maximum length, in characters, of a table name.
    pub max_table_name_length: usize,
    /// Maximum number of columns a single table may declare.
    pub max_columns_per_table: usize,
    /// Maximum number of indexes a single table may declare.
    pub max_indexes_per_table: usize,
}

impl FormatDescriptor {
    /// Index-page layout constant: fixed header through the entry mask.
    const INDEX_PAGE_HEADER_LEN: usize = 27;

    /// A conservative legacy ("Jet 3") format: smaller pages, tighter limits.
    pub const JET_3: FormatDescriptor = FormatDescriptor {
        page_size: 2048,
        size_index_entry_mask: 248,
        offset_index_entry_mask: Self::INDEX_PAGE_HEADER_LEN,
        max_table_name_length: 64,
        max_columns_per_table: 255,
        max_indexes_per_table: 32,
    };

    /// The later ("Jet 4") format: 4 KiB pages, wider limits.
    pub const JET_4: FormatDescriptor = FormatDescriptor {
        page_size: 4096,
        size_index_entry_mask: 504,
        offset_index_entry_mask: Self::INDEX_PAGE_HEADER_LEN,
        max_table_name_length: 128,
        max_columns_per_table: 256,
        max_indexes_per_table: 32,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_region_fits_within_page() {
        for fmt in [FormatDescriptor::JET_3, FormatDescriptor::JET_4] {
            assert!(fmt.offset_index_entry_mask + fmt.size_index_entry_mask <= fmt.page_size);
        }
    }
}
