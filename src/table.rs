//! Table-creation orchestrator: validates a proposed table and drives the write-epoch
//! that emits its table-definition page and any index pages.

use std::collections::HashMap;

use crate::catalog::{Catalog, TYPE_TABLE};
use crate::column::Column;
use crate::error::{Error, Result};
use crate::format::FormatDescriptor;
use crate::index::{Index, IndexColumn, MAX_INDEX_COLUMNS};
use crate::storage::{PagedStorage, WriteEpoch};

/// One key-column reference within a proposed index, by column name. `ascending` is
/// carried through to the index-descriptor slot for the table-definition writer; the
/// byte-level codec has no reversed comparator, so a descending key only changes how a
/// query planner walks the entries — out of scope here.
#[derive(Debug, Clone)]
pub struct IndexColumnSpec {
    pub column_name: String,
    pub ascending: bool,
}

/// A proposed index, supplied by the caller of [`TableCreator::create_table`].
#[derive(Debug, Clone)]
pub struct IndexDescriptor {
    pub name: String,
    pub primary_key: bool,
    pub columns: Vec<IndexColumnSpec>,
}

/// Per-index bookkeeping owned by the Creator.
#[derive(Debug, Clone)]
pub struct IndexState {
    pub index_number: u32,
    /// Equal to `index_number` while composite foreign-key indexes are unsupported.
    pub index_data_number: u32,
    pub umap_row_number: u8,
    pub umap_page_number: i32,
    pub root_page_number: i32,
}

/// Per-long-value-column bookkeeping, created lazily only for long-value columns.
#[derive(Debug, Clone)]
pub struct ColumnState {
    pub column_number: u16,
    pub umap_page_number: i32,
    pub umap_row_number: u8,
}

/// Everything the external table-definition writer needs to emit the page: the Creator
/// assembles this, but does not know the tdef page's byte layout itself.
pub struct TableDefinitionMeta<'a> {
    pub name: &'a str,
    pub tdef_page_number: i32,
    pub umap_page_number: i32,
    pub columns: &'a [Column],
    pub indexes: &'a [(IndexDescriptor, IndexState, Index)],
    pub long_value_columns: &'a [ColumnState],
}

/// External collaborator that knows the table-definition page's on-disk layout (not
/// specified here; out of scope for this crate).
pub trait TableDefinitionWriter {
    fn write_table_definition(
        &mut self,
        storage: &mut dyn PagedStorage,
        meta: &TableDefinitionMeta,
    ) -> Result<()>;
}

/// Validates a proposed table and, on success, assigns numbers, allocates pages, and
/// emits them within one write epoch.
pub struct TableCreator<'a> {
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<IndexDescriptor>,
    format: &'a FormatDescriptor,
}

impl<'a> TableCreator<'a> {
    pub fn new(
        name: impl Into<String>,
        columns: Vec<Column>,
        indexes: Vec<IndexDescriptor>,
        format: &'a FormatDescriptor,
    ) -> Self {
        Self {
            name: name.into(),
            columns,
            indexes,
            format,
        }
    }

    /// All checks run before any page is touched.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.len() > self.format.max_table_name_length {
            return Err(Error::InvalidTableDefinition(format!(
                "table name must be 1..={} characters",
                self.format.max_table_name_length
            )));
        }

        if self.columns.is_empty() {
            return Err(Error::InvalidTableDefinition("table must have at least one column".into()));
        }
        if self.columns.len() > self.format.max_columns_per_table {
            return Err(Error::InvalidTableDefinition(format!(
                "table declares {} columns, exceeding the format limit of {}",
                self.columns.len(),
                self.format.max_columns_per_table
            )));
        }

        let mut seen_columns = std::collections::HashSet::new();
        for column in &self.columns {
            if column.name.is_empty() {
                return Err(Error::InvalidTableDefinition("column name must not be empty".into()));
            }
            if !seen_columns.insert(column.name.as_str()) {
                return Err(Error::InvalidTableDefinition(format!(
                    "duplicate column name {}",
                    column.name
                )));
            }
        }

        let mut auto_number_counts: HashMap<crate::column::DataType, usize> = HashMap::new();
        for column in &self.columns {
            if column.is_auto_number {
                *auto_number_counts.entry(column.data_type).or_insert(0) += 1;
            }
        }
        for (data_type, count) in &auto_number_counts {
            if *count > 1 {
                return Err(Error::InvalidTableDefinition(format!(
                    "at most one auto-number column of type {data_type:?} is allowed"
                )));
            }
        }

        if self.indexes.len() > self.format.max_indexes_per_table {
            return Err(Error::InvalidTableDefinition(format!(
                "table declares {} indexes, exceeding the format limit of {}",
                self.indexes.len(),
                self.format.max_indexes_per_table
            )));
        }

        let mut seen_index_names = std::collections::HashSet::new();
        let mut primary_key_count = 0;
        for index in &self.indexes {
            if index.columns.is_empty() || index.columns.len() > MAX_INDEX_COLUMNS {
                return Err(Error::InvalidTableDefinition(format!(
                    "index {} must reference 1..={} columns",
                    index.name, MAX_INDEX_COLUMNS
                )));
            }
            for key in &index.columns {
                if !self.columns.iter().any(|c| c.name == key.column_name) {
                    return Err(Error::InvalidTableDefinition(format!(
                        "index {} references unknown column {}",
                        index.name, key.column_name
                    )));
                }
            }
            let lower = index.name.to_lowercase();
            if !seen_index_names.insert(lower) {
                return Err(Error::InvalidTableDefinition(format!(
                    "duplicate index name {}",
                    index.name
                )));
            }
            if index.primary_key {
                primary_key_count += 1;
            }
        }
        if primary_key_count > 1 {
            return Err(Error::InvalidTableDefinition(
                "at most one index may be the primary key".into(),
            ));
        }

        Ok(())
    }

    /// Validate, number, allocate, and emit within one write epoch.
    pub fn create_table(
        &self,
        storage: &mut dyn PagedStorage,
        tdef_writer: &mut dyn TableDefinitionWriter,
        catalog: &mut dyn Catalog,
    ) -> Result<i32> {
        tracing::debug!(table = %self.name, columns = self.columns.len(), indexes = self.indexes.len(), "creating table");
        self.validate()?;

        let mut columns = self.columns.clone();
        for (i, column) in columns.iter_mut().enumerate() {
            column.column_number = i as u16;
        }
        let long_value_columns: Vec<ColumnState> = columns
            .iter()
            .filter(|c| c.is_long_value)
            .map(|c| ColumnState {
                column_number: c.column_number,
                umap_page_number: crate::storage::INVALID_PAGE_NUMBER,
                umap_row_number: 0,
            })
            .collect();

        let mut states = Vec::with_capacity(self.indexes.len());
        for (n, descriptor) in self.indexes.iter().enumerate() {
            states.push(IndexState {
                index_number: n as u32,
                index_data_number: n as u32,
                umap_row_number: 0,
                umap_page_number: crate::storage::INVALID_PAGE_NUMBER,
                root_page_number: crate::storage::INVALID_PAGE_NUMBER,
            });
        }

        let epoch = WriteEpoch::open(storage)?;
        self.emit(epoch, tdef_writer, catalog, columns, states, long_value_columns)
    }

    fn emit(
        &self,
        mut epoch: WriteEpoch<'_, dyn PagedStorage>,
        tdef_writer: &mut dyn TableDefinitionWriter,
        catalog: &mut dyn Catalog,
        columns: Vec<Column>,
        states: Vec<IndexState>,
        long_value_columns: Vec<ColumnState>,
    ) -> Result<i32> {
        let tdef_page_number = epoch.storage().reserve_page_number()?;
        let umap_page_number = epoch.storage().reserve_page_number()?;

        let indexes: Vec<(IndexDescriptor, IndexState, Index)> = self
            .indexes
            .iter()
            .cloned()
            .zip(states)
            .map(|(descriptor, state)| {
                let index_columns = descriptor
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(order, key)| {
                        let column = columns
                            .iter()
                            .find(|c| c.name == key.column_name)
                            .expect("validated above")
                            .clone();
                        IndexColumn {
                            column,
                            order: order as u8,
                        }
                    })
                    .collect();
                let index = Index::new(
                    descriptor.name.clone(),
                    state.index_number,
                    descriptor.primary_key,
                    tdef_page_number,
                    index_columns,
                );
                (descriptor, state, index)
            })
            .collect();

        let meta = TableDefinitionMeta {
            name: &self.name,
            tdef_page_number,
            umap_page_number,
            columns: &columns,
            indexes: &indexes,
            long_value_columns: &long_value_columns,
        };

        let write_result = tdef_writer
            .write_table_definition(epoch.storage(), &meta)
            .and_then(|()| catalog.add_new_table(&self.name, tdef_page_number, TYPE_TABLE));

        let close_result = epoch.close();
        write_result.and(close_result)?;
        tracing::info!(table = %self.name, tdef_page_number, "table created");
        Ok(tdef_page_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::DataType;
    use crate::storage::MemPagedStorage;

    fn id_column() -> Column {
        Column::new("ID", DataType::Long, 4).auto_number()
    }

    fn name_column() -> Column {
        Column::new("NAME", DataType::Text, 0)
    }

    struct NoopTdefWriter;
    impl TableDefinitionWriter for NoopTdefWriter {
        fn write_table_definition(
            &mut self,
            _storage: &mut dyn PagedStorage,
            _meta: &TableDefinitionMeta,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct FailingTdefWriter;
    impl TableDefinitionWriter for FailingTdefWriter {
        fn write_table_definition(
            &mut self,
            _storage: &mut dyn PagedStorage,
            _meta: &TableDefinitionMeta,
        ) -> Result<()> {
            Err(Error::StorageFailure(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }
    }

    #[derive(Default)]
    struct RecordingCatalog {
        registered: Vec<(String, i32)>,
    }
    impl Catalog for RecordingCatalog {
        fn add_new_table(&mut self, name: &str, tdef_page_number: i32, _object_type: u8) -> Result<()> {
            self.registered.push((name.to_string(), tdef_page_number));
            Ok(())
        }
    }

    #[test]
    fn duplicate_index_name_rejected_case_insensitively() {
        let format = FormatDescriptor::JET_4;
        let creator = TableCreator::new(
            "T",
            vec![id_column()],
            vec![
                IndexDescriptor {
                    name: "idx".into(),
                    primary_key: false,
                    columns: vec![IndexColumnSpec {
                        column_name: "ID".into(),
                        ascending: true,
                    }],
                },
                IndexDescriptor {
                    name: "IDX".into(),
                    primary_key: false,
                    columns: vec![IndexColumnSpec {
                        column_name: "ID".into(),
                        ascending: true,
                    }],
                },
            ],
            &format,
        );
        let err = creator.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidTableDefinition(_)));
    }

    #[test]
    fn empty_column_list_rejected() {
        let format = FormatDescriptor::JET_4;
        let creator = TableCreator::new("T", vec![], vec![], &format);
        assert!(creator.validate().is_err());
    }

    #[test]
    fn create_table_registers_with_catalog() {
        let format = FormatDescriptor::JET_4;
        let creator = TableCreator::new("T", vec![id_column(), name_column()], vec![], &format);
        let mut storage = MemPagedStorage::new(format.page_size);
        let mut tdef_writer = NoopTdefWriter;
        let mut catalog = RecordingCatalog::default();

        let tdef_page = creator
            .create_table(&mut storage, &mut tdef_writer, &mut catalog)
            .unwrap();

        assert_eq!(catalog.registered, vec![("T".to_string(), tdef_page)]);
    }

    #[test]
    fn write_epoch_closes_even_when_tdef_write_fails() {
        let format = FormatDescriptor::JET_4;
        let creator = TableCreator::new("T", vec![id_column()], vec![], &format);
        let mut storage = MemPagedStorage::new(format.page_size);
        let mut tdef_writer = FailingTdefWriter;
        let mut catalog = RecordingCatalog::default();

        let result = creator.create_table(&mut storage, &mut tdef_writer, &mut catalog);
        assert!(matches!(result, Err(Error::StorageFailure(_))));
        assert!(catalog.registered.is_empty());
    }
}
