//! The database's table catalog (external collaborator).
//!
//! The core interacts with the catalog through exactly one call: registering a newly
//! created table. Everything else about how tables are listed or looked up lives
//! outside the core.

/// Row-type discriminator used when registering system objects. Only `TYPE_TABLE` is
/// relevant to table creation.
pub const TYPE_TABLE: u8 = 1;

/// Narrow surface the table creator depends on to register a finished table.
pub trait Catalog {
    fn add_new_table(&mut self, name: &str, tdef_page_number: i32, object_type: u8) -> crate::error::Result<()>;
}
