//! Paged storage interface: the abstract block-I/O collaborator.
//!
//! The core never opens a file or owns a page cache itself; it is lent a
//! `&mut dyn PagedStorage` for the duration of each call, the same way a page builder
//! is lent a `&mut [u8]`/`Cursor` for each page it assembles.

use crate::error::Result;

/// Sentinel for "no page" — distinct from any legitimate page number.
pub const INVALID_PAGE_NUMBER: i32 = -1;

/// Abstract fixed-size page storage with write-epoch bracketing.
///
/// Implementations are not required to be safe for concurrent mutation: the core
/// assumes single-writer discipline per database.
pub trait PagedStorage {
    /// Page size in bytes for this storage instance.
    fn page_size(&self) -> usize;

    /// A fresh, zeroed buffer of exactly `page_size()` bytes.
    fn create_page_buffer(&self) -> Vec<u8> {
        vec![0u8; self.page_size()]
    }

    /// Fill `buf` (must be exactly `page_size()` bytes) from disk at `page_number`.
    fn read_page(&mut self, buf: &mut [u8], page_number: i32) -> Result<()>;

    /// Write exactly `buf.len()` bytes (must equal `page_size()`) at `page_number`.
    fn write_page(&mut self, buf: &[u8], page_number: i32) -> Result<()>;

    /// Return the next previously-unused page number and mark it reserved.
    fn reserve_page_number(&mut self) -> Result<i32>;

    /// Open a write epoch. All writes until the matching `finish_write` must become
    /// durable as a group on success.
    fn start_write(&mut self) -> Result<()>;

    /// Close the write epoch opened by `start_write`. Callers must invoke this on every
    /// exit path, success or failure (see [`WriteEpoch`]).
    fn finish_write(&mut self) -> Result<()>;
}

/// Scoped write-epoch guard: opens on construction, closes on drop.
///
/// This is the core's "scoped acquisition" idiom: whatever happens inside the
/// scope — early return, `?`, or panic — `finish_write` runs exactly once.
pub struct WriteEpoch<'a, S: PagedStorage + ?Sized> {
    storage: &'a mut S,
    finished: bool,
}

impl<'a, S: PagedStorage + ?Sized> WriteEpoch<'a, S> {
    pub fn open(storage: &'a mut S) -> Result<Self> {
        storage.start_write()?;
        Ok(Self {
            storage,
            finished: false,
        })
    }

    pub fn storage(&mut self) -> &mut S {
        self.storage
    }

    /// Close the epoch early and observe any error from `finish_write`. Idempotent:
    /// `Drop` will not call `finish_write` again once this has run.
    pub fn close(mut self) -> Result<()> {
        self.finished = true;
        self.storage.finish_write()
    }
}

impl<'a, S: PagedStorage + ?Sized> Drop for WriteEpoch<'a, S> {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            // Best-effort on the unwind/early-return path; the caller that wants to
            // observe the error should call `close()` explicitly instead.
            let _ = self.storage.finish_write();
        }
    }
}

/// In-memory [`PagedStorage`] used by tests, and available to any caller that wants a
/// disposable database without touching disk.
pub struct MemPagedStorage {
    page_size: usize,
    pages: Vec<Vec<u8>>,
    next_page: i32,
    in_write: bool,
}

impl MemPagedStorage {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            next_page: 0,
            in_write: false,
        }
    }

    /// Number of pages ever reserved.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl PagedStorage for MemPagedStorage {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read_page(&mut self, buf: &mut [u8], page_number: i32) -> Result<()> {
        let idx = usize::try_from(page_number).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "negative page number")
        })?;
        let page = self.pages.get(idx).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "page not allocated")
        })?;
        buf.copy_from_slice(page);
        Ok(())
    }

    fn write_page(&mut self, buf: &[u8], page_number: i32) -> Result<()> {
        let idx = usize::try_from(page_number).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "negative page number")
        })?;
        if idx >= self.pages.len() {
            self.pages.resize(idx + 1, vec![0u8; self.page_size]);
        }
        self.pages[idx].copy_from_slice(buf);
        Ok(())
    }

    fn reserve_page_number(&mut self) -> Result<i32> {
        let page = self.next_page;
        self.next_page += 1;
        if self.pages.len() < page as usize + 1 {
            self.pages.resize(page as usize + 1, vec![0u8; self.page_size]);
        }
        Ok(page)
    }

    fn start_write(&mut self) -> Result<()> {
        self.in_write = true;
        Ok(())
    }

    fn finish_write(&mut self) -> Result<()> {
        self.in_write = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_then_roundtrip() {
        let mut storage = MemPagedStorage::new(4096);
        let page = storage.reserve_page_number().unwrap();
        assert_eq!(page, 0);

        let mut buf = storage.create_page_buffer();
        buf[0] = 0x42;
        storage.write_page(&buf, page).unwrap();

        let mut read_back = storage.create_page_buffer();
        storage.read_page(&mut read_back, page).unwrap();
        assert_eq!(read_back[0], 0x42);
    }

    #[test]
    fn write_epoch_closes_on_early_return() {
        let mut storage = MemPagedStorage::new(4096);
        let run = |storage: &mut MemPagedStorage| -> Result<()> {
            let _epoch = WriteEpoch::open(storage)?;
            Err(crate::error::Error::FormatViolation("boom".into()))?;
            Ok(())
        };
        assert!(run(&mut storage).is_err());
        assert!(!storage.in_write);
    }
}
