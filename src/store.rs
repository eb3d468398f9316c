//! Content store interface.
//!
//! The server never holds resource bytes itself.  A response keeps the store's handle and borrows
//! the bytes again on every step, so a store may hand out views into ROM, into a cache, or into a
//! transient buffer it reuses once the handle is released.

/// Reasons a resource cannot be opened
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// No resource by that name
    NotFound,
    /// The resource exists but is larger than the store (or the server) is able to serve
    ResourceTooLarge,
}

/// A read-only content store
pub trait ContentStore {
    /// Identifies an opened resource until it is released
    type Handle;

    /// Open the resource called `name`, e.g. `/index.html`
    fn open(&mut self, name: &str) -> Result<Self::Handle, StoreError>;

    /// The resource's bytes.  Must return the same bytes for as long as the handle is held.
    fn bytes(&self, handle: &Self::Handle) -> &[u8];

    /// Length of the resource in bytes
    fn len(&self, handle: &Self::Handle) -> usize {
        self.bytes(handle).len()
    }

    /// Called once the response using `handle` has finished or been abandoned
    fn release(&mut self, _handle: Self::Handle) {}
}

/// A store over a fixed table of `(name, bytes)` pairs, typically built from `include_bytes!`.
///
/// ```
/// use scriptlite::store::{ContentStore, StaticStore, StoreError};
///
/// static FILES: [(&str, &[u8]); 2] = [
///     ("/index.html", b"<html></html>"),
///     ("/404.html", b"gone"),
/// ];
///
/// let mut store = StaticStore::new(&FILES);
///
/// let handle = store.open("/404.html").unwrap();
/// assert_eq!(store.bytes(&handle), b"gone");
/// assert_eq!(store.open("/missing.css").err(), Some(StoreError::NotFound));
/// ```
pub struct StaticStore {
    files: &'static [(&'static str, &'static [u8])],
    max_len: usize,
}

impl StaticStore {
    /// Create a store serving `files` with no size limit
    pub const fn new(files: &'static [(&'static str, &'static [u8])]) -> Self {
        Self {
            files,
            max_len: usize::MAX,
        }
    }

    /// Refuse resources longer than `max_len` with `StoreError::ResourceTooLarge`
    pub const fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }
}

impl ContentStore for StaticStore {
    type Handle = &'static [u8];

    fn open(&mut self, name: &str) -> Result<Self::Handle, StoreError> {
        let &(_, data) = self
            .files
            .iter()
            .find(|(n, _)| *n == name)
            .ok_or(StoreError::NotFound)?;

        if data.len() > self.max_len {
            return Err(StoreError::ResourceTooLarge);
        }

        Ok(data)
    }

    fn bytes(&self, handle: &Self::Handle) -> &[u8] {
        *handle
    }
}
