//! Script engine interface.
//!
//! The server knows nothing about the scripting language.  It creates and destroys engine
//! instances, hands an instance a source buffer together with the request's query parameters, and
//! collects whatever the script writes into a bounded [`ScriptOutput`].

use core::fmt;

use crate::ascii::{AMPERSAND, EQUALS};

/// A write did not fit in the remaining space of a [`ScriptOutput`]
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferOverflow {
    /// Capacity of the buffer that rejected the write
    pub capacity: usize,
}

/// ScriptError is returned by `ScriptEngine` implementations
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScriptError {
    /// A new engine instance could not be created, usually for lack of memory
    CreateFailed,
    /// The script failed to load or raised an error while running
    Execution,
    /// The script produced more output than the connection can hold
    Output(BufferOverflow),
}

impl From<BufferOverflow> for ScriptError {
    fn from(value: BufferOverflow) -> Self {
        Self::Output(value)
    }
}

/// Trait implemented by the embedded interpreter.
pub trait ScriptEngine {
    /// Persistent interpreter state for one peer
    type Instance;

    /// Create a fresh interpreter
    fn create_instance(&mut self) -> Result<Self::Instance, ScriptError>;

    /// Tear an interpreter down
    fn destroy_instance(&mut self, instance: Self::Instance);

    /// Run `source` on `instance`.  `params` holds the request's query string parameters and
    /// anything the script prints goes to `output`.  Writes to `output` are all or nothing: a
    /// write that does not fit is rejected with [`BufferOverflow`], which should be passed up.
    fn execute(
        &mut self,
        instance: &mut Self::Instance,
        source: &[u8],
        params: &Params<'_>,
        output: &mut ScriptOutput<'_>,
    ) -> Result<(), ScriptError>;
}

/// Bounded sink collecting script output before it is sent to the client.
pub struct ScriptOutput<'a> {
    buf: &'a mut [u8],
    len: usize,
    overflowed: bool,
}

impl<'a> ScriptOutput<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            len: 0,
            overflowed: false,
        }
    }

    /// Append `data`.  Nothing is written unless all of it fits.
    pub fn write(&mut self, data: &[u8]) -> Result<(), BufferOverflow> {
        let end = self.len + data.len();
        match self.buf.get_mut(self.len..end) {
            Some(dst) => {
                dst.copy_from_slice(data);
                self.len = end;
                Ok(())
            }
            None => {
                self.overflowed = true;
                Err(BufferOverflow {
                    capacity: self.buf.len(),
                })
            }
        }
    }

    /// Bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total capacity
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Set once any write has been rejected, even if the engine swallowed the error
    pub(crate) fn overflowed(&self) -> bool {
        self.overflowed
    }
}

impl fmt::Write for ScriptOutput<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s.as_bytes()).or(Err(fmt::Error))
    }
}

/// Query string parameters made available to a script.
///
/// Pairs are separated by `&` and split into key and value at the first `=`.  Segments without a
/// `=` or with an empty key are skipped.  `+` has already been translated to a space.
///
/// ```
/// use scriptlite::engine::Params;
///
/// let params = Params::new("led=on&name=a b&flag&x=1=2");
/// assert_eq!(params.get("led"), Some("on"));
/// assert_eq!(params.get("x"), Some("1=2"));
/// assert_eq!(params.get("flag"), None);
/// assert_eq!(params.iter().count(), 3);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Params<'a> {
    query: &'a str,
}

impl<'a> Params<'a> {
    /// Parameters parsed from `query`
    pub fn new(query: &'a str) -> Self {
        Self { query }
    }

    /// Iterate over the `(key, value)` pairs in order of appearance
    pub fn iter(&self) -> ParamsIter<'a> {
        ParamsIter {
            pairs: self.query.split(AMPERSAND as char),
        }
    }

    /// Value of the first pair keyed `key`
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// True when there are no pairs
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<'a> IntoIterator for &Params<'a> {
    type Item = (&'a str, &'a str);
    type IntoIter = ParamsIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over [`Params`] pairs
pub struct ParamsIter<'a> {
    pairs: core::str::Split<'a, char>,
}

impl<'a> Iterator for ParamsIter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        for pair in self.pairs.by_ref() {
            match pair.split_once(EQUALS as char) {
                Some((key, value)) if !key.is_empty() => return Some((key, value)),
                _ => continue,
            }
        }

        None
    }
}
