//! Test doubles shared by the unit tests: a transport that records what it is given and a toy
//! script engine.
//!
//! The toy language runs `;` separated statements:
//!
//! * `k=v` stores `v` under `k` and prints `v`
//! * `get k` prints the stored value or `nil`
//! * `param k` prints the query parameter or `nil`
//! * `print text` prints `text`
//! * `id` prints the instance's serial number
//! * `fail` raises an error

extern crate std;

use std::string::{String, ToString};
use std::vec::Vec;

use crate::engine::{Params, ScriptEngine, ScriptError, ScriptOutput};
use crate::transport::{Transport, TransportError};

pub(crate) struct ToyInstance {
    id: u32,
    vars: Vec<(String, String)>,
}

#[derive(Default)]
pub(crate) struct ToyEngine {
    pub(crate) created: u32,
    pub(crate) destroyed: u32,
    pub(crate) executed: u32,
    pub(crate) fail_create: bool,
}

impl ScriptEngine for ToyEngine {
    type Instance = ToyInstance;

    fn create_instance(&mut self) -> Result<Self::Instance, ScriptError> {
        if self.fail_create {
            return Err(ScriptError::CreateFailed);
        }
        self.created += 1;
        Ok(ToyInstance {
            id: self.created,
            vars: Vec::new(),
        })
    }

    fn destroy_instance(&mut self, _instance: Self::Instance) {
        self.destroyed += 1;
    }

    fn execute(
        &mut self,
        instance: &mut Self::Instance,
        source: &[u8],
        params: &Params<'_>,
        output: &mut ScriptOutput<'_>,
    ) -> Result<(), ScriptError> {
        self.executed += 1;
        let source = core::str::from_utf8(source).or(Err(ScriptError::Execution))?;

        for stmt in source.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            if stmt == "fail" {
                return Err(ScriptError::Execution);
            } else if stmt == "id" {
                output.write(instance.id.to_string().as_bytes())?;
            } else if let Some(text) = stmt.strip_prefix("print ") {
                output.write(text.as_bytes())?;
            } else if let Some(key) = stmt.strip_prefix("get ") {
                let value = instance
                    .vars
                    .iter()
                    .find(|(k, _)| k == key)
                    .map_or("nil", |(_, v)| v.as_str());
                output.write(value.as_bytes())?;
            } else if let Some(key) = stmt.strip_prefix("param ") {
                output.write(params.get(key).unwrap_or("nil").as_bytes())?;
            } else if let Some((key, value)) = stmt.split_once('=') {
                instance.vars.retain(|(k, _)| k != key);
                instance.vars.push((key.to_string(), value.to_string()));
                output.write(value.as_bytes())?;
            } else {
                return Err(ScriptError::Execution);
            }
        }

        Ok(())
    }
}

/// Records everything sent.  `window` limits how many bytes each `send` accepts.
pub(crate) struct RecordingTransport {
    pub(crate) mss: usize,
    pub(crate) window: usize,
    pub(crate) sent: Vec<u8>,
    pub(crate) segments: Vec<usize>,
    pub(crate) closed: bool,
    pub(crate) aborted: bool,
}

impl RecordingTransport {
    pub(crate) fn new(mss: usize) -> Self {
        Self {
            mss,
            window: usize::MAX,
            sent: Vec::new(),
            segments: Vec::new(),
            closed: false,
            aborted: false,
        }
    }

    pub(crate) fn sent_str(&self) -> &str {
        core::str::from_utf8(&self.sent).unwrap()
    }

    /// Bytes sent after the blank line ending the response head
    pub(crate) fn body(&self) -> &[u8] {
        let split = self
            .sent
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("no response head");
        &self.sent[split + 4..]
    }
}

impl Transport for RecordingTransport {
    fn mss(&self) -> usize {
        self.mss
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        assert!(data.len() <= self.mss, "offered more than one segment");
        if self.closed || self.aborted {
            return Err(TransportError);
        }
        let n = data.len().min(self.window);
        if n > 0 {
            self.sent.extend_from_slice(&data[..n]);
            self.segments.push(n);
        }
        Ok(n)
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}
