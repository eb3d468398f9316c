use crate::ascii::{CR, LF, PLUS, QUESTION, SLASH, SP};
use crate::header::REQ_HEAD_REFERER;

const GET: &[u8] = "GET".as_bytes();

/// Size of the per-connection input scratch buffer.  Request targets must fit in it, longer header
/// lines are truncated to it.
pub const MAX_TOKEN_LEN: usize = 128;
/// Longest resource path accepted in a request target
pub const MAX_PATH_LEN: usize = 64;
/// Longest query string accepted in a request target
pub const MAX_QUERY_LEN: usize = 128;

#[derive(PartialEq, Debug)]
pub(crate) enum RequestError {
    /// More data is needed.  Everything offered so far has been consumed.
    Incomplete,
    ProtocolError(&'static str),
}

/// Request contains what the server uses from a parsed request line: the resource path and the
/// query string.  Headers are read and discarded.
#[non_exhaustive]
#[derive(Debug, Default, PartialEq)]
pub struct Request {
    /// Resource path e.g. `/index.html`.  A target of `/` is replaced with the configured index.
    pub path: heapless::String<MAX_PATH_LEN>,
    /// Query string following the first `?` with every `+` already translated to a space
    pub query: heapless::String<MAX_QUERY_LEN>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Stage {
    Method,
    Target,
    Headers,
    Done,
}

/// Incremental request parser.  Bytes may be fed in fragments of any size; the parser keeps its
/// place in the fixed scratch buffer between calls.
pub(crate) struct RequestParser {
    stage: Stage,
    index: &'static str,
    scratch: heapless::Vec<u8, MAX_TOKEN_LEN>,
    truncated: bool,
    request: Request,
}

impl RequestParser {
    pub(crate) fn new(index: &'static str) -> Self {
        Self {
            stage: Stage::Method,
            index,
            scratch: heapless::Vec::new(),
            truncated: false,
            request: Request::default(),
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    pub(crate) fn request(&self) -> &Request {
        &self.request
    }

    /// Consume `data`.  Returns the number of bytes consumed once the blank line ending the
    /// headers has been seen, `Incomplete` when all of `data` was consumed without reaching it.
    pub(crate) fn feed(&mut self, data: &[u8]) -> Result<usize, RequestError> {
        for (i, b) in data.iter().copied().enumerate() {
            match self.stage {
                Stage::Method => self.method_byte(b)?,
                Stage::Target => self.target_byte(b)?,
                Stage::Headers => self.header_byte(b),
                Stage::Done => return Ok(i),
            }

            if self.stage == Stage::Done {
                return Ok(i + 1);
            }
        }

        if self.stage == Stage::Done {
            return Ok(0);
        }

        Err(RequestError::Incomplete)
    }

    fn method_byte(&mut self, b: u8) -> Result<(), RequestError> {
        match b {
            // tolerate empty lines ahead of the request line
            CR | LF if self.scratch.is_empty() => Ok(()),
            CR | LF => Err(RequestError::ProtocolError("malformed http request")),
            SP => {
                if self.scratch[..] != *GET {
                    return Err(RequestError::ProtocolError("unsupported http method"));
                }
                self.scratch.clear();
                self.stage = Stage::Target;
                Ok(())
            }
            _ => self
                .scratch
                .push(b)
                .or(Err(RequestError::ProtocolError("unsupported http method"))),
        }
    }

    fn target_byte(&mut self, b: u8) -> Result<(), RequestError> {
        match b {
            SP | CR | LF => {
                self.set_target()?;
                self.scratch.clear();
                // a request line without a version has no headers following it
                self.stage = if b == SP { Stage::Headers } else { Stage::Done };
                Ok(())
            }
            _ => self
                .scratch
                .push(b)
                .or(Err(RequestError::ProtocolError("request target too long"))),
        }
    }

    fn header_byte(&mut self, b: u8) {
        if b != LF {
            if self.scratch.push(b).is_err() {
                self.truncated = true;
            }
            return;
        }

        let line = match &self.scratch[..] {
            [line @ .., CR] => line,
            line => line,
        };

        if line.is_empty() && !self.truncated {
            self.stage = Stage::Done;
            return;
        }

        if self.truncated && line.starts_with(REQ_HEAD_REFERER.as_bytes()) {
            trace!("truncated overlong referer header");
        }

        self.scratch.clear();
        self.truncated = false;
    }

    fn set_target(&mut self) -> Result<(), RequestError> {
        let target = core::str::from_utf8(&self.scratch)
            .or(Err(RequestError::ProtocolError("request target is not valid utf8")))?;

        if target.as_bytes().first() != Some(&SLASH) {
            return Err(RequestError::ProtocolError("malformed http request"));
        }

        // only a bare `/` names the index, `/?x` asks for the resource `/`
        let (path, query) = match target.split_once(QUESTION as char) {
            _ if target == "/" => (self.index, ""),
            Some((path, query)) => (path, query),
            None => (target, ""),
        };

        self.request.path.clear();
        self.request
            .path
            .push_str(path)
            .or(Err(RequestError::ProtocolError("request path too long")))?;

        self.request.query.clear();
        for c in query.chars() {
            let c = if c == PLUS as char { ' ' } else { c };
            self.request
                .query
                .push(c)
                .or(Err(RequestError::ProtocolError("query string too long")))?;
        }

        Ok(())
    }
}
