//! Per-connection protocol state machine.
//!
//! A connection moves through
//!
//! ```text
//! Parsing -> Dispatching -> Streaming -> Closing
//! ```
//!
//! and may drop into `Closed`, `Aborted` or `TimedOut` from any state when the transport says so.
//! Every entry point does a bounded amount of work and returns: at most one script runs and at most
//! one segment is offered to the transport per call, and a later call picks up from the cursors
//! kept here.

use crate::config::Config;
use crate::engine::{BufferOverflow, Params, ScriptEngine};
use crate::header::{MAX_HEAD_LEN, write_head};
use crate::identity::IdentityTable;
use crate::request::{RequestError, RequestParser};
use crate::response::{BodyKind, dispatch};
use crate::scanner::{Span, next_span, run_script};
use crate::store::ContentStore;
use crate::transport::{Transport, TransportError, send_chunk};

/// Protocol state of a connection
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Reading the request line and headers
    Parsing,
    /// Request parsed, response not yet chosen
    Dispatching,
    /// Sending the response head and body
    Streaming,
    /// Response finished or refused, close requested
    Closing,
    /// Closed by the peer
    Closed,
    /// Reset by the peer or the stack, or after a send failure
    Aborted,
    /// Idle for too long
    TimedOut,
}

impl State {
    /// True once the connection will make no further progress
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Closing | Self::Closed | Self::Aborted | Self::TimedOut
        )
    }
}

/// Errors that end a connection.  Store and script failures are absorbed within the response and
/// never appear here.
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionError {
    /// Malformed or unsupported request; the connection was closed without a response
    ProtocolError(&'static str),
    /// Script output exceeded the output buffer; the response was cut short
    BufferOverflow(BufferOverflow),
    /// Too many idle polls; the connection was aborted
    PeerTimeout,
    /// The transport refused data; the connection was aborted
    PeerAbort,
}

impl From<BufferOverflow> for ConnectionError {
    fn from(value: BufferOverflow) -> Self {
        Self::BufferOverflow(value)
    }
}

impl From<TransportError> for ConnectionError {
    fn from(_: TransportError) -> Self {
        Self::PeerAbort
    }
}

/// Shared server resources lent to a connection for the duration of one event.
pub(crate) struct Context<'a, S, E, K, const SLOTS: usize>
where
    E: ScriptEngine,
{
    pub(crate) store: &'a mut S,
    pub(crate) engine: &'a mut E,
    pub(crate) table: &'a mut IdentityTable<K, E::Instance, SLOTS>,
    pub(crate) config: &'a Config,
}

pub(crate) struct Connection<K, H, const OUT: usize> {
    peer: K,
    state: State,
    parser: RequestParser,
    idle_polls: u8,

    head: heapless::String<MAX_HEAD_LEN>,
    head_sent: usize,

    body: BodyKind,
    content: Option<H>,
    pos: usize,
    fresh: bool,

    output: [u8; OUT],
    output_len: usize,
    output_sent: usize,
}

impl<K, H, const OUT: usize> Connection<K, H, OUT>
where
    K: PartialEq + Clone,
{
    pub(crate) fn new(peer: K, config: &Config) -> Self {
        Self {
            peer,
            state: State::Parsing,
            parser: RequestParser::new(config.index),
            idle_polls: 0,
            head: heapless::String::new(),
            head_sent: 0,
            body: BodyKind::Verbatim,
            content: None,
            pos: 0,
            fresh: false,
            output: [0u8; OUT],
            output_len: 0,
            output_sent: 0,
        }
    }

    pub(crate) fn state(&self) -> State {
        self.state
    }

    /// Feed request bytes.  Returns how many were consumed; data arriving after the request has
    /// been parsed is ignored.
    pub(crate) fn on_data<S, E, T, const SLOTS: usize>(
        &mut self,
        data: &[u8],
        ctx: &mut Context<'_, S, E, K, SLOTS>,
        transport: &mut T,
    ) -> Result<usize, ConnectionError>
    where
        S: ContentStore<Handle = H>,
        E: ScriptEngine,
        T: Transport,
    {
        if self.parser.is_done() || self.state.is_terminal() {
            return Ok(0);
        }
        self.idle_polls = 0;

        match self.parser.feed(data) {
            Ok(consumed) => {
                debug!("request for {}", self.parser.request().path.as_str());
                self.state = State::Dispatching;
                self.advance(ctx, transport)?;
                Ok(consumed)
            }
            Err(RequestError::Incomplete) => Ok(data.len()),
            Err(RequestError::ProtocolError(e)) => {
                warn!("closing connection: {}", e);
                self.finish(ctx, transport);
                Err(ConnectionError::ProtocolError(e))
            }
        }
    }

    /// Periodic poll.  Continues a response in progress; counts polls that get nothing done and
    /// aborts the connection once `config.max_idle_polls` of them happen in a row.
    pub(crate) fn on_poll<S, E, T, const SLOTS: usize>(
        &mut self,
        ctx: &mut Context<'_, S, E, K, SLOTS>,
        transport: &mut T,
    ) -> Result<(), ConnectionError>
    where
        S: ContentStore<Handle = H>,
        E: ScriptEngine,
        T: Transport,
    {
        let progress = match self.state {
            State::Dispatching | State::Streaming => self.advance(ctx, transport)?,
            _ => false,
        };

        if progress {
            self.idle_polls = 0;
            return Ok(());
        }

        if self.state.is_terminal() {
            return Ok(());
        }

        self.idle_polls = self.idle_polls.saturating_add(1);
        if self.idle_polls >= ctx.config.max_idle_polls {
            info!("connection idle for {} polls, aborting", self.idle_polls);
            transport.abort();
            self.teardown(ctx, State::TimedOut);
            return Err(ConnectionError::PeerTimeout);
        }

        Ok(())
    }

    /// The transport reports the connection gone: closed by the peer, reset, or timed out by the
    /// stack.  The peer's identity slot is left alone.
    pub(crate) fn on_gone<S, E, const SLOTS: usize>(
        &mut self,
        ctx: &mut Context<'_, S, E, K, SLOTS>,
        state: State,
    ) where
        S: ContentStore<Handle = H>,
        E: ScriptEngine,
    {
        if !self.state.is_terminal() {
            self.teardown(ctx, state);
        }
    }

    /// Do one unit of work.  Returns whether any progress was made.  Errors have already torn the
    /// connection down when they are returned.
    fn advance<S, E, T, const SLOTS: usize>(
        &mut self,
        ctx: &mut Context<'_, S, E, K, SLOTS>,
        transport: &mut T,
    ) -> Result<bool, ConnectionError>
    where
        S: ContentStore<Handle = H>,
        E: ScriptEngine,
        T: Transport,
    {
        if self.state == State::Dispatching {
            self.dispatch(ctx);
        }

        match self.stream(ctx, transport) {
            Ok(progress) => Ok(progress),
            Err(ConnectionError::BufferOverflow(e)) => {
                error!("script output exceeded {} bytes, response truncated", e.capacity);
                self.output_len = 0;
                self.output_sent = 0;
                self.finish(ctx, transport);
                Err(ConnectionError::BufferOverflow(e))
            }
            Err(e) => {
                transport.abort();
                self.teardown(ctx, State::Aborted);
                Err(e)
            }
        }
    }

    fn dispatch<S, E, const SLOTS: usize>(&mut self, ctx: &mut Context<'_, S, E, K, SLOTS>)
    where
        S: ContentStore<Handle = H>,
        E: ScriptEngine,
    {
        let resp = dispatch(ctx.store, self.parser.request().path.as_str(), ctx.config);

        write_head(&mut self.head, resp.status, resp.content_type);
        self.head_sent = 0;
        self.body = resp.body;
        self.content = resp.content;
        self.pos = 0;
        self.fresh = resp.body == BodyKind::FullScript;
        self.state = State::Streaming;
    }

    fn stream<S, E, T, const SLOTS: usize>(
        &mut self,
        ctx: &mut Context<'_, S, E, K, SLOTS>,
        transport: &mut T,
    ) -> Result<bool, ConnectionError>
    where
        S: ContentStore<Handle = H>,
        E: ScriptEngine,
        T: Transport,
    {
        if self.head_sent < self.head.len() {
            let n = send_chunk(transport, &self.head.as_bytes()[self.head_sent..])?;
            self.head_sent += n;
            return Ok(n > 0);
        }

        if self.output_sent < self.output_len {
            let n = self.send_output(transport)?;
            return Ok(n > 0);
        }

        let body = match self.content.as_ref() {
            Some(handle) => ctx.store.bytes(handle),
            None => &[],
        };

        if self.pos >= body.len() {
            self.finish(ctx, transport);
            return Ok(true);
        }

        let (source, end) = match self.body {
            BodyKind::Verbatim => {
                let n = send_chunk(transport, &body[self.pos..])?;
                self.pos += n;
                return Ok(n > 0);
            }
            BodyKind::FullScript => (self.pos..body.len(), body.len()),
            BodyKind::Tagged => match next_span(body, self.pos, &ctx.config.markers) {
                Some(Span::Literal(literal)) => {
                    let n = send_chunk(transport, &body[literal])?;
                    self.pos += n;
                    return Ok(n > 0);
                }
                Some(Span::Script { source, end }) => (source, end),
                None => {
                    self.finish(ctx, transport);
                    return Ok(true);
                }
            },
        };

        // the cursor moves past the script before it runs: a failing script is never retried
        self.pos = end;

        let params = Params::new(self.parser.request().query.as_str());
        self.output_len = run_script(
            ctx.engine,
            ctx.table,
            &self.peer,
            &mut self.fresh,
            &body[source],
            &params,
            &mut self.output,
        )?;
        self.output_sent = 0;

        // one script per event; its first segment goes out with it
        if self.output_len > 0 {
            self.send_output(transport)?;
        }
        Ok(true)
    }

    fn send_output<T: Transport>(&mut self, transport: &mut T) -> Result<usize, TransportError> {
        let n = send_chunk(transport, &self.output[self.output_sent..self.output_len])?;
        self.output_sent += n;
        if self.output_sent == self.output_len {
            self.output_len = 0;
            self.output_sent = 0;
        }
        Ok(n)
    }

    /// Response complete or refused: ask for a graceful close and drop per-response state.
    fn finish<S, E, T, const SLOTS: usize>(
        &mut self,
        ctx: &mut Context<'_, S, E, K, SLOTS>,
        transport: &mut T,
    ) where
        S: ContentStore<Handle = H>,
        E: ScriptEngine,
        T: Transport,
    {
        transport.close();
        self.teardown(ctx, State::Closing);
    }

    fn teardown<S, E, const SLOTS: usize>(
        &mut self,
        ctx: &mut Context<'_, S, E, K, SLOTS>,
        state: State,
    ) where
        S: ContentStore<Handle = H>,
        E: ScriptEngine,
    {
        if let Some(handle) = self.content.take() {
            ctx.store.release(handle);
        }
        self.output_len = 0;
        self.output_sent = 0;
        self.state = state;
    }
}
