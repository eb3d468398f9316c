//! Transport interface.
//!
//! The TCP stack owns the sockets and calls into the [`Server`](crate::server::Server) when
//! something happens on a connection.  During such a call the server writes back through a
//! [`Transport`] bound to that connection, the way a uIP or lwIP raw-API application writes into
//! the stack's send buffer from its callback.

/// The stack refused data, typically because the connection has gone away
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportError;

/// Non-blocking byte sink of one TCP connection
pub trait Transport {
    /// Maximum segment size: the most bytes a single `send` will be offered
    fn mss(&self) -> usize;

    /// Queue `data` for sending.  Returns how many bytes were accepted, which may be fewer than
    /// offered (zero when the send window is full).
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Close the connection once queued data has been sent
    fn close(&mut self);

    /// Reset the connection immediately
    fn abort(&mut self);
}

/// Offer at most one segment of `data`
pub(crate) fn send_chunk<T: Transport>(transport: &mut T, data: &[u8]) -> Result<usize, TransportError> {
    let len = data.len().min(transport.mss());
    if len == 0 {
        return Ok(0);
    }

    let sent = transport.send(&data[..len])?;
    Ok(sent.min(len))
}

/// Transport staging one segment in a caller supplied buffer.  Used by the async driver, which
/// writes the staged bytes to the socket after each event.
pub(crate) struct StagedTransport<'a> {
    buf: &'a mut [u8],
    len: usize,
    closed: bool,
    aborted: bool,
}

impl<'a> StagedTransport<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            len: 0,
            closed: false,
            aborted: false,
        }
    }

    pub(crate) fn staged(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed || self.aborted
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted
    }
}

impl Transport for StagedTransport<'_> {
    fn mss(&self) -> usize {
        self.buf.len()
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if self.is_closed() {
            return Err(TransportError);
        }

        let n = data.len().min(self.buf.len() - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&data[..n]);
        self.len += n;
        Ok(n)
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}
