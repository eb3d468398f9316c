use core::net::IpAddr;

use embedded_io_async::{Read, Write};

use crate::config::Config;
use crate::connection::{Connection, ConnectionError, Context, State};
use crate::engine::ScriptEngine;
use crate::fmt::Dbg;
use crate::identity::IdentityTable;
use crate::store::ContentStore;
use crate::transport::{StagedTransport, Transport};

/// Size of the output buffer each connection uses to capture script output, unless the `OUT`
/// parameter of [`Server`] says otherwise
pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 1024;

/// Identifies a connection for as long as it is open.  Ids of finished connections are not
/// reused: the same arena slot hands out a new id each time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionId {
    index: usize,
    generation: u32,
}

#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// ServerError is returned by the `Server` event methods.  Any variant other than
/// `NoCapacity` and `UnknownConnection` means the connection has been finished.
pub enum ServerError {
    /// Every connection slot is in use; the new connection should be refused
    NoCapacity,
    /// The id does not name an open connection
    UnknownConnection,
    /// Error on the connection
    ConnectionError(ConnectionError),
    /// Reading from or writing to the socket failed (async driver only)
    NetworkError,
}

impl From<ConnectionError> for ServerError {
    fn from(value: ConnectionError) -> Self {
        Self::ConnectionError(value)
    }
}

/// Server is the main struct to be used by users of the crate.  It owns the content store, the
/// script engine, the peer identity table and a fixed arena of `CONNS` connections, and is driven
/// by the TCP stack through the `on_*` event methods (or, for async socket APIs, by
/// [`Server::serve`]).
///
/// `SLOTS` is the number of peers whose engine instances are kept, `OUT` the per connection
/// script output buffer size.
pub struct Server<S, E, const CONNS: usize, const SLOTS: usize, const OUT: usize = DEFAULT_OUTPUT_BUFFER_SIZE>
where
    S: ContentStore,
    E: ScriptEngine,
{
    config: Config,
    store: S,
    engine: E,
    table: IdentityTable<IpAddr, E::Instance, SLOTS>,
    connections: [Option<Connection<IpAddr, S::Handle, OUT>>; CONNS],
    generations: [u32; CONNS],
}

impl<S, E, const CONNS: usize, const SLOTS: usize, const OUT: usize> Server<S, E, CONNS, SLOTS, OUT>
where
    S: ContentStore,
    E: ScriptEngine,
{
    /// Construct a Server serving resources from `store` and running scripts on `engine`
    pub fn new(config: Config, store: S, engine: E) -> Self {
        Self {
            config,
            store,
            engine,
            table: IdentityTable::new(),
            connections: core::array::from_fn(|_| None),
            generations: [0; CONNS],
        }
    }

    /// The configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The content store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The script engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The script engine, e.g. to register host functions between requests
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// The peer identity table
    pub fn identities(&self) -> &IdentityTable<IpAddr, E::Instance, SLOTS> {
        &self.table
    }

    /// State of an open connection, `None` once it has finished
    pub fn state(&self, id: ConnectionId) -> Option<State> {
        self.get(id).map(|c| c.state())
    }

    /// Number of open connections
    pub fn active_connections(&self) -> usize {
        self.connections.iter().filter(|c| c.is_some()).count()
    }

    /// A peer connected.  Allocates the connection and assigns the peer an identity slot,
    /// destroying the engine instance of any peer evicted to make room.
    pub fn on_connected(&mut self, peer: IpAddr) -> Result<ConnectionId, ServerError> {
        let index = match self.connections.iter().position(|c| c.is_none()) {
            Some(i) => i,
            None => {
                warn!("refusing connection from {}: no free slots", Dbg(&peer));
                return Err(ServerError::NoCapacity);
            }
        };

        let assignment = self.table.lookup_or_assign(&peer);
        if let Some(evicted) = assignment.evicted {
            debug!("evicted engine instance from slot {}", assignment.slot);
            self.engine.destroy_instance(evicted);
        }

        self.generations[index] = self.generations[index].wrapping_add(1);
        self.connections[index] = Some(Connection::new(peer, &self.config));
        info!(
            "connection {} from {} (identity slot {})",
            index,
            Dbg(&peer),
            assignment.slot
        );

        Ok(ConnectionId {
            index,
            generation: self.generations[index],
        })
    }

    /// Request data arrived.  Returns how many bytes were consumed.  Once the request has been
    /// parsed the response is started on `transport` immediately.
    pub fn on_data<T: Transport>(
        &mut self,
        id: ConnectionId,
        data: &[u8],
        transport: &mut T,
    ) -> Result<usize, ServerError> {
        self.with_connection(id, |conn, ctx| conn.on_data(data, ctx, transport))
    }

    /// The stack polled an otherwise idle connection, or acknowledged data and can take more.
    pub fn on_poll<T: Transport>(
        &mut self,
        id: ConnectionId,
        transport: &mut T,
    ) -> Result<(), ServerError> {
        self.with_connection(id, |conn, ctx| conn.on_poll(ctx, transport))
    }

    /// The peer closed the connection
    pub fn on_closed(&mut self, id: ConnectionId) {
        self.gone(id, State::Closed);
    }

    /// The connection was reset
    pub fn on_aborted(&mut self, id: ConnectionId) {
        self.gone(id, State::Aborted);
    }

    /// The stack gave up on the connection
    pub fn on_timed_out(&mut self, id: ConnectionId) {
        self.gone(id, State::TimedOut);
    }

    /// Tear down every open connection and destroy every engine instance
    pub fn shutdown(&mut self) {
        let mut ctx = Context {
            store: &mut self.store,
            engine: &mut self.engine,
            table: &mut self.table,
            config: &self.config,
        };

        for slot in self.connections.iter_mut() {
            if let Some(mut conn) = slot.take() {
                conn.on_gone(&mut ctx, State::Aborted);
            }
        }

        let engine = &mut self.engine;
        self.table.clear(|instance| engine.destroy_instance(instance));
    }

    /// Serve one connection over an async socket until the response is complete.  Each segment is
    /// staged in `tx_buf`, whose length acts as the MSS, and then written to `client`.
    ///
    /// The result is `Ok(())` when the response was sent or the client went away before asking
    /// for anything.  Any `Err(_)` variant should be handled by disconnecting the client.
    pub async fn serve<C>(
        &mut self,
        peer: IpAddr,
        client: &mut C,
        tx_buf: &mut [u8],
    ) -> Result<(), ServerError>
    where
        C: Read + Write,
    {
        let id = self.on_connected(peer)?;
        let mut rx_buf = [0u8; 64];

        loop {
            let mut staged = StagedTransport::new(tx_buf);

            let res = match self.state(id) {
                None => return Ok(()),
                Some(State::Parsing) => match client.read(&mut rx_buf).await {
                    Ok(0) => {
                        self.on_closed(id);
                        return Ok(());
                    }
                    Ok(n) => self.on_data(id, &rx_buf[..n], &mut staged).map(|_| ()),
                    Err(_) => {
                        self.on_aborted(id);
                        return Err(ServerError::NetworkError);
                    }
                },
                Some(_) => self.on_poll(id, &mut staged),
            };

            if !staged.staged().is_empty() && client.write_all(staged.staged()).await.is_err() {
                self.on_aborted(id);
                return Err(ServerError::NetworkError);
            }

            if staged.is_closed() && !staged.is_aborted() && client.flush().await.is_err() {
                return Err(ServerError::NetworkError);
            }

            res?;
        }
    }

    fn get(&self, id: ConnectionId) -> Option<&Connection<IpAddr, S::Handle, OUT>> {
        if self.generations.get(id.index) != Some(&id.generation) {
            return None;
        }
        self.connections.get(id.index)?.as_ref()
    }

    fn with_connection<R>(
        &mut self,
        id: ConnectionId,
        f: impl FnOnce(
            &mut Connection<IpAddr, S::Handle, OUT>,
            &mut Context<'_, S, E, IpAddr, SLOTS>,
        ) -> Result<R, ConnectionError>,
    ) -> Result<R, ServerError> {
        if self.generations.get(id.index) != Some(&id.generation) {
            return Err(ServerError::UnknownConnection);
        }

        let slot = self
            .connections
            .get_mut(id.index)
            .ok_or(ServerError::UnknownConnection)?;
        let conn = slot.as_mut().ok_or(ServerError::UnknownConnection)?;

        let mut ctx = Context {
            store: &mut self.store,
            engine: &mut self.engine,
            table: &mut self.table,
            config: &self.config,
        };

        let res = f(conn, &mut ctx);

        if conn.state().is_terminal() {
            debug!("connection {} finished: {}", id.index, conn.state());
            *slot = None;
        }

        res.map_err(ServerError::from)
    }

    /// Transport side teardown.  Ids that are no longer open are ignored: the stack commonly
    /// reports the close that the server itself asked for.
    fn gone(&mut self, id: ConnectionId, state: State) {
        let _ = self.with_connection(id, |conn, ctx| {
            conn.on_gone(ctx, state);
            Ok(())
        });
    }
}

impl<S, E, const CONNS: usize, const SLOTS: usize, const OUT: usize> Drop
    for Server<S, E, CONNS, SLOTS, OUT>
where
    S: ContentStore,
    E: ScriptEngine,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::collections::VecDeque;
    use std::vec::Vec;

    use core::net::Ipv4Addr;

    use embedded_io_async::{ErrorKind, ErrorType};

    use super::*;
    use crate::engine::BufferOverflow;
    use crate::store::StaticStore;
    use crate::testing::{RecordingTransport, ToyEngine};

    static LOGO: [u8; 2500] = [0x42; 2500];

    static FILES: [(&str, &[u8]); 11] = [
        ("/index.lua", b"print home"),
        ("/two.pht", b"a<?lua n=1 ?>b<?lua get n ?>c"),
        ("/quiet.pht", b"<?lua fail ?><?lua fail ?><?lua print z ?>"),
        ("/counter.lua", b"get n;n=1"),
        ("/set.pht", b"a<?lua n=7 ?>b"),
        ("/get.pht", b"[<?lua get n ?>]"),
        ("/param.pht", b"<?lua param name ?>!"),
        ("/broken.pht", b"<<?lua fail ?>>"),
        ("/loud.pht", b"x<?lua print 0123456789abcdefghij ?>y"),
        ("/logo.png", &LOGO),
        ("/404.html", b"missing"),
    ];

    type TestServer = Server<StaticStore, ToyEngine, 4, 2, 16>;

    fn server() -> TestServer {
        Server::new(Config::default(), StaticStore::new(&FILES), ToyEngine::default())
    }

    fn peer(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, n))
    }

    /// Poll until the connection finishes, returning the first error
    fn drive(server: &mut TestServer, id: ConnectionId, t: &mut RecordingTransport) -> Result<(), ServerError> {
        for _ in 0..100 {
            if server.state(id).is_none() {
                return Ok(());
            }
            server.on_poll(id, t)?;
        }
        panic!("connection never finished");
    }

    fn get(server: &mut TestServer, from: IpAddr, path: &str, mss: usize) -> RecordingTransport {
        let mut t = RecordingTransport::new(mss);
        let id = server.on_connected(from).unwrap();
        let req = std::format!("GET {} HTTP/1.0\r\nHost: device\r\n\r\n", path);
        server.on_data(id, req.as_bytes(), &mut t).unwrap();
        drive(server, id, &mut t).unwrap();
        assert!(t.closed);
        t
    }

    #[test]
    fn test_static_resource_sent_in_segments() {
        let mut server = server();
        let t = get(&mut server, peer(1), "/logo.png", 1000);

        let head = "HTTP/1.0 200 OK\r\nContent-Type: image/png\r\n\r\n";
        assert!(t.sent_str().starts_with(head));
        assert_eq!(t.body(), &LOGO[..]);
        assert_eq!(t.segments, [head.len(), 1000, 1000, 500]);
        assert_eq!(server.active_connections(), 0);
        assert_eq!(server.engine().created, 0);
    }

    #[test]
    fn test_index_and_not_found() {
        let mut server = server();

        let t = get(&mut server, peer(1), "/", 1460);
        assert_eq!(t.sent_str(), "HTTP/1.0 200 OK\r\nContent-Type: text/html\r\n\r\nhome");

        let t = get(&mut server, peer(1), "/nope.html", 1460);
        assert_eq!(
            t.sent_str(),
            "HTTP/1.0 404 Not Found\r\nContent-Type: text/html\r\n\r\nmissing"
        );

        // a query makes the target the resource `/`, not the index
        let t = get(&mut server, peer(1), "/?a=1", 1460);
        assert_eq!(
            t.sent_str(),
            "HTTP/1.0 404 Not Found\r\nContent-Type: text/html\r\n\r\nmissing"
        );
    }

    #[test]
    fn test_not_found_without_404_resource() {
        let config = Config::default().with_not_found("/gone.html");
        let mut server: TestServer = Server::new(config, StaticStore::new(&FILES), ToyEngine::default());

        let t = get(&mut server, peer(1), "/nope.html", 1460);
        assert_eq!(t.sent_str(), "HTTP/1.0 404 Not Found\r\nContent-Type: text/html\r\n\r\n");
    }

    #[test]
    fn test_tagged_page_with_custom_markers() {
        static PAGE: [(&str, &[u8]); 1] = [("/t.pht", b"abc<?start x=1<?end>def")];
        let config = Config::default().with_markers(b"<?start", b"<?end>");
        let mut server: TestServer = Server::new(config, StaticStore::new(&PAGE), ToyEngine::default());

        let t = get(&mut server, peer(1), "/t.pht", 1460);
        assert_eq!(t.body(), b"abc1def");
    }

    #[test]
    fn test_query_params_reach_script() {
        let mut server = server();
        let t = get(&mut server, peer(1), "/param.pht?x=1&name=bob+smith", 1460);
        assert_eq!(t.body(), b"bob smith!");

        let t = get(&mut server, peer(1), "/param.pht", 1460);
        assert_eq!(t.body(), b"nil!");
    }

    #[test]
    fn test_script_failure_leaves_span_empty() {
        let mut server = server();
        let t = get(&mut server, peer(1), "/broken.pht", 1460);
        assert_eq!(t.body(), b"<>");
    }

    #[test]
    fn test_engine_create_failure_leaves_spans_empty() {
        let mut server = server();
        server.engine_mut().fail_create = true;

        let t = get(&mut server, peer(1), "/two.pht", 1460);
        assert_eq!(t.body(), b"abc");
        assert_eq!(server.engine().created, 0);
        assert_eq!(server.engine().executed, 0);
        assert!(server.identities().find(&peer(1)).is_some());
    }

    #[test]
    fn test_one_script_per_event() {
        let mut server = server();
        let mut t = RecordingTransport::new(1460);

        let id = server.on_connected(peer(1)).unwrap();
        server.on_data(id, b"GET /quiet.pht HTTP/1.0\r\n\r\n", &mut t).unwrap();
        assert_eq!(server.engine().executed, 0);

        for executed in 1..=3 {
            server.on_poll(id, &mut t).unwrap();
            assert_eq!(server.engine().executed, executed);
        }
        assert_eq!(t.body(), b"z");

        drive(&mut server, id, &mut t).unwrap();
        assert!(t.closed);
    }

    #[test]
    fn test_instance_persists_per_peer() {
        let mut server = server();

        assert_eq!(get(&mut server, peer(1), "/set.pht", 1460).body(), b"a7b");
        assert_eq!(get(&mut server, peer(1), "/get.pht", 1460).body(), b"[7]");
        assert_eq!(get(&mut server, peer(2), "/get.pht", 1460).body(), b"[nil]");
        assert_eq!(server.engine().created, 2);
        assert_eq!(server.engine().destroyed, 0);
    }

    #[test]
    fn test_full_script_resets_instance() {
        let mut server = server();

        assert_eq!(get(&mut server, peer(1), "/set.pht", 1460).body(), b"a7b");
        assert_eq!(get(&mut server, peer(1), "/counter.lua", 1460).body(), b"nil1");
        assert_eq!(get(&mut server, peer(1), "/counter.lua", 1460).body(), b"nil1");
        assert_eq!(get(&mut server, peer(1), "/get.pht", 1460).body(), b"[1]");
        assert_eq!(server.engine().created, 3);
        assert_eq!(server.engine().destroyed, 2);
    }

    #[test]
    fn test_identity_eviction() {
        let mut server = server();

        assert_eq!(get(&mut server, peer(1), "/set.pht", 1460).body(), b"a7b");
        get(&mut server, peer(2), "/index.lua", 1460);
        // a third peer takes the oldest slot, dropping the first peer's state
        get(&mut server, peer(3), "/logo.png", 1460);
        assert_eq!(server.engine().destroyed, 1);
        assert_eq!(server.identities().find(&peer(1)), None);

        assert_eq!(get(&mut server, peer(1), "/get.pht", 1460).body(), b"[nil]");
    }

    #[test]
    fn test_overflow_truncates_only_its_connection() {
        let mut server = server();

        let mut other = RecordingTransport::new(1460);
        let other_id = server.on_connected(peer(2)).unwrap();
        server.on_data(other_id, b"GET /get.pht HTTP/1.0\r\n", &mut other).unwrap();

        let mut t = RecordingTransport::new(1460);
        let id = server.on_connected(peer(1)).unwrap();
        server.on_data(id, b"GET /loud.pht HTTP/1.0\r\n\r\n", &mut t).unwrap();
        assert_eq!(
            drive(&mut server, id, &mut t),
            Err(ServerError::ConnectionError(ConnectionError::BufferOverflow(
                BufferOverflow { capacity: 16 }
            )))
        );
        assert!(t.closed);
        assert!(!t.aborted);
        assert_eq!(t.body(), b"x");
        assert_eq!(server.state(id), None);

        assert_eq!(server.state(other_id), Some(State::Parsing));
        server.on_data(other_id, b"\r\n", &mut other).unwrap();
        drive(&mut server, other_id, &mut other).unwrap();
        assert_eq!(other.body(), b"[nil]");
    }

    #[test]
    fn test_partial_sends() {
        let mut server = server();
        let mut t = RecordingTransport::new(8);
        t.window = 5;

        let id = server.on_connected(peer(1)).unwrap();
        server.on_data(id, b"GET /set.pht HTTP/1.0\r\n\r\n", &mut t).unwrap();
        drive(&mut server, id, &mut t).unwrap();

        assert_eq!(t.sent_str(), "HTTP/1.0 200 OK\r\nContent-Type: text/html\r\n\r\na7b");
        assert!(t.segments.iter().all(|&n| n <= 5));
    }

    #[test]
    fn test_idle_timeout() {
        let config = Config::default().with_max_idle_polls(3);
        let mut server: TestServer = Server::new(config, StaticStore::new(&FILES), ToyEngine::default());
        let mut t = RecordingTransport::new(1460);
        t.window = 0;

        let id = server.on_connected(peer(1)).unwrap();
        server.on_data(id, b"GET /set.pht HTTP/1.0\r\n\r\n", &mut t).unwrap();
        assert_eq!(server.on_poll(id, &mut t), Ok(()));
        assert_eq!(server.on_poll(id, &mut t), Ok(()));
        assert_eq!(
            server.on_poll(id, &mut t),
            Err(ServerError::ConnectionError(ConnectionError::PeerTimeout))
        );
        assert!(t.aborted);
        assert!(t.sent.is_empty());
        assert_eq!(server.state(id), None);
    }

    #[test]
    fn test_idle_timeout_without_request() {
        let config = Config::default().with_max_idle_polls(3);
        let mut server: TestServer = Server::new(config, StaticStore::new(&FILES), ToyEngine::default());
        let mut t = RecordingTransport::new(1460);

        let id = server.on_connected(peer(1)).unwrap();
        assert_eq!(server.on_poll(id, &mut t), Ok(()));
        assert_eq!(server.on_poll(id, &mut t), Ok(()));
        assert_eq!(server.state(id), Some(State::Parsing));
        assert_eq!(
            server.on_poll(id, &mut t),
            Err(ServerError::ConnectionError(ConnectionError::PeerTimeout))
        );
        assert!(t.aborted);
        assert!(t.sent.is_empty());
        assert_eq!(server.state(id), None);
    }

    #[test]
    fn test_progress_resets_idle_count() {
        let config = Config::default().with_max_idle_polls(2);
        let mut server: TestServer = Server::new(config, StaticStore::new(&FILES), ToyEngine::default());
        let mut t = RecordingTransport::new(1000);

        let id = server.on_connected(peer(1)).unwrap();
        server.on_data(id, b"GET /logo.png HTTP/1.0\r\n\r\n", &mut t).unwrap();
        for _ in 0..3 {
            t.window = 0;
            assert_eq!(server.on_poll(id, &mut t), Ok(()));
            t.window = usize::MAX;
            assert_eq!(server.on_poll(id, &mut t), Ok(()));
        }
        drive(&mut server, id, &mut t).unwrap();
        assert_eq!(t.body(), &LOGO[..]);
    }

    #[test]
    fn test_unsupported_method_closes_without_response() {
        let mut server = server();
        let mut t = RecordingTransport::new(1460);

        let id = server.on_connected(peer(1)).unwrap();
        let res = server.on_data(id, b"POST /index.lua HTTP/1.0\r\n\r\n", &mut t);
        assert!(matches!(
            res,
            Err(ServerError::ConnectionError(ConnectionError::ProtocolError(_)))
        ));
        assert!(t.closed);
        assert!(t.sent.is_empty());
        assert_eq!(server.state(id), None);
    }

    #[test]
    fn test_peer_close_mid_response() {
        let mut server = server();
        let mut t = RecordingTransport::new(1000);

        let id = server.on_connected(peer(1)).unwrap();
        server.on_data(id, b"GET /set.pht HTTP/1.0\r\n\r\n", &mut t).unwrap();
        server.on_closed(id);
        assert_eq!(server.state(id), None);
        assert_eq!(server.active_connections(), 0);

        // the identity slot outlives the connection
        assert!(server.identities().find(&peer(1)).is_some());
        server.on_aborted(id);
        server.on_timed_out(id);
    }

    #[test]
    fn test_send_failure_aborts() {
        let mut server = server();
        let mut t = RecordingTransport::new(1000);

        let id = server.on_connected(peer(1)).unwrap();
        server.on_data(id, b"GET /logo.png HTTP/1.0\r\n\r\n", &mut t).unwrap();
        t.closed = true;
        assert_eq!(
            server.on_poll(id, &mut t),
            Err(ServerError::ConnectionError(ConnectionError::PeerAbort))
        );
        assert!(t.aborted);
        assert_eq!(server.state(id), None);
    }

    #[test]
    fn test_connection_arena() {
        let mut server = server();
        let mut t = RecordingTransport::new(1460);

        let ids: Vec<ConnectionId> = (1..=4).map(|n| server.on_connected(peer(n)).unwrap()).collect();
        assert_eq!(server.on_connected(peer(5)), Err(ServerError::NoCapacity));

        server.on_closed(ids[1]);
        assert_eq!(server.active_connections(), 3);
        let reused = server.on_connected(peer(5)).unwrap();
        assert_ne!(reused, ids[1]);

        assert_eq!(server.on_data(ids[1], b"GET /", &mut t), Err(ServerError::UnknownConnection));
        assert_eq!(server.on_poll(ids[1], &mut t), Err(ServerError::UnknownConnection));
        assert_eq!(server.state(reused), Some(State::Parsing));
    }

    #[test]
    fn test_shutdown_destroys_instances() {
        let mut server = server();
        get(&mut server, peer(1), "/set.pht", 1460);
        get(&mut server, peer(2), "/set.pht", 1460);
        server.on_connected(peer(3)).unwrap();

        server.shutdown();
        assert_eq!(server.active_connections(), 0);
        assert_eq!(server.engine().destroyed, server.engine().created);
        assert!(server.identities().is_empty());
    }

    struct TestClient {
        reads: VecDeque<Vec<u8>>,
        written: Vec<u8>,
        flushed: bool,
    }

    impl TestClient {
        fn new(reads: &[&[u8]]) -> Self {
            Self {
                reads: reads.iter().map(|r| r.to_vec()).collect(),
                written: Vec::new(),
                flushed: false,
            }
        }
    }

    impl ErrorType for TestClient {
        type Error = ErrorKind;
    }

    impl Read for TestClient {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let Some(mut next) = self.reads.pop_front() else {
                return Ok(0);
            };
            if next.len() > buf.len() {
                let rest = next.split_off(buf.len());
                self.reads.push_front(rest);
            }
            buf[..next.len()].copy_from_slice(&next);
            Ok(next.len())
        }
    }

    impl Write for TestClient {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        async fn flush(&mut self) -> Result<(), Self::Error> {
            self.flushed = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_serve() {
        let mut server = server();
        let mut client = TestClient::new(&[
            b"GET /set.pht?a=b HTTP/1.1\r\nHost: device\r\nUser-Agent: a very long user agent string that does not fit in one read\r\n",
            b"\r\n",
        ]);
        let mut tx_buf = [0u8; 32];

        assert_eq!(server.serve(peer(1), &mut client, &mut tx_buf).await, Ok(()));
        assert_eq!(
            client.written,
            b"HTTP/1.0 200 OK\r\nContent-Type: text/html\r\n\r\na7b"
        );
        assert!(client.flushed);
        assert_eq!(server.active_connections(), 0);

        let mut client = TestClient::new(&[b"GET /get.pht HTTP/1.0\r\n\r\n"]);
        assert_eq!(server.serve(peer(1), &mut client, &mut tx_buf).await, Ok(()));
        assert!(client.written.ends_with(b"\r\n\r\n[7]"));
    }

    #[tokio::test]
    async fn test_serve_client_gone() {
        let mut server = server();
        let mut tx_buf = [0u8; 32];

        let mut client = TestClient::new(&[b"GET /index"]);
        assert_eq!(server.serve(peer(1), &mut client, &mut tx_buf).await, Ok(()));
        assert!(client.written.is_empty());

        let mut client = TestClient::new(&[b"DELETE / HTTP/1.0\r\n\r\n"]);
        let res = server.serve(peer(1), &mut client, &mut tx_buf).await;
        assert!(matches!(
            res,
            Err(ServerError::ConnectionError(ConnectionError::ProtocolError(_)))
        ));
        assert!(client.written.is_empty());
        assert_eq!(server.active_connections(), 0);
    }
}
