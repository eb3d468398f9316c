//! # Scriptlite
//!
//! `scriptlite` is a small HTTP/1.0 server core for `no_std` and `no_alloc` devices that serves
//! static files and pages with embedded scripts.  It does no I/O itself: the TCP stack calls into
//! a [`server::Server`] as things happen on its connections, and the server answers through a
//! [`transport::Transport`] one segment at a time.
//!
//! This crate provides:
//!
//! * a tolerant `GET` request parser.
//! * dispatch of request paths to resources in a [`store::ContentStore`], with a not-found
//!   fallback.
//! * three body kinds chosen by resource extension: verbatim files, full-page scripts and
//!   tag-interleaved pages where marker delimited regions are replaced by script output.
//! * a per-peer table of script engine instances, so state set by one request is seen by the
//!   next request from the same address.
//!
//! This crate does **not** provide:
//!
//! * a script interpreter.  Implement [`engine::ScriptEngine`] over the interpreter of your
//!   choice.
//! * keep-alive, chunked encoding, request bodies or any method other than `GET`.
//!
//! ## Basic Use
//!
//! With an event-driven stack (uIP, lwIP raw API, smoltcp polling loops) call
//! `Server::on_connected()` when a peer connects and keep the returned `ConnectionId`.  Forward
//! received bytes to `on_data()`, the stack's periodic and sent callbacks to `on_poll()`, and
//! close, reset and timeout notifications to `on_closed()`, `on_aborted()` and
//! `on_timed_out()`.
//!
//! With an async socket (anything that implements `embedded_io_async::{Read, Write}`) call
//! `serve()` for each accepted connection.
//!
//! ## Example
//!
//! ```
//! # use tokio;
//! # use embedded_io_async::{Read, Write};
//! use core::net::{IpAddr, Ipv4Addr};
//!
//! use scriptlite::config::Config;
//! use scriptlite::engine::{Params, ScriptEngine, ScriptError, ScriptOutput};
//! use scriptlite::server::Server;
//! use scriptlite::store::StaticStore;
//!
//! static FILES: [(&str, &[u8]); 2] = [
//!     ("/index.pht", b"<p>Hello <?lua world ?></p>"),
//!     ("/404.html", b"Not Found"),
//! ];
//!
//! /// Prints the source of every script back
//! struct Echo;
//!
//! impl ScriptEngine for Echo {
//!     type Instance = ();
//!
//!     fn create_instance(&mut self) -> Result<(), ScriptError> {
//!         Ok(())
//!     }
//!
//!     fn destroy_instance(&mut self, _instance: ()) {}
//!
//!     fn execute(
//!         &mut self,
//!         _instance: &mut (),
//!         source: &[u8],
//!         _params: &Params<'_>,
//!         output: &mut ScriptOutput<'_>,
//!     ) -> Result<(), ScriptError> {
//!         output.write(source)?;
//!         Ok(())
//!     }
//! }
//!
//! # struct Client<'a> {
//! #     reader: &'a [u8],
//! #     writer: &'a mut [u8],
//! # }
//! #
//! # impl<'a> embedded_io_async::ErrorType for Client<'a> {
//! #     type Error = embedded_io_async::ErrorKind;
//! # }
//! #
//! # impl<'a> embedded_io_async::Read for Client<'a> {
//! #     async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
//! #         match self.reader.read(buf).await {
//! #             Ok(n) => Ok(n),
//! #             Err(_) => Err(embedded_io_async::ErrorKind::Other),
//! #         }
//! #     }
//! # }
//! #
//! # impl<'a> embedded_io_async::Write for Client<'a> {
//! #     async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
//! #         match self.writer.write(buf).await {
//! #             Ok(n) => Ok(n),
//! #             Err(_) => Err(embedded_io_async::ErrorKind::Other),
//! #         }
//! #     }
//! # }
//! #
//! async fn run_server() {
//!     let request = b"GET /index.pht HTTP/1.0\r\n\r\n";
//!     let mut response = [0u8; 256];
//!
//!     // Client implements embedded_io_async::{Read, Write} (not shown)
//!     // this would typically be a TCP socket, e.g. embassy_net::tcp::TcpSocket
//!     let mut client = Client {
//!         reader: request.as_slice(),
//!         writer: response.as_mut_slice(),
//!     };
//!     let peer = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));
//!
//!     // 2 connections, 4 peers with engine instances, 128 byte script output buffers
//!     let mut server: Server<_, _, 2, 4, 128> =
//!         Server::new(Config::default().with_index("/index.pht"), StaticStore::new(&FILES), Echo);
//!
//!     let mut tx_buf = [0u8; 64];
//!     if server.serve(peer, &mut client, &mut tx_buf).await.is_err() {
//!         // handle error
//!     }
//! }
//! #
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! #     run_server().await;
//! # })
//! ```

#![no_std]
#![warn(missing_docs)]

#[macro_use]
mod fmt;

mod ascii;
pub mod config;
pub mod connection;
pub mod engine;
/// HTTP Headers
pub mod header;
pub mod identity;
/// HTTP Requests
pub mod request;
/// Resource dispatch
pub mod response;
pub mod scanner;
/// HTTP server
pub mod server;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;
