//! A line-oriented AT command client for serial radio modules.
//!
//! The client is split in two halves that share a [`ClientState`]:
//!
//! - [`Client`] owns the transmit side of the transport. It formats and sends
//!   one CRLF terminated command at a time and, when a [`Response`] is given,
//!   blocks until the response completes, fails or times out.
//! - [`Parser`] owns the receive side. It runs on its own thread, turns the
//!   byte stream into lines and routes every line either to a URC handler or
//!   to the response that is currently pending.
//!
//! URCs (unsolicited result codes) are described by an ordered table of
//! [`Urc`] entries, each matching a line by prefix and suffix. The first
//! matching entry wins and its handler runs synchronously on the parser
//! thread. A handler may pull a declared-length binary payload that follows
//! the URC through [`RawReceive::recv_raw`].
//!
//! ### Example
//! ```ignore
//! use at_client::{AtClient, Client, ClientTable, Config, NoopUrcHandler, Parser, Response};
//! use embassy_time::Duration;
//!
//! static CLIENTS: ClientTable<2, 512> = ClientTable::new();
//!
//! let state = CLIENTS.init("uart2")?;
//! let mut line_buf = [0u8; 256];
//! let mut parser = Parser::new(rx, state, &NoopUrcHandler, &mut line_buf, Config::new());
//! // Spawn `parser.run()` on a dedicated thread, then:
//! let mut client = Client::new(tx, state, Config::new());
//! let mut resp = Response::<512>::new(0, Duration::from_millis(500));
//! client.exec_command(Some(&mut resp), format_args!("AT+GMR"))?;
//! for line in resp.lines() {
//!     // ...
//! }
//! ```
//!
//! # Optional Cargo Features
//!
//! - **`log`** *(disabled by default)* — Logs through the `log` crate,
//!   including outgoing commands and incoming lines on the `DEBUG`/`TRACE`
//!   levels.
//! - **`defmt`** *(disabled by default)* — Logs through `defmt` instead.

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod client;
mod config;
mod error;
pub mod helpers;
mod parser;
mod response;
mod state;
mod table;
mod timer;
mod traits;
mod urc;

#[cfg(test)]
mod test_helpers;

pub use self::client::Client;
pub use self::config::Config;
pub use self::error::Error;
pub use self::parser::Parser;
pub use self::response::{LineArgs, Response, ResponseStatus};
pub use self::state::{ClientState, Status};
pub use self::table::ClientTable;
pub use self::traits::AtClient;
pub use self::urc::{NoopUrcHandler, RawReceive, Urc, UrcHandler};

pub use embassy_time::Duration;

/// Maximum length of a single formatted command line, excluding CRLF.
pub const AT_CMD_MAX_LEN: usize = 128;
