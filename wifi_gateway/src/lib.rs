//! WiFi connection manager and Modbus-TCP gateway for an ESP8266 class
//! module driven over AT commands.
//!
//! The pieces, and the threads they run on:
//!
//! - [`State`] is the URC handler of the module's [`at_client::Parser`]. It
//!   owns the session pool and is updated from the parser thread as links
//!   connect, receive data and close.
//! - [`WifiRunner`] owns the power and reset lines and walks the module
//!   through bring-up. Once the module listens, every iteration feeds the
//!   chunks buffered per session to a [`SessionProcessor`] and sends back its
//!   answer.
//! - [`WifiDevice`] is the handle given to the rest of the firmware, to send
//!   on a session or request a reset.
//!
//! ### Example
//! ```ignore
//! use at_client::{Client, ClientTable, Config, Parser};
//! use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};
//! use wifi_gateway::{
//!     ModbusTcpGateway, State, SystemClock, WifiConfig, WifiDevice, WifiRunner, RESP_BUF_LEN,
//!     URC_TABLE,
//! };
//!
//! static CLIENTS: ClientTable<1, RESP_BUF_LEN> = ClientTable::new();
//! static STATE: State<SystemClock> =
//!     State::new(SystemClock, WifiConfig::new().credentials("plant-floor", "s3cret"));
//!
//! let client_state = CLIENTS.init("uart2")?;
//! let mut line_buf = [0u8; 256];
//! let mut parser = Parser::new(rx, client_state, &STATE, &mut line_buf, Config::new());
//! parser.set_urc_table(URC_TABLE);
//! // Spawn `parser.run()` on its own thread.
//!
//! let at = Mutex::<CriticalSectionRawMutex, _>::new(Client::new(tx, client_state, Config::new()));
//! let device = WifiDevice::new(&STATE, &at);
//! let mut runner = WifiRunner::new(device, power_pin, reset_pin, ModbusTcpGateway::new(REGISTERS));
//! // Spawn `runner.run()` on its own thread.
//! ```
//!
//! # Optional Cargo Features
//!
//! - **`log`** *(disabled by default)* — Logs through the `log` crate.
//! - **`defmt`** *(disabled by default)* — Logs through `defmt` instead.

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod config;
mod device;
mod error;
mod events;
pub mod gateway;
mod runner;
mod session;
mod state;
pub mod tick;
mod urc;

#[cfg(test)]
mod test_helpers;

pub use self::config::{Credentials, WifiConfig};
pub use self::device::WifiDevice;
pub use self::error::{Error, GatewayError};
pub use self::gateway::{ModbusTcpGateway, RegisterSource, SessionProcessor};
pub use self::runner::WifiRunner;
pub use self::session::{
    SessionId, SessionState, MAX_SESSIONS, SESSION_BLOCK_COUNT, SESSION_BLOCK_SIZE,
};
pub use self::state::{Diagnostics, SessionInfo, State, WifiState};
pub use self::tick::{Clock, SystemClock, Tick};
pub use self::urc::{WifiUrc, URC_TABLE};

/// Largest payload handed to the module in one `AT+CIPSEND`
pub const MAX_SEND_CHUNK: usize = 2048;

/// Response buffer size of the AT client driving the module
pub const RESP_BUF_LEN: usize = 512;
