use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

use crate::{state::ClientState, Error};

/// Fixed set of client slots, each bound to at most one transport name.
pub struct ClientTable<const MAX: usize, const N: usize> {
    lock: Mutex<CriticalSectionRawMutex, ()>,
    clients: [ClientState<N>; MAX],
}

impl<const MAX: usize, const N: usize> Default for ClientTable<MAX, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const MAX: usize, const N: usize> ClientTable<MAX, N> {
    const INIT: ClientState<N> = ClientState::new();

    pub const fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            clients: [Self::INIT; MAX],
        }
    }

    /// Bind a free slot to the transport `name`.
    pub fn init(&self, name: &'static str) -> Result<&ClientState<N>, Error> {
        self.lock.lock(|_| {
            if self.get(name).is_some() {
                error!("AT client on device {} already initialized", name);
                return Err(Error::AlreadyBound);
            }

            let client = self
                .clients
                .iter()
                .find(|client| client.try_bind(name))
                .ok_or_else(|| {
                    error!(
                        "AT client initialize failed! Clients count({}) is maximum",
                        MAX
                    );
                    Error::TableFull
                })?;

            info!("AT client on device {} initialize success", name);
            Ok(client)
        })
    }

    /// Client bound to the transport `name`
    pub fn get(&self, name: &str) -> Option<&ClientState<N>> {
        self.clients.iter().find(|client| client.name() == Some(name))
    }

    /// First client ever bound
    pub fn first(&self) -> Option<&ClientState<N>> {
        self.clients.first().filter(|client| client.name().is_some())
    }
}
