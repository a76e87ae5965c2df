//! Serial transport doubles for exercising the client and parser on std
//! threads.

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};

use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write};

#[derive(Debug)]
pub struct IoError;

impl embedded_io::Error for IoError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Transmit half that publishes every flushed command to a channel.
pub struct TxMock {
    buf: Vec<u8>,
    publisher: Sender<String>,
}

pub fn tx_mock() -> (TxMock, Receiver<String>) {
    let (publisher, subscriber) = channel();
    (
        TxMock {
            buf: Vec::new(),
            publisher,
        },
        subscriber,
    )
}

impl ErrorType for TxMock {
    type Error = IoError;
}

impl Write for TxMock {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        let sent = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        // The receiving side may already be gone at the end of a test
        self.publisher.send(sent).ok();
        Ok(())
    }
}

/// Receive half fed byte by byte from another thread. Reads block until data
/// arrives and fail once every feeder has been dropped.
pub struct RxPipe {
    rx: Receiver<u8>,
    peeked: Option<u8>,
}

pub fn rx_pipe() -> (Sender<u8>, RxPipe) {
    let (tx, rx) = channel();
    (tx, RxPipe { rx, peeked: None })
}

pub fn feed(tx: &Sender<u8>, bytes: &[u8]) {
    for b in bytes {
        tx.send(*b).ok();
    }
}

impl ErrorType for RxPipe {
    type Error = IoError;
}

impl Read for RxPipe {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        buf[0] = match self.peeked.take() {
            Some(b) => b,
            None => self.rx.recv().map_err(|_| IoError)?,
        };

        let mut n = 1;
        while n < buf.len() {
            match self.rx.try_recv() {
                Ok(b) => {
                    buf[n] = b;
                    n += 1;
                }
                Err(_) => break,
            }
        }
        Ok(n)
    }
}

impl ReadReady for RxPipe {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        match self.rx.try_recv() {
            Ok(b) => {
                self.peeked = Some(b);
                Ok(true)
            }
            Err(TryRecvError::Empty) => Ok(false),
            Err(TryRecvError::Disconnected) => Err(IoError),
        }
    }
}

/// Receive half over a fixed byte script, failing with a read error once the
/// script is exhausted.
pub struct ScriptedRx(VecDeque<u8>);

impl ScriptedRx {
    pub fn new(script: &[u8]) -> Self {
        Self(script.iter().copied().collect())
    }

    pub fn remaining(&self) -> usize {
        self.0.len()
    }
}

impl ErrorType for ScriptedRx {
    type Error = IoError;
}

impl Read for ScriptedRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut n = 0;
        while n < buf.len() {
            match self.0.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        if n == 0 {
            return Err(IoError);
        }
        Ok(n)
    }
}

impl ReadReady for ScriptedRx {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.is_empty())
    }
}
