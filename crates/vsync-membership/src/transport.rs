//! The multicast transport contract.
//!
//! The membership engine never sends application data. It only needs to
//! fence an epoch: stop issuing and accepting epoch-tagged traffic before a
//! successor view takes over.

use thiserror::Error;

/// Errors a transport reports when asked to wedge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// In-flight sends could not be drained.
    #[error("in-flight traffic did not drain: {0}")]
    NotQuiescent(String),

    /// The transport has already shut down.
    #[error("transport closed")]
    Closed,
}

/// Multicast transport as seen by the membership engine.
pub trait Transport {
    /// Halts further sends and receives for the current epoch.
    ///
    /// Returns once no further epoch-tagged traffic will be delivered. May
    /// wait for in-flight sends to drain. Must be safe to call more than once.
    fn wedge(&mut self) -> Result<(), TransportError>;
}

/// A transport with no traffic, for simulation and tests.
///
/// Records how often it was wedged and can be told to fail.
#[derive(Debug, Default)]
pub struct NullTransport {
    wedge_calls: u32,
    fail_with: Option<TransportError>,
}

impl NullTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every wedge attempt fails with `error`.
    pub fn failing(error: TransportError) -> Self {
        Self {
            wedge_calls: 0,
            fail_with: Some(error),
        }
    }

    /// Number of times `wedge` was called.
    pub fn wedge_calls(&self) -> u32 {
        self.wedge_calls
    }

    /// Stops failing future wedge attempts.
    pub fn heal(&mut self) {
        self.fail_with = None;
    }
}

impl Transport for NullTransport {
    fn wedge(&mut self) -> Result<(), TransportError> {
        self.wedge_calls += 1;
        match &self.fail_with {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
