//! Lock-free transport state
//!
//! The connection task is the only writer; handles read the state
//! from any thread without taking a lock.

use std::sync::atomic::{AtomicU8, Ordering};

/// Transport-level connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
    ShuttingDown = 4,
}

impl TransportState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TransportState::Connecting,
            2 => TransportState::Connected,
            3 => TransportState::Reconnecting,
            4 => TransportState::ShuttingDown,
            _ => TransportState::Disconnected,
        }
    }
}

/// Atomic wrapper around [`TransportState`]
#[derive(Debug)]
pub struct AtomicTransportState {
    inner: AtomicU8,
}

impl AtomicTransportState {
    pub fn new(state: TransportState) -> Self {
        Self {
            inner: AtomicU8::new(state as u8),
        }
    }

    #[inline]
    pub fn get(&self) -> TransportState {
        TransportState::from_u8(self.inner.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: TransportState) {
        self.inner.store(state as u8, Ordering::Release);
    }

    /// Transition only if the current state is `current`
    pub fn compare_exchange(
        &self,
        current: TransportState,
        new: TransportState,
    ) -> Result<TransportState, TransportState> {
        self.inner
            .compare_exchange(current as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(TransportState::from_u8)
            .map_err(TransportState::from_u8)
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.get() == TransportState::Connected
    }

    /// Connecting or reconnecting
    #[inline]
    pub fn is_connecting(&self) -> bool {
        matches!(
            self.get(),
            TransportState::Connecting | TransportState::Reconnecting
        )
    }

    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.get() == TransportState::ShuttingDown
    }
}
