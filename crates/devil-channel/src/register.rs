//! Optimistically synchronized device registers.
//!
//! A register holds one 16-bit value shared with the device. Local writes
//! take effect immediately and are remembered until the device echoes them
//! back through a `registerChanged` notification; echoes are assumed to
//! arrive in write order.
//!
//! ```text
//!   unsynchronized ──set_from_remote_query──▶ synchronized
//!         ▲                                        │
//!         └────────mark_as_desynchronized──────────┘
//! ```

use std::collections::VecDeque;

use tracing::{debug, trace};

const SIGN_BIT: u32 = 1 << 15;
const WORD: u32 = 1 << 16;

/// Something that happened to a register, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterEvent {
    /// A local write was accepted; the owner must forward it to the device.
    ChangedLocally {
        /// Raw value before the write.
        old_raw: u32,
        /// Raw value after the write.
        new_raw: u32,
    },
    /// The device reported a value we did not originate.
    ChangedRemotely(i32),
    /// The value changed for any reason.
    Changed(i32),
    /// The value can no longer be trusted until re-read.
    Desynchronized,
}

/// A single register with local-write/remote-echo reconciliation.
#[derive(Debug, Clone)]
pub struct Register {
    index: u16,
    signed: bool,
    raw: u32,
    synchronized: bool,
    awaiting_echo: VecDeque<u32>,
}

impl Register {
    /// Creates an unsynchronized register.
    pub fn new(index: u16, signed: bool) -> Self {
        Self {
            index,
            signed,
            raw: 0,
            synchronized: false,
            awaiting_echo: VecDeque::new(),
        }
    }

    /// Device-assigned register index.
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Whether values are two's complement.
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Whether the value has been read from the device.
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// Raw (unsigned) value as seen on the wire.
    pub fn raw(&self) -> u32 {
        self.raw
    }

    /// Value in the register's signedness.
    pub fn value(&self) -> i32 {
        self.raw_to_value(self.raw)
    }

    /// Raw values written locally and not yet echoed, oldest first.
    pub fn awaiting_echo(&self) -> impl Iterator<Item = u32> + '_ {
        self.awaiting_echo.iter().copied()
    }

    /// Convert a raw wire value to the register's signedness.
    pub fn raw_to_value(&self, raw: u32) -> i32 {
        if self.signed && raw >= SIGN_BIT {
            (i64::from(raw) - i64::from(WORD)) as i32
        } else {
            raw as i32
        }
    }

    /// Whether `value` fits the register's 16-bit word in its signedness.
    pub fn accepts(&self, value: i32) -> bool {
        if self.signed {
            (-(SIGN_BIT as i32)..SIGN_BIT as i32).contains(&value)
        } else {
            (0..WORD as i32).contains(&value)
        }
    }

    /// Convert a value in the register's signedness to its raw wire form.
    pub fn value_to_raw(&self, value: i32) -> u32 {
        if self.signed && value < 0 {
            (i64::from(value) + i64::from(WORD)) as u32
        } else {
            value as u32
        }
    }

    /// Apply a write initiated on this side.
    ///
    /// Ignored while unsynchronized, when the value is unchanged, or when it
    /// does not fit the register (see [`accepts`](Self::accepts)).
    pub fn set_from_local_change(&mut self, value: i32) -> Vec<RegisterEvent> {
        if !self.synchronized {
            trace!(index = self.index, "local change on unsynchronized register ignored");
            return Vec::new();
        }
        if !self.accepts(value) {
            debug!(index = self.index, value = value, "local change out of range ignored");
            return Vec::new();
        }
        let new_raw = self.value_to_raw(value);
        if new_raw == self.raw {
            return Vec::new();
        }
        let old_raw = self.raw;
        self.raw = new_raw;
        self.awaiting_echo.push_back(new_raw);
        vec![
            RegisterEvent::ChangedLocally { old_raw, new_raw },
            RegisterEvent::Changed(self.value()),
        ]
    }

    /// Apply a `registerChanged` notification.
    ///
    /// A value found among the pending local writes confirms it and every
    /// older pending write. Anything else means the device diverged: pending
    /// writes are forgotten and the value adopted.
    pub fn set_from_remote_notification(&mut self, raw: u32) -> Vec<RegisterEvent> {
        if !self.synchronized {
            return Vec::new();
        }
        if let Some(pos) = self.awaiting_echo.iter().position(|&v| v == raw) {
            self.awaiting_echo.drain(..=pos);
            trace!(index = self.index, raw = raw, "echo confirmed");
            return Vec::new();
        }
        if !self.awaiting_echo.is_empty() {
            debug!(
                index = self.index,
                raw = raw,
                dropped = self.awaiting_echo.len(),
                "remote value diverged from pending writes"
            );
        }
        self.awaiting_echo.clear();
        if raw == self.raw {
            return Vec::new();
        }
        self.raw = raw;
        let value = self.value();
        vec![RegisterEvent::ChangedRemotely(value), RegisterEvent::Changed(value)]
    }

    /// Apply the result of an explicit `readRegister` call.
    pub fn set_from_remote_query(&mut self, raw: u32) -> Vec<RegisterEvent> {
        self.raw = raw;
        self.synchronized = true;
        let value = self.value();
        vec![RegisterEvent::ChangedRemotely(value), RegisterEvent::Changed(value)]
    }

    /// Stop trusting the local value until the next remote query.
    pub fn mark_as_desynchronized(&mut self) -> Vec<RegisterEvent> {
        self.synchronized = false;
        vec![RegisterEvent::Desynchronized]
    }
}
