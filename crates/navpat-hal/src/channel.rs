//! [`TelemetryChannel`] – the single seam between the control core and the
//! vehicle.
//!
//! Above this trait nothing can tell whether frames come from hardware or
//! from a recorded session; that is what makes replay a testing harness.
//!
//! | mode | commands | frames |
//! |---|---|---|
//! | [`ChannelMode::Live`] | transmitted and logged | received and logged |
//! | [`ChannelMode::ReplayFull`] | compared with the log | read from the log |
//! | [`ChannelMode::ReplayInputsOnly`] | accepted, not checked | read from the log |

use std::fmt;

use navpat_types::{Command, NavError, TelemetryFrame};

/// Command-and-telemetry channel used by the control loop.
pub trait TelemetryChannel {
    /// Emit one command to the vehicle.
    ///
    /// In replay-full mode this fails with [`NavError::ReplayMismatch`] when
    /// the command differs from the logged one.
    fn send_command(&mut self, command: &Command) -> Result<(), NavError>;

    /// Fetch the next tick of telemetry.
    ///
    /// Returns `Ok(None)` once a replay log is exhausted; a live channel
    /// never does.
    fn poll_samples(&mut self) -> Result<Option<TelemetryFrame>, NavError>;

    /// Flush logs and release the transport.
    fn close(&mut self) -> Result<(), NavError>;
}

impl<T: TelemetryChannel + ?Sized> TelemetryChannel for Box<T> {
    fn send_command(&mut self, command: &Command) -> Result<(), NavError> {
        (**self).send_command(command)
    }

    fn poll_samples(&mut self) -> Result<Option<TelemetryFrame>, NavError> {
        (**self).poll_samples()
    }

    fn close(&mut self) -> Result<(), NavError> {
        (**self).close()
    }
}

/// Channel behaviour, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Live,
    ReplayFull,
    ReplayInputsOnly,
}

impl ChannelMode {
    /// Replay mode for a `replay` invocation; `force` disables verification.
    pub fn replay(force: bool) -> Self {
        if force {
            ChannelMode::ReplayInputsOnly
        } else {
            ChannelMode::ReplayFull
        }
    }

    pub fn is_replay(self) -> bool {
        self != ChannelMode::Live
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelMode::Live => write!(f, "live"),
            ChannelMode::ReplayFull => write!(f, "replay-full"),
            ChannelMode::ReplayInputsOnly => write!(f, "replay-inputs-only"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_selects_inputs_only_replay() {
        assert_eq!(ChannelMode::replay(false), ChannelMode::ReplayFull);
        assert_eq!(ChannelMode::replay(true), ChannelMode::ReplayInputsOnly);
        assert!(ChannelMode::ReplayFull.is_replay());
        assert!(!ChannelMode::Live.is_replay());
        assert_eq!(ChannelMode::ReplayInputsOnly.to_string(), "replay-inputs-only");
    }
}
