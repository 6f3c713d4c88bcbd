//! [`LiveChannel`] – telemetry channel talking to a real (or simulated)
//! vehicle bus, recording every command and frame.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{SecondsFormat, Utc};
use navpat_types::{Command, NavError, TelemetryFrame};
use tracing::{debug, warn};

use crate::channel::TelemetryChannel;
use crate::record::{LogEntry, LogWriter};
use crate::session::SessionLog;

/// Transport to the vehicle control unit.
///
/// Encoding and decoding of the wire protocol live behind this trait.
/// `receive` blocks until the next tick of telemetry is available.
pub trait VehicleBus {
    fn transmit(&mut self, command: &Command) -> io::Result<()>;

    fn receive(&mut self) -> io::Result<TelemetryFrame>;

    fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<B: VehicleBus + ?Sized> VehicleBus for Box<B> {
    fn transmit(&mut self, command: &Command) -> io::Result<()> {
        (**self).transmit(command)
    }

    fn receive(&mut self) -> io::Result<TelemetryFrame> {
        (**self).receive()
    }

    fn shutdown(&mut self) -> io::Result<()> {
        (**self).shutdown()
    }
}

fn transport(e: io::Error) -> NavError {
    NavError::Transport(e.to_string())
}

pub struct LiveChannel<B: VehicleBus> {
    bus: B,
    log: Option<LogWriter>,
    timestamps: Option<BufWriter<File>>,
    operator_stop: Option<Arc<AtomicBool>>,
}

impl<B: VehicleBus> LiveChannel<B> {
    /// Unrecorded channel over `bus`.
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            log: None,
            timestamps: None,
            operator_stop: None,
        }
    }

    /// Record all traffic into the `can` and `timestamps` logs of `session`.
    pub fn with_session(mut self, session: &SessionLog) -> Result<Self, NavError> {
        self.log = Some(LogWriter::create(session.log_path(SessionLog::CAN)?)?);
        let ts_path = session.log_path(SessionLog::TIMESTAMPS)?;
        let file = File::create(&ts_path)
            .map_err(|e| NavError::SessionLog(format!("{}: {e}", ts_path.display())))?;
        self.timestamps = Some(BufWriter::new(file));
        Ok(self)
    }

    /// Merge an operator emergency-stop flag (e.g. set from a Ctrl-C
    /// handler) into every received frame.
    pub fn with_operator_stop(mut self, flag: Arc<AtomicBool>) -> Self {
        self.operator_stop = Some(flag);
        self
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}

impl<B: VehicleBus> TelemetryChannel for LiveChannel<B> {
    fn send_command(&mut self, command: &Command) -> Result<(), NavError> {
        self.bus.transmit(command).map_err(transport)?;
        if let Some(log) = self.log.as_mut() {
            log.append(LogEntry::Command(*command))?;
        }
        Ok(())
    }

    fn poll_samples(&mut self) -> Result<Option<TelemetryFrame>, NavError> {
        let mut frame = self.bus.receive().map_err(transport)?;

        if let Some(flag) = &self.operator_stop {
            if flag.load(Ordering::SeqCst) && !frame.status.emergency_stop {
                debug!("operator emergency stop merged into frame");
                frame.status.emergency_stop = true;
            }
        }

        if let Some(log) = self.log.as_mut() {
            let seq = log.append(LogEntry::Frame(frame.clone()))?;
            log.flush()?;
            if let Some(ts) = self.timestamps.as_mut() {
                let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
                writeln!(ts, "{seq}\t{now}")
                    .map_err(|e| NavError::SessionLog(format!("timestamps: {e}")))?;
            }
        }

        Ok(Some(frame))
    }

    fn close(&mut self) -> Result<(), NavError> {
        if let Some(log) = self.log.as_mut() {
            log.flush()?;
        }
        if let Some(ts) = self.timestamps.as_mut() {
            ts.flush()
                .map_err(|e| NavError::SessionLog(format!("timestamps: {e}")))?;
        }
        if let Err(e) = self.bus.shutdown() {
            warn!(error = %e, "vehicle bus shutdown failed");
        }
        Ok(())
    }
}
