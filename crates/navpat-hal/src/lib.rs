//! `navpat-hal` – the vehicle side of the control loop.
//!
//! Everything the control core knows about the vehicle goes through a
//! [`TelemetryChannel`]: commands out, one [`TelemetryFrame`] of sensor
//! samples in per tick.  The channel is either live (talking to a
//! [`VehicleBus`] and recording a session log) or a replay of such a log.
//!
//! # Modules
//!
//! - [`channel`] – [`TelemetryChannel`] trait and [`ChannelMode`].
//! - [`record`] – JSON-lines [`LogWriter`]/[`LogReader`] for the `can` log.
//! - [`session`] – [`SessionLog`]: meta file plus the labelled log files.
//! - [`live`] – [`LiveChannel`] over any [`VehicleBus`].
//! - [`replay`] – [`ReplayChannel`], with or without command verification.
//! - [`sim`] – [`SimVehicle`]: kinematic stand-in for the real vehicle.
//!
//! [`TelemetryFrame`]: navpat_types::TelemetryFrame

pub mod channel;
pub mod live;
pub mod record;
pub mod replay;
pub mod session;
pub mod sim;

pub use channel::{ChannelMode, TelemetryChannel};
pub use live::{LiveChannel, VehicleBus};
pub use record::{LogEntry, LogReader, LogRecord, LogWriter};
pub use replay::ReplayChannel;
pub use session::{SessionLog, SessionMeta};
pub use sim::{SimObstacle, SimTuning, SimVehicle};
