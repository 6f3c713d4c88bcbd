//! [`ReplayChannel`] – serves a recorded session back to the control loop.
//!
//! With verification on (replay-full) the log is consumed strictly in order:
//! every command the control loop sends must be the next logged record.
//! Without it (replay-inputs-only) logged commands are skipped and whatever
//! the control loop sends is accepted.

use navpat_types::{Command, NavError, TelemetryFrame};
use tracing::{debug, info};

use crate::channel::{ChannelMode, TelemetryChannel};
use crate::record::{LogEntry, LogReader};
use crate::session::SessionLog;

pub struct ReplayChannel {
    reader: LogReader,
    verify: bool,
    commands_verified: u64,
    frames_replayed: u64,
}

impl ReplayChannel {
    /// Open the `can` log of `session` in one of the replay modes.
    pub fn open(session: &SessionLog, mode: ChannelMode) -> Result<Self, NavError> {
        let verify = match mode {
            ChannelMode::ReplayFull => true,
            ChannelMode::ReplayInputsOnly => false,
            ChannelMode::Live => {
                return Err(NavError::SessionLog(
                    "live mode cannot be served from a session log".to_string(),
                ));
            }
        };
        let reader = LogReader::open(session.log_path(SessionLog::CAN)?)?;
        info!(session = %session.meta().session_id, %mode, "replaying session");
        Ok(Self::from_reader(reader, verify))
    }

    pub fn from_reader(reader: LogReader, verify: bool) -> Self {
        Self {
            reader,
            verify,
            commands_verified: 0,
            frames_replayed: 0,
        }
    }

    pub fn commands_verified(&self) -> u64 {
        self.commands_verified
    }

    pub fn frames_replayed(&self) -> u64 {
        self.frames_replayed
    }
}

impl TelemetryChannel for ReplayChannel {
    fn send_command(&mut self, command: &Command) -> Result<(), NavError> {
        if !self.verify {
            return Ok(());
        }
        let record = self.reader.next_record()?.ok_or(NavError::LogExhausted)?;
        match record.entry {
            LogEntry::Command(logged) if logged == *command => {
                self.commands_verified += 1;
                Ok(())
            }
            LogEntry::Command(logged) => Err(NavError::ReplayMismatch {
                record: record.seq,
                expected: logged.to_string(),
                actual: command.to_string(),
            }),
            LogEntry::Frame(_) => Err(NavError::ReplayMismatch {
                record: record.seq,
                expected: "telemetry frame".to_string(),
                actual: command.to_string(),
            }),
        }
    }

    fn poll_samples(&mut self) -> Result<Option<TelemetryFrame>, NavError> {
        while let Some(record) = self.reader.next_record()? {
            match record.entry {
                LogEntry::Frame(frame) => {
                    self.frames_replayed += 1;
                    return Ok(Some(frame));
                }
                LogEntry::Command(logged) if self.verify => {
                    return Err(NavError::ReplayMismatch {
                        record: record.seq,
                        expected: logged.to_string(),
                        actual: "telemetry poll".to_string(),
                    });
                }
                LogEntry::Command(_) => {}
            }
        }
        debug!(frames = self.frames_replayed, "replay log exhausted");
        Ok(None)
    }

    fn close(&mut self) -> Result<(), NavError> {
        info!(
            frames = self.frames_replayed,
            commands_verified = self.commands_verified,
            "replay closed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogWriter;
    use navpat_types::VehicleStatus;

    fn frame(time: f64) -> TelemetryFrame {
        TelemetryFrame {
            status: VehicleStatus {
                time,
                ..VehicleStatus::default()
            },
            samples: Vec::new(),
        }
    }

    fn drive(speed: f64) -> Command {
        Command::Drive {
            speed,
            steering: 0.0,
        }
    }

    /// stop, drive(0.5), frame(0.05), drive(0.5), frame(0.10)
    fn write_log(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("can.jsonl");
        let mut w = LogWriter::create(&path).unwrap();
        w.append(LogEntry::Command(Command::Stop)).unwrap();
        w.append(LogEntry::Command(drive(0.5))).unwrap();
        w.append(LogEntry::Frame(frame(0.05))).unwrap();
        w.append(LogEntry::Command(drive(0.5))).unwrap();
        w.append(LogEntry::Frame(frame(0.10))).unwrap();
        w.flush().unwrap();
        path
    }

    #[test]
    fn full_replay_accepts_identical_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut ch = ReplayChannel::from_reader(LogReader::open(write_log(dir.path())).unwrap(), true);

        ch.send_command(&Command::Stop).unwrap();
        ch.send_command(&drive(0.5)).unwrap();
        assert_eq!(ch.poll_samples().unwrap(), Some(frame(0.05)));
        ch.send_command(&drive(0.5)).unwrap();
        assert_eq!(ch.poll_samples().unwrap(), Some(frame(0.10)));
        assert_eq!(ch.poll_samples().unwrap(), None);
        assert!(matches!(
            ch.send_command(&drive(0.5)),
            Err(NavError::LogExhausted)
        ));
        assert_eq!(ch.commands_verified(), 3);
    }

    #[test]
    fn full_replay_reports_expected_and_actual() {
        let dir = tempfile::tempdir().unwrap();
        let mut ch = ReplayChannel::from_reader(LogReader::open(write_log(dir.path())).unwrap(), true);

        ch.send_command(&Command::Stop).unwrap();
        match ch.send_command(&drive(0.4)) {
            Err(NavError::ReplayMismatch {
                record,
                expected,
                actual,
            }) => {
                assert_eq!(record, 1);
                assert!(expected.contains("speed=0.5"), "{expected}");
                assert!(actual.contains("speed=0.4"), "{actual}");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn full_replay_rejects_missing_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut ch = ReplayChannel::from_reader(LogReader::open(write_log(dir.path())).unwrap(), true);
        assert!(matches!(
            ch.poll_samples(),
            Err(NavError::ReplayMismatch { record: 0, .. })
        ));
    }

    #[test]
    fn inputs_only_replay_skips_logged_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut ch = ReplayChannel::from_reader(LogReader::open(write_log(dir.path())).unwrap(), false);

        ch.send_command(&drive(3.0)).unwrap();
        assert_eq!(ch.poll_samples().unwrap(), Some(frame(0.05)));
        assert_eq!(ch.poll_samples().unwrap(), Some(frame(0.10)));
        assert_eq!(ch.poll_samples().unwrap(), None);
        assert_eq!(ch.frames_replayed(), 2);
    }
}
