use core::time::Duration;

use crate::OperatingMode;

/// Time after a wake-up before the fan delivers stable readings.
pub const WAKE_STABILIZATION: Duration = Duration::from_secs(30);

pub const COMMAND_FRAME_SIZE: usize = 7;

/// Control frames understood by the sensor.
///
/// The frames are sent exactly as stored. They are fixed literals and are
/// never re-derived from the checksum rule used for incoming frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Enter standby.
    Sleep,
    /// Leave standby. Readings are unreliable for [`WAKE_STABILIZATION`].
    WakeUp,
    /// Stream frames unsolicited.
    SetActiveMode,
    /// Send frames only on request.
    SetPassiveMode,
    /// Request a single frame while in passive mode.
    RequestRead,
}

impl Command {
    pub const ALL: [Command; 5] = [
        Command::Sleep,
        Command::WakeUp,
        Command::SetActiveMode,
        Command::SetPassiveMode,
        Command::RequestRead,
    ];

    pub const fn frame(self) -> &'static [u8; COMMAND_FRAME_SIZE] {
        match self {
            Command::Sleep => &[0x42, 0x4D, 0xE4, 0x00, 0x00, 0x01, 0x73],
            Command::WakeUp => &[0x42, 0x4D, 0xE4, 0x00, 0x01, 0x01, 0x74],
            Command::SetActiveMode => &[0x42, 0x4D, 0xE1, 0x00, 0x01, 0x01, 0x71],
            Command::SetPassiveMode => &[0x42, 0x4D, 0xE1, 0x00, 0x00, 0x01, 0x70],
            Command::RequestRead => &[0x42, 0x4D, 0xE2, 0x00, 0x00, 0x01, 0x71],
        }
    }

    /// Mode the sensor is in once this command has been sent, if it changes one.
    pub const fn resulting_mode(self) -> Option<OperatingMode> {
        match self {
            Command::SetActiveMode => Some(OperatingMode::Active),
            Command::SetPassiveMode => Some(OperatingMode::Passive),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Command::Sleep => "sleep",
            Command::WakeUp => "wake_up",
            Command::SetActiveMode => "set_active_mode",
            Command::SetPassiveMode => "set_passive_mode",
            Command::RequestRead => "request_read",
        }
    }
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{START_MARKER_1, START_MARKER_2, checksum};

    #[test]
    fn frames_are_fixed_literals() {
        assert_eq!(
            Command::RequestRead.frame(),
            &[0x42, 0x4D, 0xE2, 0x00, 0x00, 0x01, 0x71]
        );
        assert_eq!(
            Command::SetPassiveMode.frame(),
            &[0x42, 0x4D, 0xE1, 0x00, 0x00, 0x01, 0x70]
        );
    }

    #[test]
    fn frames_are_well_formed() {
        for command in Command::ALL {
            let frame = command.frame();
            assert_eq!(frame[0], START_MARKER_1, "{command}");
            assert_eq!(frame[1], START_MARKER_2, "{command}");

            let trailer = u16::from_be_bytes([frame[5], frame[6]]);
            assert_eq!(trailer, checksum(&frame[..5]), "{command}");
        }
    }

    #[test]
    fn only_mode_commands_change_mode() {
        assert_eq!(
            Command::SetPassiveMode.resulting_mode(),
            Some(OperatingMode::Passive)
        );
        assert_eq!(
            Command::SetActiveMode.resulting_mode(),
            Some(OperatingMode::Active)
        );
        assert_eq!(Command::RequestRead.resulting_mode(), None);
        assert_eq!(Command::Sleep.resulting_mode(), None);
    }
}
