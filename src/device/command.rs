/// Mode changes accepted on the command attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    Idle,
    ShowVersion,
    TempSelectBegin,
    HeatCycleBegin,
}

impl DeviceCommand {
    /// Operating state the device enters.
    pub fn mode(self) -> f32 {
        match self {
            DeviceCommand::Idle => 2.0,
            DeviceCommand::TempSelectBegin => 3.0,
            DeviceCommand::ShowVersion => 6.0,
            DeviceCommand::HeatCycleBegin => 7.0,
        }
    }

    /// Four-byte word written to the command attribute.
    pub fn word(self) -> [u8; 4] {
        self.mode().to_le_bytes()
    }
}
