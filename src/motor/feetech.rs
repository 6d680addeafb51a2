// Feetech STS3215 serial protocol implementation
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Steer servos run in position mode (12-bit absolute position per turn),
// drive servos in velocity mode (steps/s, sign-magnitude encoded).

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 20;

/// Encoder steps per servo output revolution
pub const STEPS_PER_REVOLUTION: u16 = 4096;

const HEADER: [u8; 2] = [0xFF, 0xFF];

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
}

/// Register addresses for STS3215
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    // EEPROM area
    PCoefficient = 21, // 1 byte
    DCoefficient = 22, // 1 byte
    ICoefficient = 23, // 1 byte

    // RAM area
    OperatingMode = 33,   // 1 byte: 0=position, 1=velocity
    TorqueEnable = 40,    // 1 byte
    GoalPosition = 42,    // 2 bytes
    GoalVelocity = 46,    // 2 bytes, sign-magnitude
    Lock = 55,            // 1 byte: 0=EEPROM writable
    PresentPosition = 56, // 2 bytes
    PresentVelocity = 58, // 2 bytes, sign-magnitude
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
}

#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Servo {id} returned error status: 0x{status:02X}")]
    MotorError { id: u8, status: u8 },

    #[error("Timeout waiting for response from servo {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

/// Servo bus over a serial port. One bus carries every servo of the base.
pub struct FeetechBus {
    port: Box<dyn SerialPort>,
}

impl FeetechBus {
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }

    /// Inverted byte sum, excluding header
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8;
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.extend_from_slice(&[id, length, instruction as u8]);
        packet.extend_from_slice(params);
        packet.push(Self::checksum(&packet[2..]));

        packet
    }

    fn transmit(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read one status packet and return its parameter bytes
    fn read_status(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut head = [0u8; 4];
        self.port.read_exact(&mut head).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut => FeetechError::Timeout { id: expected_id },
            _ => FeetechError::Io(e),
        })?;

        if head[..2] != HEADER {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", &head[..2]),
            });
        }

        let (id, length) = (head[2], head[3] as usize);
        if id != expected_id {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: got {}", id),
            });
        }
        if length < 2 {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Length {} too short", length),
            });
        }

        // error byte + params + checksum
        let mut body = vec![0u8; length];
        self.port.read_exact(&mut body)?;

        let (payload, checksum) = body.split_at(length - 1);
        let mut summed = vec![id, length as u8];
        summed.extend_from_slice(payload);
        if Self::checksum(&summed) != checksum[0] {
            return Err(FeetechError::ChecksumMismatch { id });
        }

        if payload[0] != 0 {
            return Err(FeetechError::MotorError {
                id,
                status: payload[0],
            });
        }

        Ok(payload[1..].to_vec())
    }

    pub fn ping(&mut self, id: u8) -> Result<bool> {
        self.transmit(&Self::build_packet(id, Instruction::Ping, &[]))?;

        match self.read_status(id) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("Write u8 to servo {}: reg={:?}, value={}", id, register, value);
        let packet = Self::build_packet(id, Instruction::Write, &[register as u8, value]);
        self.transmit(&packet)?;
        self.read_status(id)?;
        Ok(())
    }

    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        let [lo, hi] = value.to_le_bytes();
        let packet = Self::build_packet(id, Instruction::Write, &[register as u8, lo, hi]);
        self.transmit(&packet)?;
        self.read_status(id)?;
        Ok(())
    }

    pub fn read_u8(&mut self, id: u8, register: Register) -> Result<u8> {
        let packet = Self::build_packet(id, Instruction::Read, &[register as u8, 1]);
        self.transmit(&packet)?;

        let response = self.read_status(id)?;
        response.first().copied().ok_or_else(|| FeetechError::InvalidResponse {
            id,
            reason: "Expected 1 byte, got 0".to_string(),
        })
    }

    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let packet = Self::build_packet(id, Instruction::Read, &[register as u8, 2]);
        self.transmit(&packet)?;

        let response = self.read_status(id)?;
        match response.as_slice() {
            [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
            _ => Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Expected 2 bytes, got {}", response.len()),
            }),
        }
    }

    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)
    }

    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)
    }

    /// Switch operating mode. Torque is dropped while the mode changes.
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.disable_torque(id)?;
        self.write_u8(id, Register::OperatingMode, mode as u8)?;
        self.enable_torque(id)
    }

    /// Write the servo's internal PID coefficients (EEPROM, unlocked then relocked)
    pub fn set_pid_coefficients(&mut self, id: u8, p: u8, i: u8, d: u8) -> Result<()> {
        self.write_u8(id, Register::Lock, 0)?;
        self.write_u8(id, Register::PCoefficient, p)?;
        self.write_u8(id, Register::ICoefficient, i)?;
        self.write_u8(id, Register::DCoefficient, d)?;
        self.write_u8(id, Register::Lock, 1)
    }

    pub fn set_goal_position(&mut self, id: u8, steps: u16) -> Result<()> {
        self.write_u16(id, Register::GoalPosition, steps % STEPS_PER_REVOLUTION)
    }

    pub fn set_goal_velocity(&mut self, id: u8, steps_per_sec: i16) -> Result<()> {
        self.write_u16(id, Register::GoalVelocity, encode_sign_magnitude(steps_per_sec))
    }

    /// Present position in [0, 4096) steps
    pub fn present_position(&mut self, id: u8) -> Result<u16> {
        Ok(self.read_u16(id, Register::PresentPosition)? % STEPS_PER_REVOLUTION)
    }

    pub fn present_velocity(&mut self, id: u8) -> Result<i16> {
        Ok(decode_sign_magnitude(self.read_u16(id, Register::PresentVelocity)?))
    }
}

/// Bit 15 = sign (1 = negative), bits 0-14 = magnitude
fn encode_sign_magnitude(value: i16) -> u16 {
    if value >= 0 {
        value as u16
    } else {
        0x8000 | value.unsigned_abs().min(0x7FFF)
    }
}

fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 { -magnitude } else { magnitude }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // ~(1+4+3+30+0+2) = ~40 = 215
        let data = [1u8, 4, 0x03, 30, 0, 2];
        assert_eq!(FeetechBus::checksum(&data), 215);
    }

    #[test]
    fn test_sign_magnitude() {
        assert_eq!(encode_sign_magnitude(100), 100);
        assert_eq!(encode_sign_magnitude(-100), 0x8064);
        assert_eq!(encode_sign_magnitude(i16::MIN), 0xFFFF);
        assert_eq!(decode_sign_magnitude(0x8064), -100);
        assert_eq!(decode_sign_magnitude(0x0001), 1);
    }

    #[test]
    fn test_goal_position_packet_layout() {
        let [lo, hi] = 2048u16.to_le_bytes();
        let params = [Register::GoalPosition as u8, lo, hi];
        let packet = FeetechBus::build_packet(3, Instruction::Write, &params);
        assert_eq!(&packet[..5], &[0xFF, 0xFF, 3, 5, 0x03]);
        assert_eq!(&packet[5..8], &[42, 0x00, 0x08]);
        assert_eq!(packet.len(), 9);
        assert_eq!(packet[8], FeetechBus::checksum(&packet[2..8]));
    }
}
