//! Binary command protocol.
//!
//! Every frame starts with a one-byte opcode; multi-byte fields are
//! little-endian. Parsing checks the per-opcode minimum length up front so
//! field reads cannot run off the end; trailing bytes are ignored.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::FrameError;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    TimeSync = 0x01,
    Actuate = 0x02,
    PeriodicStart = 0x03,
    PeriodicSignal = 0x04,
    GetResults = 0x05,
}

impl Opcode {
    /// Minimum frame length, opcode byte included.
    pub const fn min_frame_len(self) -> usize {
        match self {
            Self::TimeSync => 9,
            Self::Actuate => 20,
            Self::PeriodicStart => 5,
            Self::PeriodicSignal => 11,
            Self::GetResults => 1,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = FrameError;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        match b {
            0x01 => Ok(Self::TimeSync),
            0x02 => Ok(Self::Actuate),
            0x03 => Ok(Self::PeriodicStart),
            0x04 => Ok(Self::PeriodicSignal),
            0x05 => Ok(Self::GetResults),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }
}

/// Payload of an ACTUATE frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuateRequest {
    pub actuation_id: u8,
    /// Originator send time (ms); informational only.
    pub sent_at: u64,
    /// Absolute time (ms) the actuation should happen.
    pub execute_at: u64,
    pub sequence: u16,
}

/// A parsed inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TimeSync { t1: u64 },
    Actuate(ActuateRequest),
    PeriodicStart { count: u16, period_ms: u16 },
    PeriodicSignal { sequence: u16, sent_at: u64 },
    GetResults,
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::TimeSync { .. } => Opcode::TimeSync,
            Self::Actuate(_) => Opcode::Actuate,
            Self::PeriodicStart { .. } => Opcode::PeriodicStart,
            Self::PeriodicSignal { .. } => Opcode::PeriodicSignal,
            Self::GetResults => Opcode::GetResults,
        }
    }

    pub fn parse(frame: &[u8]) -> Result<Self, FrameError> {
        let (&op, mut rd) = frame.split_first().ok_or(FrameError::Empty)?;
        let opcode = Opcode::try_from(op)?;
        let min = opcode.min_frame_len();
        let short = || FrameError::TooShort {
            opcode: op,
            len: frame.len(),
            min,
        };
        if frame.len() < min {
            return Err(short());
        }

        let cmd = match opcode {
            Opcode::TimeSync => Self::TimeSync {
                t1: rd.read_u64::<LittleEndian>().map_err(|_| short())?,
            },
            Opcode::Actuate => Self::Actuate(ActuateRequest {
                actuation_id: rd.read_u8().map_err(|_| short())?,
                sent_at: rd.read_u64::<LittleEndian>().map_err(|_| short())?,
                execute_at: rd.read_u64::<LittleEndian>().map_err(|_| short())?,
                sequence: rd.read_u16::<LittleEndian>().map_err(|_| short())?,
            }),
            Opcode::PeriodicStart => Self::PeriodicStart {
                count: rd.read_u16::<LittleEndian>().map_err(|_| short())?,
                period_ms: rd.read_u16::<LittleEndian>().map_err(|_| short())?,
            },
            Opcode::PeriodicSignal => Self::PeriodicSignal {
                sequence: rd.read_u16::<LittleEndian>().map_err(|_| short())?,
                sent_at: rd.read_u64::<LittleEndian>().map_err(|_| short())?,
            },
            Opcode::GetResults => Self::GetResults,
        };
        Ok(cmd)
    }

    /// Encode the frame the way a client would send it.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.opcode().min_frame_len());
        out.push(self.opcode() as u8);
        // Writes into a Vec cannot fail.
        let _ = match *self {
            Self::TimeSync { t1 } => out.write_u64::<LittleEndian>(t1),
            Self::Actuate(req) => write_actuate(&mut out, &req),
            Self::PeriodicStart { count, period_ms } => out
                .write_u16::<LittleEndian>(count)
                .and_then(|()| out.write_u16::<LittleEndian>(period_ms)),
            Self::PeriodicSignal { sequence, sent_at } => out
                .write_u16::<LittleEndian>(sequence)
                .and_then(|()| out.write_u64::<LittleEndian>(sent_at)),
            Self::GetResults => Ok(()),
        };
        out
    }
}

fn write_actuate(out: &mut Vec<u8>, req: &ActuateRequest) -> std::io::Result<()> {
    out.write_u8(req.actuation_id)?;
    out.write_u64::<LittleEndian>(req.sent_at)?;
    out.write_u64::<LittleEndian>(req.execute_at)?;
    out.write_u16::<LittleEndian>(req.sequence)
}

/// Status byte of a PERIODIC_START acknowledgement.
pub const PERIODIC_START_OK: u8 = 1;

/// An outbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `op, t1, t2, t3` (25 bytes)
    TimeSync { t1: u64, t2: i64, t3: i64 },
    /// `op, actuation_id, received_at, executed_at, sequence` (20 bytes)
    Actuated {
        actuation_id: u8,
        received_at: i64,
        executed_at: i64,
        sequence: u16,
    },
    /// `status=1, reserved=0`
    PeriodicStarted,
    /// Pre-encoded `count:u16 + count × i16`
    Results(Vec<u8>),
}

impl Response {
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::TimeSync { .. } => 25,
            Self::Actuated { .. } => 20,
            Self::PeriodicStarted => 2,
            Self::Results(bytes) => bytes.len(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        if let Self::Results(bytes) = self {
            return bytes.clone();
        }
        let mut out = Vec::with_capacity(self.encoded_len());
        let _ = self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) -> std::io::Result<()> {
        match *self {
            Self::TimeSync { t1, t2, t3 } => {
                out.write_u8(Opcode::TimeSync as u8)?;
                out.write_u64::<LittleEndian>(t1)?;
                out.write_i64::<LittleEndian>(t2)?;
                out.write_i64::<LittleEndian>(t3)
            }
            Self::Actuated {
                actuation_id,
                received_at,
                executed_at,
                sequence,
            } => {
                out.write_u8(Opcode::Actuate as u8)?;
                out.write_u8(actuation_id)?;
                out.write_i64::<LittleEndian>(received_at)?;
                out.write_i64::<LittleEndian>(executed_at)?;
                out.write_u16::<LittleEndian>(sequence)
            }
            Self::PeriodicStarted => {
                out.write_u8(PERIODIC_START_OK)?;
                out.write_u8(0)
            }
            Self::Results(ref bytes) => {
                out.extend_from_slice(bytes);
                Ok(())
            }
        }
    }
}
