//! ISO-TP (ISO 15765-2) frame encode/decode: the wire-level tables from
//! spec §4.2/§6.

/// Flow-control status, the first nibble low bits of an FC frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlowStatus {
    /// Sender may continue transmitting consecutive frames.
    Continue,
    /// Sender must hold off and wait for another FC.
    Wait,
    /// Receiver cannot accept the message; abort.
    Overflow,
}

impl FlowStatus {
    fn from_nibble(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Continue),
            1 => Some(Self::Wait),
            2 => Some(Self::Overflow),
            _ => None,
        }
    }

    fn to_nibble(self) -> u8 {
        match self {
            Self::Continue => 0,
            Self::Wait => 1,
            Self::Overflow => 2,
        }
    }
}

/// Separation time requested by a flow-control frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SeparationTime {
    /// 0..=127 ms.
    Millis(u8),
    /// 100..=900 us, encoded 0xF1..=0xF9.
    Micros100(u8),
}

impl SeparationTime {
    /// Decode the STmin byte per ISO-TP: 0x00-0x7F = ms, 0xF1-0xF9 = 100..900us.
    pub fn decode(byte: u8) -> Option<Self> {
        match byte {
            0x00..=0x7F => Some(Self::Millis(byte)),
            0xF1..=0xF9 => Some(Self::Micros100(byte)),
            _ => None,
        }
    }

    /// Encode back to the STmin wire byte.
    pub fn encode(self) -> u8 {
        match self {
            Self::Millis(ms) => ms,
            Self::Micros100(code) => code,
        }
    }

    /// Resolved minimum spacing as a [`std::time::Duration`].
    pub fn as_duration(self) -> std::time::Duration {
        match self {
            Self::Millis(ms) => std::time::Duration::from_millis(ms as u64),
            Self::Micros100(code) => {
                std::time::Duration::from_micros(100 * (code - 0xF0) as u64)
            }
        }
    }
}

impl Default for SeparationTime {
    fn default() -> Self {
        Self::Millis(0)
    }
}

/// A single decoded ISO-TP protocol data unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Pdu {
    /// Single Frame: a complete message that fits in one CAN frame.
    SingleFrame { payload: Vec<u8> },
    /// First Frame: opens a multi-frame transfer.
    FirstFrame { total_length: u32, payload: Vec<u8> },
    /// Consecutive Frame: carries the next slice of a multi-frame transfer.
    ConsecutiveFrame { sequence: u8, payload: Vec<u8> },
    /// Flow Control: governs the sender's consecutive-frame cadence.
    FlowControl {
        status: FlowStatus,
        block_size: u8,
        separation_time: SeparationTime,
    },
}

/// Error decoding or encoding a PDU.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PduError {
    /// Frame too short to contain a PCI byte.
    #[error("frame is empty")]
    Empty,
    /// PCI high nibble did not match any known frame type.
    #[error("unrecognized PCI nibble 0x{0:X}")]
    UnknownPci(u8),
    /// Frame claims a length its byte count cannot support.
    #[error("frame declares {declared} payload bytes but only {available} are present")]
    Truncated { declared: usize, available: usize },
    /// STmin byte outside the legal 0x00-0x7F / 0xF1-0xF9 ranges.
    #[error("invalid STmin byte 0x{0:02X}")]
    InvalidSeparationTime(u8),
    /// Flow status nibble outside 0..=2.
    #[error("invalid flow status nibble 0x{0:X}")]
    InvalidFlowStatus(u8),
    /// Single-frame payload exceeds the addressing mode's capacity.
    #[error("single frame payload of {0} bytes exceeds capacity")]
    SingleFrameTooLarge(usize),
    /// Message too large to express even with the FD 32-bit length form.
    #[error("message of {0} bytes exceeds the maximum representable length")]
    MessageTooLarge(usize),
}

/// Maximum classical (non-FD) single-frame payload.
pub const SF_CAPACITY_CLASSICAL: usize = 7;
/// Maximum FD long-form single-frame payload (frame capacity 64 - 2 PCI bytes).
pub const SF_CAPACITY_FD: usize = 62;
/// Threshold above which a 12-bit FF length must switch to the 32-bit FD form.
pub const FF_LENGTH_12BIT_MAX: u32 = 0xFFF;

/// Decodes one CAN frame payload (already stripped of any addressing-mode
/// prefix byte) into a [`Pdu`].
pub fn decode_pdu(data: &[u8]) -> Result<Pdu, PduError> {
    let pci = *data.first().ok_or(PduError::Empty)?;
    match pci & 0xF0 {
        0x00 => decode_single_frame(data),
        0x10 => decode_first_frame(data),
        0x20 => decode_consecutive_frame(data),
        0x30 => decode_flow_control(data),
        other => Err(PduError::UnknownPci(other >> 4)),
    }
}

fn decode_single_frame(data: &[u8]) -> Result<Pdu, PduError> {
    let pci = data[0];
    let len_nibble = pci & 0x0F;
    if len_nibble == 0 {
        // FD long form: 00 LL <payload>
        let len = *data.get(1).ok_or(PduError::Empty)? as usize;
        let available = data.len().saturating_sub(2);
        if available < len {
            return Err(PduError::Truncated {
                declared: len,
                available,
            });
        }
        Ok(Pdu::SingleFrame {
            payload: data[2..2 + len].to_vec(),
        })
    } else {
        let len = len_nibble as usize;
        let available = data.len().saturating_sub(1);
        if available < len {
            return Err(PduError::Truncated {
                declared: len,
                available,
            });
        }
        Ok(Pdu::SingleFrame {
            payload: data[1..1 + len].to_vec(),
        })
    }
}

fn decode_first_frame(data: &[u8]) -> Result<Pdu, PduError> {
    if data.len() < 2 {
        return Err(PduError::Empty);
    }
    let high = (data[0] & 0x0F) as u32;
    let low = data[1] as u32;
    if high == 0 && low == 0 {
        // FD 32-bit length form: 10 00 LL LL LL LL <payload>
        if data.len() < 6 {
            return Err(PduError::Truncated {
                declared: 4,
                available: data.len().saturating_sub(2),
            });
        }
        let total = u32::from_be_bytes([data[2], data[3], data[4], data[5]]);
        Ok(Pdu::FirstFrame {
            total_length: total,
            payload: data[6..].to_vec(),
        })
    } else {
        let total = (high << 8) | low;
        Ok(Pdu::FirstFrame {
            total_length: total,
            payload: data[2..].to_vec(),
        })
    }
}

fn decode_consecutive_frame(data: &[u8]) -> Result<Pdu, PduError> {
    if data.is_empty() {
        return Err(PduError::Empty);
    }
    let sequence = data[0] & 0x0F;
    Ok(Pdu::ConsecutiveFrame {
        sequence,
        payload: data[1..].to_vec(),
    })
}

fn decode_flow_control(data: &[u8]) -> Result<Pdu, PduError> {
    if data.len() < 3 {
        return Err(PduError::Empty);
    }
    let status_nibble = data[0] & 0x0F;
    let status =
        FlowStatus::from_nibble(status_nibble).ok_or(PduError::InvalidFlowStatus(status_nibble))?;
    let block_size = data[1];
    let separation_time =
        SeparationTime::decode(data[2]).ok_or(PduError::InvalidSeparationTime(data[2]))?;
    Ok(Pdu::FlowControl {
        status,
        block_size,
        separation_time,
    })
}

/// Encodes a [`Pdu`] into raw bytes (unpadded; the caller pads to the
/// channel's frame capacity and resolves the DLC).
///
/// `fd` selects whether the FD long/extended forms are permitted; `capacity`
/// is the channel's usable frame byte count (7 for classical SF headroom, up
/// to 62 for FD long-form SF).
pub fn encode_pdu(pdu: &Pdu, fd: bool) -> Result<Vec<u8>, PduError> {
    match pdu {
        Pdu::SingleFrame { payload } => encode_single_frame(payload, fd),
        Pdu::FirstFrame {
            total_length,
            payload,
        } => encode_first_frame(*total_length, payload, fd),
        Pdu::ConsecutiveFrame { sequence, payload } => {
            let mut out = Vec::with_capacity(1 + payload.len());
            out.push(0x20 | (sequence & 0x0F));
            out.extend_from_slice(payload);
            Ok(out)
        }
        Pdu::FlowControl {
            status,
            block_size,
            separation_time,
        } => Ok(vec![0x30 | status.to_nibble(), *block_size, separation_time.encode()]),
    }
}

fn encode_single_frame(payload: &[u8], fd: bool) -> Result<Vec<u8>, PduError> {
    let cap = if fd { SF_CAPACITY_FD } else { SF_CAPACITY_CLASSICAL };
    if payload.len() > cap {
        return Err(PduError::SingleFrameTooLarge(payload.len()));
    }
    if fd && payload.len() > SF_CAPACITY_CLASSICAL {
        let mut out = Vec::with_capacity(2 + payload.len());
        out.push(0x00);
        out.push(payload.len() as u8);
        out.extend_from_slice(payload);
        Ok(out)
    } else {
        let mut out = Vec::with_capacity(1 + payload.len());
        out.push(payload.len() as u8);
        out.extend_from_slice(payload);
        Ok(out)
    }
}

fn encode_first_frame(total_length: u32, payload: &[u8], fd: bool) -> Result<Vec<u8>, PduError> {
    if total_length <= FF_LENGTH_12BIT_MAX {
        let mut out = Vec::with_capacity(2 + payload.len());
        out.push(0x10 | ((total_length >> 8) as u8 & 0x0F));
        out.push((total_length & 0xFF) as u8);
        out.extend_from_slice(payload);
        Ok(out)
    } else if fd {
        let mut out = Vec::with_capacity(6 + payload.len());
        out.push(0x10);
        out.push(0x00);
        out.extend_from_slice(&total_length.to_be_bytes());
        out.extend_from_slice(payload);
        Ok(out)
    } else {
        Err(PduError::MessageTooLarge(total_length as usize))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_frame_round_trip() {
        let pdu = Pdu::SingleFrame {
            payload: vec![0x22, 0xF1, 0x81],
        };
        let wire = encode_pdu(&pdu, false).unwrap();
        assert_eq!(wire, vec![0x03, 0x22, 0xF1, 0x81]);
        assert_eq!(decode_pdu(&wire).unwrap(), pdu);
    }

    #[test]
    fn first_frame_12_bit_length() {
        let payload = vec![0x2E; 6];
        let pdu = Pdu::FirstFrame {
            total_length: 200,
            payload: payload.clone(),
        };
        let wire = encode_pdu(&pdu, false).unwrap();
        assert_eq!(wire[0], 0x10 | ((200u32 >> 8) as u8));
        assert_eq!(wire[1], (200u32 & 0xFF) as u8);
        assert_eq!(decode_pdu(&wire).unwrap(), pdu);
    }

    #[test]
    fn first_frame_over_12_bit_requires_fd() {
        let pdu = Pdu::FirstFrame {
            total_length: 5000,
            payload: vec![1, 2, 3],
        };
        assert_eq!(
            encode_pdu(&pdu, false).unwrap_err(),
            PduError::MessageTooLarge(5000)
        );
        let wire = encode_pdu(&pdu, true).unwrap();
        assert_eq!(&wire[0..2], &[0x10, 0x00]);
        assert_eq!(decode_pdu(&wire).unwrap(), pdu);
    }

    #[test]
    fn flow_control_round_trip() {
        let pdu = Pdu::FlowControl {
            status: FlowStatus::Continue,
            block_size: 8,
            separation_time: SeparationTime::Millis(10),
        };
        let wire = encode_pdu(&pdu, false).unwrap();
        assert_eq!(wire, vec![0x30, 8, 10]);
        assert_eq!(decode_pdu(&wire).unwrap(), pdu);
    }

    #[test]
    fn separation_time_microsecond_range() {
        let st = SeparationTime::decode(0xF5).unwrap();
        assert_eq!(st, SeparationTime::Micros100(0xF5));
        assert_eq!(st.as_duration(), std::time::Duration::from_micros(500));
    }

    #[test]
    fn consecutive_frame_sequence_wraps_at_16() {
        let pdu = Pdu::ConsecutiveFrame {
            sequence: 17 % 16,
            payload: vec![0xAA],
        };
        let wire = encode_pdu(&pdu, false).unwrap();
        assert_eq!(wire[0], 0x21);
        assert_eq!(decode_pdu(&wire).unwrap(), pdu);
    }
}
