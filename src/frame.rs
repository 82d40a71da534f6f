//! CAN / CAN-FD frame value types and the DLC <-> byte-length tables used
//! everywhere a frame crosses a wire boundary.

use std::time::SystemTime;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Classical CAN length table: DLC and byte length are identical up to 8.
pub const CLASSICAL_MAX_LEN: usize = 8;

/// CAN-FD DLC (9..=15) to byte length table. Indexed by `dlc - 9`.
const FD_LENGTH_TABLE: [usize; 7] = [12, 16, 20, 24, 32, 48, 64];

/// Resolves a DLC nibble (0..=15) to a frame payload byte length.
///
/// DLC values 0..=8 are identity under both classical CAN and CAN-FD. Values
/// 9..=15 are only legal under FD and are resolved through
/// [`FD_LENGTH_TABLE`].
pub fn fd_length_of(dlc: u8) -> Option<usize> {
    match dlc {
        0..=8 => Some(dlc as usize),
        9..=15 => Some(FD_LENGTH_TABLE[(dlc - 9) as usize]),
        _ => None,
    }
}

/// Resolves a byte length to the smallest legal DLC that can carry it.
///
/// Returns `None` if `len` exceeds 64, the largest representable FD frame.
pub fn dlc_for_length(len: usize, fd: bool) -> Option<u8> {
    if len <= CLASSICAL_MAX_LEN {
        return Some(len as u8);
    }
    if !fd || len > 64 {
        return None;
    }
    FD_LENGTH_TABLE
        .iter()
        .position(|&l| l >= len)
        .map(|idx| (idx + 9) as u8)
}

bitflags! {
    /// Per-frame flags. `FD` and `BRS` only have meaning on a CAN-FD channel.
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CanFlags: u8 {
        /// Arbitration id is 29-bit (extended) rather than 11-bit (standard).
        const EXTENDED_ID = 0b0000_0001;
        /// Remote transmission request frame; carries no payload.
        const REMOTE = 0b0000_0010;
        /// Frame represents a bus error condition rather than data.
        const ERROR = 0b0000_0100;
        /// Frame uses the CAN-FD format (up to 64 data bytes).
        const FD = 0b0000_1000;
        /// Bit-rate switch: the FD data phase ran at a higher bitrate.
        const BITRATE_SWITCH = 0b0001_0000;
        /// Transmitter was error-passive or bus-off when this frame was sent.
        const ERROR_STATE_INDICATOR = 0b0010_0000;
    }
}

/// A single CAN or CAN-FD frame, as observed on or submitted to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanFrame {
    /// Wall-clock time the frame was captured or constructed.
    #[serde(with = "system_time_millis")]
    pub timestamp: SystemTime,
    /// Arbitration id. Interpretation (11 vs 29 bit) follows [`CanFlags::EXTENDED_ID`].
    pub id: u32,
    /// Payload bytes. Length must equal `fd_length_of(dlc)` under FD, or be
    /// `<= 8` otherwise; [`CanFrame::new`] enforces this.
    pub data: Vec<u8>,
    /// Frame flags.
    pub flags: CanFlags,
    /// Index of the physical channel the frame arrived on or was sent to.
    pub channel: u8,
    /// Raw DLC nibble (0..=15).
    pub dlc: u8,
}

/// Error returned when constructing a [`CanFrame`] from an inconsistent
/// id/data/flags combination.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Payload length has no legal DLC encoding for the requested mode.
    #[error("payload of {0} bytes has no legal DLC under the requested frame mode")]
    PayloadTooLong(usize),
    /// Extended (29-bit) id exceeds its bit width.
    #[error("arbitration id 0x{0:X} does not fit in 29 bits")]
    IdOutOfRange(u32),
}

impl CanFrame {
    /// Builds a new frame, computing the DLC from `data.len()` and `flags`.
    pub fn new(
        id: u32,
        data: &[u8],
        flags: CanFlags,
        channel: u8,
        timestamp: SystemTime,
    ) -> Result<Self, FrameError> {
        let max_id = if flags.contains(CanFlags::EXTENDED_ID) {
            0x1FFF_FFFF
        } else {
            0x7FF
        };
        if id > max_id {
            return Err(FrameError::IdOutOfRange(id));
        }
        let dlc = dlc_for_length(data.len(), flags.contains(CanFlags::FD))
            .ok_or(FrameError::PayloadTooLong(data.len()))?;
        Ok(Self {
            timestamp,
            id,
            data: data.to_vec(),
            flags,
            channel,
            dlc,
        })
    }

    /// Byte length this frame's DLC resolves to (may exceed `data.len()` for
    /// callers that pad separately; for frames built by [`CanFrame::new`] the
    /// two always agree).
    pub fn declared_length(&self) -> usize {
        fd_length_of(self.dlc).unwrap_or(self.data.len())
    }

    /// True if this frame uses 29-bit arbitration.
    pub fn is_extended(&self) -> bool {
        self.flags.contains(CanFlags::EXTENDED_ID)
    }

    /// True if this frame uses the CAN-FD format.
    pub fn is_fd(&self) -> bool {
        self.flags.contains(CanFlags::FD)
    }
}

mod system_time_millis {
    use std::time::{SystemTime, UNIX_EPOCH};

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
        let millis = t
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        millis.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SystemTime, D::Error> {
        let millis = u128::deserialize(d)?;
        Ok(UNIX_EPOCH + std::time::Duration::from_millis(millis as u64))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fd_table_matches_spec() {
        assert_eq!(fd_length_of(8), Some(8));
        assert_eq!(fd_length_of(9), Some(12));
        assert_eq!(fd_length_of(10), Some(16));
        assert_eq!(fd_length_of(11), Some(20));
        assert_eq!(fd_length_of(12), Some(24));
        assert_eq!(fd_length_of(13), Some(32));
        assert_eq!(fd_length_of(14), Some(48));
        assert_eq!(fd_length_of(15), Some(64));
    }

    #[test]
    fn classical_frame_caps_at_eight_bytes() {
        assert_eq!(dlc_for_length(8, false), Some(8));
        assert_eq!(dlc_for_length(9, false), None);
    }

    #[test]
    fn fd_frame_rounds_up_to_next_legal_length() {
        assert_eq!(dlc_for_length(13, true), Some(10)); // rounds to 16
        assert_eq!(dlc_for_length(40, true), Some(13)); // rounds to 48
    }

    #[test]
    fn new_frame_rejects_oversized_classical_payload() {
        let err = CanFrame::new(0x123, &[0u8; 9], CanFlags::empty(), 0, SystemTime::now())
            .unwrap_err();
        assert_eq!(err, FrameError::PayloadTooLong(9));
    }
}
