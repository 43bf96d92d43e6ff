//! Fixed-size file header: a 4-byte identifier plus a `feature_level`.
//!
//! Grounded on `grim_stream::MessageHeader`'s `encode`/`decode` pair (a
//! fixed-size array built with `copy_from_slice`, decoded with a
//! length-check-then-field-check-then-magic-check order reported through
//! a `thiserror` enum) -- the magic/version/length diagnostics map onto
//! `LogicError::NotALogicFile`/`CorruptedHeader`/`BinaryVersionMismatch`
//! here instead of `grim_stream`'s own `ProtocolError`.

use logic_core::LogicError;

pub const HEADER_LEN: usize = 8;
pub const SUPPORTED_IDENTIFIER: [u8; 4] = *b"rl01";
pub const CURRENT_FEATURE_LEVEL: u32 = 1;

pub struct FileHeader {
    pub feature_level: u32,
}

impl FileHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&SUPPORTED_IDENTIFIER);
        buf[4..8].copy_from_slice(&self.feature_level.to_le_bytes());
        buf
    }

    /// Parses and validates `bytes` (expected to be at least the first
    /// [`HEADER_LEN`] bytes of a save file). Checks run in the order a
    /// reader would notice them: too short to hold anything recognizable,
    /// then "not our format at all" (wrong two-letter prefix), then "our
    /// format but a version we don't support".
    pub fn decode(bytes: &[u8]) -> Result<Self, LogicError> {
        if bytes.len() < HEADER_LEN {
            return Err(LogicError::CorruptedHeader(format!(
                "file is {} bytes, shorter than the {HEADER_LEN}-byte header",
                bytes.len()
            )));
        }
        if bytes[0..2] != SUPPORTED_IDENTIFIER[0..2] {
            return Err(LogicError::NotALogicFile(
                "missing the 'rl' identifier prefix".to_string(),
            ));
        }
        let feature_level = u32::from_le_bytes(bytes[4..8].try_into().expect("slice is 4 bytes"));
        if bytes[0..4] != SUPPORTED_IDENTIFIER || feature_level > CURRENT_FEATURE_LEVEL {
            return Err(LogicError::BinaryVersionMismatch(format!(
                "identifier {:?} at feature level {feature_level}, engine supports {:?} up to level {CURRENT_FEATURE_LEVEL}",
                String::from_utf8_lossy(&bytes[0..4]),
                String::from_utf8_lossy(&SUPPORTED_IDENTIFIER),
            )));
        }
        Ok(Self { feature_level })
    }
}
