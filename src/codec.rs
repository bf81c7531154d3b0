/// Manufacturer-data payload announcing distance measurement support.
///
/// Fixed 10-byte layout, all fields little-endian:
///
/// ```text
/// company_code (2) || support_dm_code (4) || access_address (4)
/// ```
///
/// The payload has no version or length field. Anything that is not exactly
/// 10 bytes or carries a different capability marker is ordinary
/// advertisement traffic and decodes to `None`.
use crate::defaults::{COMPANY_CODE, SUPPORT_DM_CODE};

/// Encoded payload length
pub const PAYLOAD_LEN: usize = 10;

/// Length of the company code + marker header used as the scan filter
pub const FILTER_PREFIX_LEN: usize = 6;

/// Decoded manufacturer payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MfgData {
    pub company_code: u16,
    pub support_code: u32,
    pub access_address: u32,
}

impl MfgData {
    /// Payload advertised by this node for the given access address.
    pub const fn new(access_address: u32) -> Self {
        Self {
            company_code: COMPANY_CODE,
            support_code: SUPPORT_DM_CODE,
            access_address,
        }
    }

    pub fn encode(&self) -> [u8; PAYLOAD_LEN] {
        encode(self.company_code, self.support_code, self.access_address)
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        decode(bytes).map(|(company_code, support_code, access_address)| Self {
            company_code,
            support_code,
            access_address,
        })
    }
}

/// Encode a payload. The marker is written as given; only `decode` checks it.
pub fn encode(company_code: u16, support_code: u32, access_address: u32) -> [u8; PAYLOAD_LEN] {
    let mut out = [0u8; PAYLOAD_LEN];
    out[0..2].copy_from_slice(&company_code.to_le_bytes());
    out[2..6].copy_from_slice(&support_code.to_le_bytes());
    out[6..10].copy_from_slice(&access_address.to_le_bytes());
    out
}

/// Decode a payload into `(company_code, support_code, access_address)`.
pub fn decode(bytes: &[u8]) -> Option<(u16, u32, u32)> {
    let bytes: &[u8; PAYLOAD_LEN] = bytes.try_into().ok()?;
    let company_code = u16::from_le_bytes([bytes[0], bytes[1]]);
    let support_code = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    if support_code != SUPPORT_DM_CODE {
        return None;
    }
    let access_address = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
    Some((company_code, support_code, access_address))
}

/// Company code + marker header the radio filters scan results on.
pub fn filter_prefix() -> [u8; FILTER_PREFIX_LEN] {
    let mut out = [0u8; FILTER_PREFIX_LEN];
    out.copy_from_slice(&encode(COMPANY_CODE, SUPPORT_DM_CODE, 0)[..FILTER_PREFIX_LEN]);
    out
}
