/// Advertisement data handling: AD structure parsing for received reports and
/// byte-exact payload building for this node's own advertising.
///
/// AD structure format: [length] [type] [data...]
/// Types we care about:
///   0x01      = Flags
///   0x09      = Complete local name
///   0xFF      = Manufacturer specific data (company ID first, little-endian)
use heapless::Vec;

use crate::codec::{self, MfgData, FILTER_PREFIX_LEN, PAYLOAD_LEN};
use crate::peer::PeerAddress;

/// Maximum legacy advertising payload
pub const MAX_ADV_LEN: usize = 31;

pub const AD_TYPE_FLAGS: u8 = 0x01;
pub const AD_TYPE_COMPLETE_NAME: u8 = 0x09;
pub const AD_TYPE_MANUFACTURER: u8 = 0xFF;

/// LE General Discoverable | BR/EDR Not Supported
pub const ADV_FLAGS: u8 = 0x06;

/// Raw advertising payload buffer
pub type AdvBuffer = Vec<u8, MAX_ADV_LEN>;

/// An advertisement or scan response received while scanning, copied out of
/// the radio callback.
#[derive(Debug, Clone)]
pub struct AdvReport {
    pub addr: PeerAddress,
    pub rssi: i8,
    pub data: AdvBuffer,
}

impl AdvReport {
    /// Copy a report. Payloads longer than a legacy advertisement are cut.
    pub fn new(addr: PeerAddress, rssi: i8, data: &[u8]) -> Self {
        let len = data.len().min(MAX_ADV_LEN);
        let mut buf = AdvBuffer::new();
        let _ = buf.extend_from_slice(&data[..len]);
        Self {
            addr,
            rssi,
            data: buf,
        }
    }
}

/// Iterator over the `(type, data)` pairs of an AD payload. Stops at the
/// first zero-length or truncated structure.
pub struct AdStructures<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let len = *self.data.get(self.pos)? as usize;
        if len == 0 || self.pos + 1 + len > self.data.len() {
            self.pos = self.data.len();
            return None;
        }
        let ad_type = self.data[self.pos + 1];
        let body = &self.data[self.pos + 2..self.pos + 1 + len];
        self.pos += 1 + len;
        Some((ad_type, body))
    }
}

pub struct AdvParser;

impl AdvParser {
    pub fn structures(ad_data: &[u8]) -> AdStructures<'_> {
        AdStructures {
            data: ad_data,
            pos: 0,
        }
    }

    /// First manufacturer-specific block, company ID included.
    pub fn manufacturer_data(ad_data: &[u8]) -> Option<&[u8]> {
        Self::structures(ad_data)
            .find(|&(ad_type, _)| ad_type == AD_TYPE_MANUFACTURER)
            .map(|(_, body)| body)
    }

    /// Decoded ranging payload, if the report carries one.
    pub fn ranging_payload(ad_data: &[u8]) -> Option<MfgData> {
        MfgData::decode(Self::manufacturer_data(ad_data)?)
    }

    /// Radio-level scan filter: manufacturer data starting with the
    /// company code + marker header.
    pub fn matches_filter(ad_data: &[u8]) -> bool {
        let prefix = codec::filter_prefix();
        Self::structures(ad_data).any(|(ad_type, body)| {
            ad_type == AD_TYPE_MANUFACTURER && body.starts_with(&prefix[..FILTER_PREFIX_LEN])
        })
    }
}

fn push_structure(buf: &mut AdvBuffer, ad_type: u8, body: &[u8]) -> Option<()> {
    let len = u8::try_from(body.len() + 1).ok()?;
    buf.push(len).ok()?;
    buf.push(ad_type).ok()?;
    buf.extend_from_slice(body).ok()
}

/// Primary advertisement: flags and complete local name.
///
/// Returns `None` if the name does not fit a legacy advertisement.
pub fn advertising_data(name: &str) -> Option<AdvBuffer> {
    let mut buf = AdvBuffer::new();
    push_structure(&mut buf, AD_TYPE_FLAGS, &[ADV_FLAGS])?;
    push_structure(&mut buf, AD_TYPE_COMPLETE_NAME, name.as_bytes())?;
    Some(buf)
}

/// Scan response carrying the ranging payload as manufacturer data.
pub fn scan_response_data(payload: &MfgData) -> AdvBuffer {
    let mut buf = AdvBuffer::new();
    // 2 + PAYLOAD_LEN always fits in MAX_ADV_LEN
    let _ = push_structure(&mut buf, AD_TYPE_MANUFACTURER, &payload.encode());
    debug_assert_eq!(buf.len(), 2 + PAYLOAD_LEN);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::{COMPANY_CODE, DEVICE_NAME, SUPPORT_DM_CODE};

    // ── Parsing ─────────────────────────────────────────────────────

    #[test]
    fn finds_manufacturer_block_after_other_structures() {
        let mut ad = AdvBuffer::new();
        ad.extend_from_slice(&[0x02, 0x01, 0x06]).unwrap();
        ad.extend_from_slice(&[0x03, 0x09, b'h', b'i']).unwrap();
        ad.extend_from_slice(&scan_response_data(&MfgData::new(0x1234_5678)))
            .unwrap();

        let mfg = AdvParser::ranging_payload(&ad).unwrap();
        assert_eq!(mfg.access_address, 0x1234_5678);
        assert_eq!(mfg.company_code, COMPANY_CODE);
    }

    #[test]
    fn no_manufacturer_block() {
        let ad = advertising_data(DEVICE_NAME).unwrap();
        assert!(AdvParser::manufacturer_data(&ad).is_none());
        assert!(AdvParser::ranging_payload(&ad).is_none());
        assert!(!AdvParser::matches_filter(&ad));
    }

    #[test]
    fn truncated_structure_stops_walk() {
        // Claims 11 bytes, only 4 follow
        let ad = [0x0B, 0xFF, 0x59, 0x00, 0x5A];
        assert!(AdvParser::manufacturer_data(&ad).is_none());
        assert_eq!(AdvParser::structures(&ad).count(), 0);
    }

    #[test]
    fn zero_length_structure_stops_walk() {
        let ad = [0x00, 0x03, 0xFF, 0x59, 0x00];
        assert!(AdvParser::manufacturer_data(&ad).is_none());
    }

    #[test]
    fn short_manufacturer_block_is_not_ranging() {
        // Company code and marker only, no access address
        let mut ad = AdvBuffer::new();
        ad.extend_from_slice(&[0x07, 0xFF]).unwrap();
        ad.extend_from_slice(&codec::filter_prefix()).unwrap();
        assert!(AdvParser::matches_filter(&ad));
        assert!(AdvParser::ranging_payload(&ad).is_none());
    }

    #[test]
    fn foreign_manufacturer_data_fails_filter() {
        let ad = [0x05, 0xFF, 0x4C, 0x00, 0x02, 0x15];
        assert!(!AdvParser::matches_filter(&ad));
        assert!(AdvParser::ranging_payload(&ad).is_none());
    }

    // ── Building ────────────────────────────────────────────────────

    #[test]
    fn advertising_data_layout() {
        let ad = advertising_data("DM").unwrap();
        assert_eq!(ad.as_slice(), &[0x02, 0x01, 0x06, 0x03, 0x09, b'D', b'M']);
    }

    #[test]
    fn advertising_data_rejects_long_name() {
        let name = "a-name-that-cannot-fit-in-legacy-adv";
        assert!(advertising_data(name).is_none());
    }

    #[test]
    fn scan_response_layout() {
        let sd = scan_response_data(&MfgData::new(0x1234_5678));
        assert_eq!(sd[0], 11);
        assert_eq!(sd[1], AD_TYPE_MANUFACTURER);
        assert_eq!(
            codec::decode(&sd[2..]),
            Some((COMPANY_CODE, SUPPORT_DM_CODE, 0x1234_5678))
        );
    }

    #[test]
    fn report_copy_truncates_oversized_payload() {
        let data = [0xAAu8; 40];
        let report = AdvReport::new(PeerAddress::public([0; 6]), -40, &data);
        assert_eq!(report.data.len(), MAX_ADV_LEN);
    }
}
