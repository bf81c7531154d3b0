/// JSON message protocol between a RangeKeeper node and its host.
///
/// All messages are newline-delimited JSON (NDJSON). The host side is either
/// a logging laptop or the ranging coprocessor: requests go out as `request`
/// messages, and the coprocessor answers with `result` and `scanned`
/// commands. Uses `heapless` types for no_std/no-alloc operation.
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::peer::PeerAddress;
use crate::ranging::{RangingMode, RangingResult};

/// Maximum length for MAC address strings ("AA:BB:CC:DD:EE:FF")
pub type MacString = String<18>;

/// Short enum-like string fields in commands ("mcpd", "random", "do_not_use")
pub type TagString = String<12>;

/// Messages sent from the device to the host
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    /// Completed ranging measurement
    #[serde(rename = "range")]
    Range {
        mac: &'a MacString,
        /// "ok", "poor", "do_not_use", "crc_fail", "none"
        quality: &'static str,
        /// Last RSSI sample for the peer
        #[serde(skip_serializing_if = "Option::is_none")]
        rssi: Option<i8>,
        mode: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        rtt: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        ifft: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        phase_slope: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rssi_openspace: Option<f32>,
        /// Best estimate in metres
        best: f32,
        /// Uptime in milliseconds when reported
        ts: u32,
    },
    /// Ranging request for the coprocessor
    #[serde(rename = "request")]
    Request {
        mac: &'a MacString,
        /// "public" or "random"
        addr_type: &'static str,
        role: &'static str,
        mode: &'static str,
        /// Access address of the ranging channel
        aa: u32,
        /// Start delay in microseconds
        delay: u32,
    },
    /// Device status report
    #[serde(rename = "status")]
    Status {
        running: bool,
        /// Uptime in seconds
        uptime: u32,
        role: &'static str,
        /// Scheduler state: "idle", "awaiting", "stalled"
        state: &'static str,
        /// Roster index the scheduler waits for
        cursor: u8,
        stalls: u8,
        /// Session gate held (a ranging session is in flight)
        gate: bool,
        /// Admitted peers in the directory
        peers: u8,
        /// Ranging requests accepted since boot
        sessions: u32,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
}

/// Commands sent from the host to the device.
///
/// Deserialized manually via [`RawCommand`] in `comm::parse_command()` because
/// `serde_json_core` does not support internally tagged enums (`deserialize_any`).
#[derive(Debug, PartialEq)]
pub enum HostCommand {
    /// Resume dispatching ranging requests
    Start,
    /// Stop dispatching ranging requests
    Stop,
    /// Request current status
    GetStatus,
    /// Switch the ranging algorithm
    SetMode { mode: RangingMode },
    /// Ranging engine result
    Result(RangingResult),
    /// Scan request received by the coprocessor radio
    Scanned { addr: PeerAddress },
}

/// Wire format for host commands: a flat struct that `serde_json_core` can
/// deserialize without `deserialize_any`. Converted to [`HostCommand`] in
/// `comm::parse_command()`.
#[derive(Deserialize)]
pub(crate) struct RawCommand {
    pub cmd: String<16>,
    #[serde(default)]
    pub mode: Option<TagString>,
    #[serde(default)]
    pub mac: Option<MacString>,
    #[serde(default)]
    pub addr_type: Option<TagString>,
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub quality: Option<TagString>,
    #[serde(default)]
    pub rtt: Option<f32>,
    #[serde(default)]
    pub ifft: Option<f32>,
    #[serde(default)]
    pub phase_slope: Option<f32>,
    #[serde(default)]
    pub rssi_openspace: Option<f32>,
    #[serde(default)]
    pub best: Option<f32>,
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 256;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;

#[cfg(test)]
mod tests {
    use super::*;

    fn render(msg: &DeviceMessage) -> std::string::String {
        let mut buf = [0u8; MAX_MSG_LEN];
        let len = serde_json_core::to_slice(msg, &mut buf).unwrap();
        core::str::from_utf8(&buf[..len]).unwrap().into()
    }

    // ── DeviceMessage serialization ─────────────────────────────────

    #[test]
    fn serialize_status_message() {
        let msg = DeviceMessage::Status {
            running: true,
            uptime: 120,
            role: "scanner",
            state: "awaiting",
            cursor: 3,
            stalls: 0,
            gate: true,
            peers: 6,
            sessions: 42,
            board: "test_board",
            version: "0.1.0",
        };
        let json = render(&msg);
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""running":true"#));
        assert!(json.contains(r#""role":"scanner""#));
        assert!(json.contains(r#""cursor":3"#));
        assert!(json.contains(r#""gate":true"#));
        assert!(json.contains(r#""sessions":42"#));
        assert!(json.contains(r#""board":"test_board""#));
    }

    #[test]
    fn serialize_request_message() {
        let mac = MacString::try_from("EE:6F:EE:A7:34:31").unwrap();
        let msg = DeviceMessage::Request {
            mac: &mac,
            addr_type: "random",
            role: "initiator",
            mode: "mcpd",
            aa: 0x1234_5678,
            delay: 1000,
        };
        let json = render(&msg);
        assert!(json.contains(r#""type":"request""#));
        assert!(json.contains(r#""mac":"EE:6F:EE:A7:34:31""#));
        assert!(json.contains(r#""role":"initiator""#));
        assert!(json.contains(r#""aa":305419896"#));
        assert!(json.contains(r#""delay":1000"#));
    }

    #[test]
    fn serialize_rtt_range_omits_mcpd_fields() {
        let mac = MacString::try_from("DE:64:59:3D:8E:63").unwrap();
        let msg = DeviceMessage::Range {
            mac: &mac,
            quality: "ok",
            rssi: Some(-61),
            mode: "rtt",
            rtt: Some(2.5),
            ifft: None,
            phase_slope: None,
            rssi_openspace: None,
            best: 2.5,
            ts: 5000,
        };
        let json = render(&msg);
        assert!(json.contains(r#""type":"range""#));
        assert!(json.contains(r#""quality":"ok""#));
        assert!(json.contains(r#""rssi":-61"#));
        assert!(json.contains(r#""rtt":"#));
        assert!(!json.contains("ifft"));
        assert!(!json.contains("phase_slope"));
    }

    #[test]
    fn serialize_range_without_rssi() {
        let mac = MacString::try_from("DE:64:59:3D:8E:63").unwrap();
        let msg = DeviceMessage::Range {
            mac: &mac,
            quality: "poor",
            rssi: None,
            mode: "mcpd",
            rtt: None,
            ifft: Some(1.0),
            phase_slope: Some(1.5),
            rssi_openspace: Some(3.0),
            best: 1.0,
            ts: 0,
        };
        let json = render(&msg);
        assert!(!json.contains(r#""rssi""#));
        assert!(json.contains(r#""rssi_openspace":"#));
        assert!(json.contains(r#""mode":"mcpd""#));
    }

    // ── Version constant ────────────────────────────────────────────

    #[test]
    fn version_is_semver() {
        let parts: heapless::Vec<&str, 4> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION should be semver (major.minor.patch)");
        for part in &parts {
            assert!(part.parse::<u32>().is_ok(), "'{part}' is not a number");
        }
    }
}
