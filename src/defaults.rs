/// Compile-time configuration for the ranging protocol and the roster.
///
/// The roster lists the beacons deployed in the measurement room, in the
/// order the scanner visits them. Addresses are written most significant
/// byte first, the way they are printed.
use crate::peer::PeerAddress;

/// Bluetooth SIG company identifier carried in the payload (Nordic Semiconductor).
pub const COMPANY_CODE: u16 = 0x0059;

/// Capability marker identifying peers that support distance measurement.
pub const SUPPORT_DM_CODE: u32 = 0xFF55_AA5A;

/// Consecutive stalled cycles after which the node cold-restarts.
pub const STALL_THRESHOLD: u8 = 20;

/// Delay before an initiated session starts, giving the responder time to arm.
pub const INITIATOR_START_DELAY_US: u32 = 1000;

/// Number of beacons in the roster.
pub const ROSTER_SIZE: usize = 6;

/// Maximum number of peers tracked by the directory.
pub const DIRECTORY_CAPACITY: usize = 8;

/// Complete local name advertised by beacon and combined nodes.
pub const DEVICE_NAME: &str = "RangeKeeper";

/// Beacon roster, visited strictly in this order.
pub static ROSTER: [PeerAddress; ROSTER_SIZE] = [
    PeerAddress::random([0xEE, 0x6F, 0xEE, 0xA7, 0x34, 0x31]),
    PeerAddress::random([0xDE, 0x64, 0x59, 0x3D, 0x8E, 0x63]),
    PeerAddress::random([0xF1, 0x63, 0xF2, 0xBE, 0x56, 0x44]),
    PeerAddress::random([0xDB, 0x6D, 0x40, 0x6D, 0xA1, 0x0F]),
    PeerAddress::random([0xFF, 0xB4, 0x7D, 0xAB, 0x1B, 0xA2]),
    PeerAddress::random([0xFC, 0x40, 0x5D, 0x54, 0xA7, 0xDD]),
];

/// The only initiator a stand-alone beacon answers scan requests from.
pub const INITIATOR_ADDRESS: PeerAddress =
    PeerAddress::random([0xEC, 0x76, 0x1F, 0xF3, 0x44, 0x79]);

/// Active scan interval in milliseconds.
pub const SCAN_INTERVAL_MS: u16 = 100;

/// Active scan window in milliseconds.
pub const SCAN_WINDOW_MS: u16 = 99;

/// Period of the status report sent to the host, in seconds.
pub const STATUS_PERIOD_SECS: u64 = 30;
