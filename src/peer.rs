/// Peer addresses and the bounded peer directory.
///
/// The directory is a fixed-capacity table keyed by link-layer address. It
/// never evicts: once full, new addresses are refused while known ones keep
/// updating in place.
use core::fmt;

use heapless::Vec;

use crate::protocol::MacString;
use crate::ranging::{Quality, RangingResult};

/// Link-layer address type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Public,
    Random,
}

impl AddressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressKind::Public => "public",
            AddressKind::Random => "random",
        }
    }
}

/// A 48-bit BLE device address, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddress {
    pub bytes: [u8; 6],
    pub kind: AddressKind,
}

impl PeerAddress {
    pub const fn public(bytes: [u8; 6]) -> Self {
        Self {
            bytes,
            kind: AddressKind::Public,
        }
    }

    pub const fn random(bytes: [u8; 6]) -> Self {
        Self {
            bytes,
            kind: AddressKind::Random,
        }
    }

    /// Build an address from the over-the-air byte order (least significant first).
    pub fn from_le_bytes(le: [u8; 6], kind: AddressKind) -> Self {
        let mut bytes = le;
        bytes.reverse();
        Self { bytes, kind }
    }

    /// Parse "AA:BB:CC:DD:EE:FF" (case-insensitive).
    pub fn parse(s: &str, kind: AddressKind) -> Option<Self> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next()?;
            // from_str_radix alone would take a leading '+'
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            *byte = u8::from_str_radix(part, 16).ok()?;
        }
        if parts.next().is_some() {
            return None;
        }
        Some(Self { bytes, kind })
    }

    /// Same device regardless of the address type tag.
    pub fn same_device(&self, other: &PeerAddress) -> bool {
        self.bytes == other.bytes
    }

    /// Format into "AA:BB:CC:DD:EE:FF"
    pub fn format(&self, buf: &mut MacString) {
        use core::fmt::Write;
        buf.clear();
        let _ = write!(buf, "{}", self);
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Directory entry for one peer.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub address: PeerAddress,
    /// Seen with a valid protocol payload and accepted
    pub admitted: bool,
    /// Most recent RSSI sample in dBm
    pub last_rssi: Option<i8>,
    /// Access address used on the ranging channel with this peer
    pub access_address: u32,
    /// Best distance estimate from the most recent recorded result, metres
    pub last_distance: Option<f32>,
    pub last_quality: Quality,
    /// Number of ranging results recorded for this peer
    pub results: u32,
}

impl PeerRecord {
    fn new(address: PeerAddress) -> Self {
        Self {
            address,
            admitted: false,
            last_rssi: None,
            access_address: 0,
            last_distance: None,
            last_quality: Quality::None,
            results: 0,
        }
    }
}

/// Directory insertion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryError {
    /// Every slot is taken by another address
    Full,
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryError::Full => f.write_str("peer directory full"),
        }
    }
}

/// Fixed-capacity table of known peers.
pub struct PeerDirectory<const N: usize> {
    peers: Vec<PeerRecord, N>,
}

impl<const N: usize> PeerDirectory<N> {
    pub const fn new() -> Self {
        Self { peers: Vec::new() }
    }

    /// Insert or update a peer and mark it admitted.
    ///
    /// A present address is updated in place; its RSSI is overwritten only
    /// when a new sample is given. A new address is refused when the table is
    /// full.
    pub fn upsert(
        &mut self,
        address: PeerAddress,
        rssi: Option<i8>,
    ) -> Result<&mut PeerRecord, DirectoryError> {
        let idx = match self.position(&address) {
            Some(idx) => idx,
            None => {
                self.peers
                    .push(PeerRecord::new(address))
                    .map_err(|_| DirectoryError::Full)?;
                self.peers.len() - 1
            }
        };

        let record = &mut self.peers[idx];
        record.admitted = true;
        if rssi.is_some() {
            record.last_rssi = rssi;
        }
        Ok(record)
    }

    /// Whether this address has been admitted.
    pub fn supported(&self, address: &PeerAddress) -> bool {
        self.get(address).is_some_and(|r| r.admitted)
    }

    pub fn get(&self, address: &PeerAddress) -> Option<&PeerRecord> {
        self.peers.iter().find(|r| r.address == *address)
    }

    /// Record a ranging outcome for a known peer. Returns false for unknown peers.
    pub fn update_from_ranging_result(&mut self, result: &RangingResult) -> bool {
        let Some(idx) = self.position(&result.peer) else {
            return false;
        };
        let record = &mut self.peers[idx];
        record.last_quality = result.quality;
        record.last_distance = result.distance.map(|d| d.best());
        record.results = record.results.saturating_add(1);
        true
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.peers.is_full()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.iter()
    }

    fn position(&self, address: &PeerAddress) -> Option<usize> {
        self.peers.iter().position(|r| r.address == *address)
    }
}

impl<const N: usize> Default for PeerDirectory<N> {
    fn default() -> Self {
        Self::new()
    }
}
