/// Ranging requests, results and the engine interface.
///
/// The ranging engine is an external collaborator: it accepts one request at
/// a time, performs the exchange on its own schedule and later reports a
/// result. Submission never blocks.
use core::fmt;

use crate::peer::PeerAddress;

/// Side of a ranging exchange. Exactly one peer initiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        }
    }
}

/// Measurement algorithm run by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangingMode {
    /// Round-trip timing
    Rtt,
    /// Multi-carrier phase difference
    #[default]
    Mcpd,
}

impl RangingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangingMode::Rtt => "rtt",
            RangingMode::Mcpd => "mcpd",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("rtt") {
            Some(RangingMode::Rtt)
        } else if s.eq_ignore_ascii_case("mcpd") {
            Some(RangingMode::Mcpd)
        } else {
            None
        }
    }
}

/// Request handed to the ranging engine. Not retained after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangingRequest {
    pub peer: PeerAddress,
    pub role: Role,
    pub mode: RangingMode,
    /// Access address of the ranging channel
    pub access_address: u32,
    /// Delay before the exchange starts, microseconds
    pub start_delay_us: u32,
}

/// Engine-reported quality of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    Ok,
    Poor,
    DoNotUse,
    CrcFail,
    #[default]
    None,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Ok => "ok",
            Quality::Poor => "poor",
            Quality::DoNotUse => "do_not_use",
            Quality::CrcFail => "crc_fail",
            Quality::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(Quality::Ok),
            "poor" => Some(Quality::Poor),
            "do_not_use" => Some(Quality::DoNotUse),
            "crc_fail" => Some(Quality::CrcFail),
            "none" => Some(Quality::None),
            _ => None,
        }
    }
}

/// Distance estimates in metres, shaped by the ranging mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distance {
    Rtt {
        rtt: f32,
    },
    Mcpd {
        ifft: f32,
        phase_slope: f32,
        rssi_openspace: f32,
        best: f32,
    },
}

impl Distance {
    /// Single estimate to use when only one is wanted.
    pub fn best(&self) -> f32 {
        match *self {
            Distance::Rtt { rtt } => rtt,
            Distance::Mcpd { best, .. } => best,
        }
    }

    pub fn mode(&self) -> RangingMode {
        match self {
            Distance::Rtt { .. } => RangingMode::Rtt,
            Distance::Mcpd { .. } => RangingMode::Mcpd,
        }
    }
}

/// Outcome of one ranging exchange, delivered asynchronously by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangingResult {
    pub peer: PeerAddress,
    /// Whether the exchange completed
    pub status: bool,
    pub quality: Quality,
    pub distance: Option<Distance>,
}

/// Immediate refusal of a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The engine refused the request
    Rejected,
    /// No room to queue the request towards the engine
    Busy,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Rejected => f.write_str("ranging request rejected"),
            SubmitError::Busy => f.write_str("ranging engine busy"),
        }
    }
}

/// Request submission side of the external ranging engine.
pub trait RangingEngine {
    /// Fire-and-forget submission. The result arrives later through the
    /// orchestrator's result entry point.
    fn submit(&self, request: &RangingRequest) -> Result<(), SubmitError>;
}

/// Local access address could not be derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessAddressError {
    /// Identity address yields an all-zero access address
    Zero,
}

impl fmt::Display for AccessAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessAddressError::Zero => f.write_str("identity address gives a zero access address"),
        }
    }
}

/// Access address this node offers to initiators: the four least
/// significant bytes of its identity address, little-endian.
pub fn local_access_address(identity: &PeerAddress) -> Result<u32, AccessAddressError> {
    let b = &identity.bytes;
    let aa = u32::from_le_bytes([b[5], b[4], b[3], b[2]]);
    if aa == 0 {
        return Err(AccessAddressError::Zero);
    }
    Ok(aa)
}
