/// Host link: NDJSON serialization, command parsing and line assembly.
///
/// The device writes reports and ranging requests as newline-delimited JSON
/// on its serial console and reads commands from the same port. Everything
/// here is allocation-free and usable from any thread.
use crate::dispatch::{OrchestratorConfig, Snapshot};
use crate::peer::{AddressKind, PeerAddress};
use crate::protocol::{DeviceMessage, HostCommand, MacString, MsgBuffer, RawCommand, MAX_MSG_LEN};
use crate::ranging::{Distance, Quality, RangingMode, RangingRequest, RangingResult};

// ── Serialization helpers ──────────────────────────────────────────────

/// Serialize a DeviceMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    let len = serde_json_core::to_slice(msg, buf).ok()?;
    // Append newline for NDJSON; a message that fills the buffer is dropped
    // rather than sent unterminated
    *buf.get_mut(len)? = b'\n';
    Some(len + 1)
}

/// Serialize into an owned, newline-terminated message buffer.
pub fn to_buffer(msg: &DeviceMessage) -> Option<MsgBuffer> {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok()?;
    let len = serialize_message(msg, &mut buf)?;
    buf.truncate(len);
    Some(buf)
}

/// `request` message forwarding a ranging request to the coprocessor.
pub fn request_message(request: &RangingRequest) -> Option<MsgBuffer> {
    let mut mac = MacString::new();
    request.peer.format(&mut mac);
    to_buffer(&DeviceMessage::Request {
        mac: &mac,
        addr_type: request.peer.kind.as_str(),
        role: request.role.as_str(),
        mode: request.mode.as_str(),
        aa: request.access_address,
        delay: request.start_delay_us,
    })
}

/// `range` report for a completed measurement. `None` when the result has
/// no distance to report.
pub fn range_report(result: &RangingResult, rssi: Option<i8>, ts: u32) -> Option<MsgBuffer> {
    let distance = result.distance?;
    let mut mac = MacString::new();
    result.peer.format(&mut mac);

    let (rtt, ifft, phase_slope, rssi_openspace) = match distance {
        Distance::Rtt { rtt } => (Some(rtt), None, None, None),
        Distance::Mcpd {
            ifft,
            phase_slope,
            rssi_openspace,
            ..
        } => (None, Some(ifft), Some(phase_slope), Some(rssi_openspace)),
    };

    to_buffer(&DeviceMessage::Range {
        mac: &mac,
        quality: result.quality.as_str(),
        rssi,
        mode: distance.mode().as_str(),
        rtt,
        ifft,
        phase_slope,
        rssi_openspace,
        best: distance.best(),
        ts,
    })
}

/// `status` report from an orchestrator snapshot.
pub fn status_message(
    snapshot: &Snapshot,
    running: bool,
    uptime: u32,
    board: &'static str,
    version: &'static str,
) -> Option<MsgBuffer> {
    to_buffer(&DeviceMessage::Status {
        running,
        uptime,
        role: snapshot.role.as_str(),
        state: snapshot.state.as_str(),
        cursor: u8::try_from(snapshot.cursor).unwrap_or(u8::MAX),
        stalls: snapshot.stalls,
        gate: snapshot.gate_held,
        peers: u8::try_from(snapshot.peers).unwrap_or(u8::MAX),
        sessions: snapshot.sessions,
        board,
        version,
    })
}

// ── Command parsing ────────────────────────────────────────────────────

/// Deserialize a HostCommand from a JSON byte slice.
///
/// Unknown commands and commands missing required fields yield `None`.
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    let trimmed = data.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _) = serde_json_core::from_slice::<RawCommand>(trimmed).ok()?;

    match raw.cmd.as_str() {
        "start" => Some(HostCommand::Start),
        "stop" => Some(HostCommand::Stop),
        "status" => Some(HostCommand::GetStatus),
        "set_mode" => {
            let mode = RangingMode::parse(raw.mode.as_deref()?)?;
            Some(HostCommand::SetMode { mode })
        }
        "scanned" => Some(HostCommand::Scanned {
            addr: parse_address(&raw)?,
        }),
        "result" => {
            let peer = parse_address(&raw)?;
            let quality = match raw.quality.as_deref() {
                Some(q) => Quality::parse(q)?,
                None => Quality::None,
            };
            let distance = if let Some(rtt) = raw.rtt {
                Some(Distance::Rtt { rtt })
            } else {
                raw.best.map(|best| Distance::Mcpd {
                    ifft: raw.ifft.unwrap_or(best),
                    phase_slope: raw.phase_slope.unwrap_or(best),
                    rssi_openspace: raw.rssi_openspace.unwrap_or(best),
                    best,
                })
            };
            Some(HostCommand::Result(RangingResult {
                peer,
                status: raw.ok.unwrap_or(false),
                quality,
                distance,
            }))
        }
        _ => None,
    }
}

fn parse_address(raw: &RawCommand) -> Option<PeerAddress> {
    let kind = match raw.addr_type.as_deref() {
        None | Some("random") => AddressKind::Random,
        Some("public") => AddressKind::Public,
        Some(_) => return None,
    };
    PeerAddress::parse(raw.mac.as_deref()?, kind)
}

/// Apply a configuration command. Returns true if the configuration changed.
/// Event-like commands (`result`, `scanned`, `status`) are left to the caller.
pub fn handle_command(cmd: &HostCommand, config: &mut OrchestratorConfig) -> bool {
    let before = *config;
    match cmd {
        HostCommand::Start => {
            config.running = true;
            log::info!("Ranging started by host command");
        }
        HostCommand::Stop => {
            config.running = false;
            log::info!("Ranging stopped by host command");
        }
        HostCommand::SetMode { mode } => {
            config.mode = *mode;
            log::info!("Ranging mode set to {}", mode.as_str());
        }
        HostCommand::GetStatus | HostCommand::Result(_) | HostCommand::Scanned { .. } => {}
    }
    *config != before
}

// ── Serial NDJSON reader ───────────────────────────────────────────────

/// Serial NDJSON reader state machine.
///
/// Accumulates bytes until a newline is found, then yields the line. A line
/// longer than the buffer is discarded up to and including its newline.
pub struct LineReader<const N: usize = MAX_MSG_LEN> {
    buf: [u8; N],
    pos: usize,
    overflowed: bool,
}

impl<const N: usize> LineReader<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            pos: 0,
            overflowed: false,
        }
    }

    /// Feed a byte into the reader. Returns a complete, non-empty line
    /// (without newline) when one is detected.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        match byte {
            b'\n' | b'\r' => {
                let len = core::mem::take(&mut self.pos);
                if core::mem::take(&mut self.overflowed) || len == 0 {
                    None
                } else {
                    Some(&self.buf[..len])
                }
            }
            _ if self.overflowed => None,
            _ if self.pos < N => {
                self.buf[self.pos] = byte;
                self.pos += 1;
                None
            }
            _ => {
                self.overflowed = true;
                self.pos = 0;
                None
            }
        }
    }
}

impl<const N: usize> Default for LineReader<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::NodeRole;
    use crate::ranging::Role;
    use crate::roster::SchedulerState;

    fn text(buf: &MsgBuffer) -> &str {
        core::str::from_utf8(buf).unwrap()
    }

    fn feed_all<const N: usize>(reader: &mut LineReader<N>, bytes: &[u8]) -> Option<Vec<u8>> {
        let mut last = None;
        for &b in bytes {
            if let Some(line) = reader.feed(b) {
                last = Some(line.to_vec());
            }
        }
        last
    }

    // ── Command parsing ─────────────────────────────────────────────

    #[test]
    fn parse_simple_commands() {
        assert_eq!(parse_command(br#"{"cmd":"start"}"#), Some(HostCommand::Start));
        assert_eq!(parse_command(br#"{"cmd":"stop"}"#), Some(HostCommand::Stop));
        assert_eq!(parse_command(b"{\"cmd\":\"status\"}\r\n"), Some(HostCommand::GetStatus));
    }

    #[test]
    fn parse_set_mode() {
        assert_eq!(
            parse_command(br#"{"cmd":"set_mode","mode":"rtt"}"#),
            Some(HostCommand::SetMode { mode: RangingMode::Rtt })
        );
        assert_eq!(parse_command(br#"{"cmd":"set_mode","mode":"laser"}"#), None);
        assert_eq!(parse_command(br#"{"cmd":"set_mode"}"#), None);
    }

    #[test]
    fn parse_scanned_defaults_to_random_address() {
        let cmd = parse_command(br#"{"cmd":"scanned","mac":"EC:76:1F:F3:44:79"}"#).unwrap();
        assert_eq!(
            cmd,
            HostCommand::Scanned {
                addr: PeerAddress::random([0xEC, 0x76, 0x1F, 0xF3, 0x44, 0x79])
            }
        );
        let cmd = parse_command(
            br#"{"cmd":"scanned","mac":"EC:76:1F:F3:44:79","addr_type":"public"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            HostCommand::Scanned {
                addr: PeerAddress::public([0xEC, 0x76, 0x1F, 0xF3, 0x44, 0x79])
            }
        );
    }

    #[test]
    fn parse_mcpd_result() {
        let cmd = parse_command(
            br#"{"cmd":"result","mac":"EE:6F:EE:A7:34:31","ok":true,"quality":"ok","ifft":1.5,"phase_slope":1.75,"rssi_openspace":3.0,"best":1.5}"#,
        )
        .unwrap();
        let HostCommand::Result(result) = cmd else {
            panic!("expected result, got {cmd:?}");
        };
        assert_eq!(result.peer, PeerAddress::random([0xEE, 0x6F, 0xEE, 0xA7, 0x34, 0x31]));
        assert!(result.status);
        assert_eq!(result.quality, Quality::Ok);
        assert_eq!(
            result.distance,
            Some(Distance::Mcpd {
                ifft: 1.5,
                phase_slope: 1.75,
                rssi_openspace: 3.0,
                best: 1.5
            })
        );
    }

    #[test]
    fn parse_failed_result_without_distance() {
        let cmd = parse_command(br#"{"cmd":"result","mac":"EE:6F:EE:A7:34:31","ok":false}"#).unwrap();
        let HostCommand::Result(result) = cmd else {
            panic!("expected result");
        };
        assert!(!result.status);
        assert_eq!(result.quality, Quality::None);
        assert!(result.distance.is_none());
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(parse_command(b""), None);
        assert_eq!(parse_command(b"   \n"), None);
        assert_eq!(parse_command(b"not json"), None);
        assert_eq!(parse_command(br#"{"cmd":"reboot"}"#), None);
        assert_eq!(parse_command(br#"{"cmd":"scanned","mac":"nope"}"#), None);
        assert_eq!(parse_command(br#"{"cmd":"scanned"}"#), None);
        assert_eq!(
            parse_command(br#"{"cmd":"result","mac":"EE:6F:EE:A7:34:31","quality":"great"}"#),
            None
        );
    }

    // ── Command handling ────────────────────────────────────────────

    #[test]
    fn handle_start_stop() {
        let mut config = OrchestratorConfig::new();
        assert!(handle_command(&HostCommand::Stop, &mut config));
        assert!(!config.running);
        assert!(!handle_command(&HostCommand::Stop, &mut config));
        assert!(handle_command(&HostCommand::Start, &mut config));
        assert!(config.running);
    }

    #[test]
    fn handle_set_mode() {
        let mut config = OrchestratorConfig::new();
        assert!(handle_command(&HostCommand::SetMode { mode: RangingMode::Rtt }, &mut config));
        assert_eq!(config.mode, RangingMode::Rtt);
    }

    #[test]
    fn handle_leaves_config_for_event_commands() {
        let mut config = OrchestratorConfig::new();
        assert!(!handle_command(&HostCommand::GetStatus, &mut config));
        assert_eq!(config, OrchestratorConfig::new());
    }

    // ── Outgoing messages ───────────────────────────────────────────

    #[test]
    fn request_message_is_ndjson() {
        let req = RangingRequest {
            peer: PeerAddress::random([0xEE, 0x6F, 0xEE, 0xA7, 0x34, 0x31]),
            role: Role::Initiator,
            mode: RangingMode::Mcpd,
            access_address: 0x1234_5678,
            start_delay_us: 1000,
        };
        let buf = request_message(&req).unwrap();
        let s = text(&buf);
        assert!(s.ends_with('\n'));
        assert_eq!(s.matches('\n').count(), 1);
        assert!(s.contains(r#""mac":"EE:6F:EE:A7:34:31""#));
        assert!(s.contains(r#""addr_type":"random""#));
        assert!(s.contains(r#""role":"initiator""#));
    }

    #[test]
    fn request_message_output_parses_back_as_address() {
        let req = RangingRequest {
            peer: PeerAddress::public([0xEC, 0x76, 0x1F, 0xF3, 0x44, 0x79]),
            role: Role::Responder,
            mode: RangingMode::Rtt,
            access_address: 1,
            start_delay_us: 0,
        };
        let buf = request_message(&req).unwrap();
        let s = text(&buf);
        assert!(s.contains(r#""addr_type":"public""#));
        assert!(s.contains(r#""role":"responder""#));
        assert!(s.contains(r#""mode":"rtt""#));
    }

    #[test]
    fn range_report_needs_distance() {
        let result = RangingResult {
            peer: PeerAddress::random([1, 2, 3, 4, 5, 6]),
            status: true,
            quality: Quality::Poor,
            distance: None,
        };
        assert!(range_report(&result, None, 0).is_none());

        let with_distance = RangingResult {
            distance: Some(Distance::Rtt { rtt: 4.0 }),
            ..result
        };
        let buf = range_report(&with_distance, Some(-70), 1234).unwrap();
        let s = text(&buf);
        assert!(s.contains(r#""type":"range""#));
        assert!(s.contains(r#""quality":"poor""#));
        assert!(s.contains(r#""mode":"rtt""#));
        assert!(s.contains(r#""rssi":-70"#));
        assert!(s.contains(r#""ts":1234"#));
    }

    #[test]
    fn status_message_from_snapshot() {
        let snapshot = Snapshot {
            role: NodeRole::Combined,
            state: SchedulerState::AwaitingPeer,
            cursor: 2,
            stalls: 4,
            peers: 3,
            sessions: 17,
            gate_held: true,
        };
        let buf = status_message(&snapshot, false, 60, "board", "1.2.3").unwrap();
        let s = text(&buf);
        assert!(s.contains(r#""type":"status""#));
        assert!(s.contains(r#""running":false"#));
        assert!(s.contains(r#""role":"combined""#));
        assert!(s.contains(r#""state":"awaiting""#));
        assert!(s.contains(r#""stalls":4"#));
        assert!(s.contains(r#""gate":true"#));
        assert!(s.contains(r#""version":"1.2.3""#));
    }

    #[test]
    fn serialize_drops_message_without_room_for_newline() {
        let msg = DeviceMessage::Status {
            running: true,
            uptime: 0,
            role: "scanner",
            state: "idle",
            cursor: 0,
            stalls: 0,
            gate: false,
            peers: 0,
            sessions: 0,
            board: "b",
            version: "v",
        };
        let mut big = [0u8; 256];
        let len = serialize_message(&msg, &mut big).unwrap();
        let mut exact = std::vec![0u8; len - 1];
        assert!(serialize_message(&msg, &mut exact).is_none());
    }

    // ── LineReader ──────────────────────────────────────────────────

    #[test]
    fn line_reader_splits_on_newline() {
        let mut reader = LineReader::<64>::new();
        assert_eq!(feed_all(&mut reader, b"{\"cmd\":\"start\"}\n").unwrap(), b"{\"cmd\":\"start\"}");
        assert!(feed_all(&mut reader, b"\r\n\n").is_none());
    }

    #[test]
    fn line_reader_discards_overlong_line() {
        let mut reader = LineReader::<8>::new();
        assert!(feed_all(&mut reader, b"0123456789abcdef\n").is_none());
        // Next line is intact
        assert_eq!(feed_all(&mut reader, b"ok\n").unwrap(), b"ok");
    }

    #[test]
    fn line_reader_accepts_exact_fit() {
        let mut reader = LineReader::<4>::new();
        assert_eq!(feed_all(&mut reader, b"abcd\n").unwrap(), b"abcd");
    }
}
