//! RangeKeeper: ESP-IDF std firmware
//!
//! Thread-based node using FreeRTOS threads and std::sync::mpsc channels.
//! NimBLE (via esp32-nimble) provides the advertising set and active
//! scanning. The ranging coprocessor sits on the USB serial console: it reads
//! `request` lines and answers with `result` and `scanned` commands. Log
//! output shares the console, so the host ignores lines that are not JSON.
//!
//! The node role is chosen at build time with the `scanner`, `beacon` or
//! `combined` feature.

use std::fmt::Debug;
use std::io::{Read, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use esp32_nimble::{BLEAddress, BLEAddressType, BLEDevice, BLEScan};
use esp_idf_svc::hal::task::block_on;

use rangekeeper::codec::MfgData;
use rangekeeper::comm::{self, LineReader};
use rangekeeper::defaults::{self, DIRECTORY_CAPACITY, ROSTER_SIZE};
use rangekeeper::dispatch::{NodeRole, Orchestrator, Outcome, RadioEvent};
use rangekeeper::gate::SessionGate;
use rangekeeper::peer::{AddressKind, PeerAddress};
use rangekeeper::protocol::{HostCommand, MsgBuffer, VERSION};
use rangekeeper::ranging::{self, RangingEngine, RangingRequest, SubmitError};
use rangekeeper::roster::Restart;
use rangekeeper::scanner::{self, AdvParser, AdvReport};
use rangekeeper::board;

#[cfg(all(feature = "beacon", not(feature = "combined")))]
const ROLE: NodeRole = NodeRole::Beacon;
#[cfg(feature = "combined")]
const ROLE: NodeRole = NodeRole::Combined;
#[cfg(not(any(feature = "beacon", feature = "combined")))]
const ROLE: NodeRole = NodeRole::Scanner;

type NodeOrchestrator = Orchestrator<'static, ROSTER_SIZE, DIRECTORY_CAPACITY>;

// ── Shared state ─────────────────────────────────────────────────────

/// Session gate. Starts held so nothing is dispatched before bring-up ends.
static GATE: SessionGate = SessionGate::closed();

/// Back-off after a failed scan round
const SCAN_RETRY_MS: u64 = 1000;

/// Boot time, captured once in main, used for uptime calculation.
static BOOT_INSTANT: Mutex<Option<Instant>> = Mutex::new(None);

fn uptime_secs() -> u32 {
    BOOT_INSTANT
        .lock()
        .ok()
        .and_then(|i| i.map(|boot| boot.elapsed().as_secs() as u32))
        .unwrap_or(0)
}

fn uptime_millis_u32() -> u32 {
    BOOT_INSTANT
        .lock()
        .ok()
        .and_then(|i| i.map(|boot| (boot.elapsed().as_millis() & 0xFFFF_FFFF) as u32))
        .unwrap_or(0)
}

/// Everything the orchestrator thread reacts to.
enum NodeEvent {
    /// Filter-matching advertisement from the scan callback
    Advertisement(AdvReport),
    /// Command line from the host / coprocessor
    Command(HostCommand),
    /// Periodic status report
    StatusTick,
}

// ── External collaborators ───────────────────────────────────────────

/// Ranging engine reached over the serial link.
struct LinkEngine {
    output_tx: SyncSender<MsgBuffer>,
}

impl RangingEngine for LinkEngine {
    fn submit(&self, request: &RangingRequest) -> Result<(), SubmitError> {
        let msg = comm::request_message(request).ok_or(SubmitError::Rejected)?;
        self.output_tx.try_send(msg).map_err(|_| SubmitError::Busy)
    }
}

struct ColdRestart;

impl Restart for ColdRestart {
    fn cold_restart(&self) {
        log::error!("Cold restart");
        esp_idf_svc::hal::reset::restart();
    }
}

fn ble_err(e: impl Debug) -> anyhow::Error {
    anyhow::anyhow!("BLE error: {:?}", e)
}

fn to_peer(addr: &BLEAddress) -> PeerAddress {
    let kind = match addr.addr_type() {
        BLEAddressType::Public => AddressKind::Public,
        _ => AddressKind::Random,
    };
    PeerAddress {
        bytes: addr.as_be_bytes(),
        kind,
    }
}

fn main() -> anyhow::Result<()> {
    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    if let Ok(mut boot) = BOOT_INSTANT.lock() {
        *boot = Some(Instant::now());
    }

    log::info!(
        "RangeKeeper v{} starting on {} ({}) as {}",
        VERSION,
        board::BOARD_NAME,
        board::CHIP,
        ROLE.as_str()
    );
    log::info!(
        "Roster: {} peers, stall threshold {}, initiator delay {} us",
        ROSTER_SIZE,
        defaults::STALL_THRESHOLD,
        defaults::INITIATOR_START_DELAY_US,
    );

    // ── Channels ─────────────────────────────────────────────────────

    let (event_tx, event_rx) = mpsc::sync_channel::<NodeEvent>(16);
    let (output_tx, output_rx) = mpsc::sync_channel::<MsgBuffer>(8);

    // ── Identity ─────────────────────────────────────────────────────

    let ble_device = BLEDevice::take();
    let identity = to_peer(&ble_device.get_addr().map_err(ble_err)?);
    let local_aa = match ranging::local_access_address(&identity) {
        Ok(aa) => aa,
        Err(e) => {
            log::error!("Failed to prepare access address for {}: {}", identity, e);
            0
        }
    };
    log::info!("Identity {} ({}), access address {:#010x}", identity, identity.kind.as_str(), local_aa);

    let orchestrator: NodeOrchestrator = Orchestrator::new(
        ROLE,
        &GATE,
        defaults::ROSTER,
        defaults::STALL_THRESHOLD,
        local_aa,
    )
    .with_initiator(defaults::INITIATOR_ADDRESS);

    // ── Output thread ────────────────────────────────────────────────

    thread::Builder::new()
        .name("output".into())
        .stack_size(4096)
        .spawn(move || output_thread(output_rx))?;
    log::info!("Output thread spawned");

    // ── Orchestrator thread ──────────────────────────────────────────

    let orch_output_tx = output_tx.clone();
    thread::Builder::new()
        .name("orchestrator".into())
        .stack_size(6144)
        .spawn(move || orchestrator_thread(orchestrator, event_rx, orch_output_tx))?;
    log::info!("Orchestrator thread spawned");

    // ── Serial command thread ────────────────────────────────────────

    let serial_event_tx = event_tx.clone();
    thread::Builder::new()
        .name("serial".into())
        .stack_size(4096)
        .spawn(move || serial_input_thread(serial_event_tx))?;
    log::info!("Serial thread spawned");

    // ── Status thread ────────────────────────────────────────────────

    let status_event_tx = event_tx.clone();
    thread::Builder::new()
        .name("status".into())
        .stack_size(2048)
        .spawn(move || status_thread(status_event_tx))?;

    // ── Radio ────────────────────────────────────────────────────────

    if ROLE.advertises() {
        start_advertising(ble_device, local_aa)?;
    }

    if ROLE.scans() {
        let scan_event_tx = event_tx.clone();
        thread::Builder::new()
            .name("blescan".into())
            .stack_size(4096)
            .spawn(move || ble_scan_thread(scan_event_tx))?;
        log::info!("BLE scan thread spawned");
    }

    GATE.release();
    log::info!("Bring-up complete, ranging enabled");

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

// ── Advertising ──────────────────────────────────────────────────────

/// Scannable advertising set: name in the advertisement, ranging payload in
/// the scan response.
fn start_advertising(ble_device: &BLEDevice, access_address: u32) -> anyhow::Result<()> {
    let adv_data = scanner::advertising_data(defaults::DEVICE_NAME)
        .ok_or_else(|| anyhow::anyhow!("device name does not fit an advertisement"))?;
    let scan_rsp = scanner::scan_response_data(&MfgData::new(access_address));

    let mut advertising = ble_device.get_advertising().lock();
    advertising.scan_response(true);
    advertising.set_raw_data(&adv_data).map_err(ble_err)?;
    advertising.set_raw_scan_response_data(&scan_rsp).map_err(ble_err)?;
    advertising.start().map_err(ble_err)?;

    log::info!("BLE advertising as '{}'", defaults::DEVICE_NAME);
    Ok(())
}

// ── BLE scan thread ──────────────────────────────────────────────────

/// Active scan. The callback runs in the NimBLE host task and must not
/// block, so reports are copied and handed over with `try_send`.
fn ble_scan_thread(event_tx: SyncSender<NodeEvent>) {
    log::info!("BLE scan thread started");

    let ble_device = BLEDevice::take();
    let mut scan = BLEScan::new();
    scan.active_scan(true)
        .interval(defaults::SCAN_INTERVAL_MS)
        .window(defaults::SCAN_WINDOW_MS);

    // Run scan in a loop with 5-second rounds
    loop {
        let round = block_on(scan.start(ble_device, 5000, |device, data| {
            let payload = data.payload();
            if AdvParser::matches_filter(payload) {
                let addr = device.addr();
                let report = AdvReport::new(to_peer(&addr), device.rssi(), payload);
                let _ = event_tx.try_send(NodeEvent::Advertisement(report));
            }
            None::<()> // Continue scanning
        }));
        if let Err(e) = round {
            log::warn!("BLE scan failed: {:?}", e);
            thread::sleep(Duration::from_millis(SCAN_RETRY_MS));
        }
    }
}

// ── Orchestrator thread ──────────────────────────────────────────────

fn orchestrator_thread(
    mut orch: NodeOrchestrator,
    event_rx: Receiver<NodeEvent>,
    output_tx: SyncSender<MsgBuffer>,
) {
    log::info!("Orchestrator thread started");

    let engine = LinkEngine {
        output_tx: output_tx.clone(),
    };
    let restart = ColdRestart;

    while let Ok(event) = event_rx.recv() {
        match event {
            NodeEvent::Advertisement(report) => {
                let outcome = orch.handle_event(
                    RadioEvent::Advertisement {
                        addr: report.addr,
                        rssi: report.rssi,
                        data: &report.data,
                    },
                    &engine,
                    &restart,
                );
                log_outcome(&report.addr, outcome);
            }
            NodeEvent::Command(HostCommand::Scanned { addr }) => {
                let outcome = orch.handle_event(RadioEvent::ScanRequest { addr }, &engine, &restart);
                log_outcome(&addr, outcome);
            }
            NodeEvent::Command(HostCommand::Result(result)) => {
                if orch.on_result(&result) {
                    let rssi = orch
                        .directory()
                        .get(&result.peer)
                        .and_then(|r| r.last_rssi);
                    if let Some(msg) = comm::range_report(&result, rssi, uptime_millis_u32()) {
                        let _ = output_tx.try_send(msg);
                    }
                }
            }
            NodeEvent::Command(HostCommand::GetStatus) | NodeEvent::StatusTick => {
                send_status(&orch, &output_tx);
            }
            NodeEvent::Command(cmd) => {
                comm::handle_command(&cmd, orch.config_mut());
            }
        }
    }
}

fn log_outcome(addr: &PeerAddress, outcome: Outcome) {
    match outcome {
        Outcome::Dispatched(role) => log::info!("Ranging {} as {}", addr, role.as_str()),
        Outcome::Stalled { stalls } => log::debug!("{} seen while busy ({} stalls)", addr, stalls),
        Outcome::Busy => log::debug!("{} scan request dropped, session in flight", addr),
        Outcome::Restarting => log::error!("Stall threshold reached"),
        Outcome::Rejected(_)
        | Outcome::Ignored
        | Outcome::Malformed
        | Outcome::Paused => {}
    }
}

fn send_status(orch: &NodeOrchestrator, output_tx: &SyncSender<MsgBuffer>) {
    let snapshot = orch.snapshot();
    if let Some(next) = orch.scheduler().expected() {
        log::debug!("Waiting for {} (slot {})", next, snapshot.cursor);
    }
    for record in orch.directory().iter() {
        log::debug!(
            "Peer {}: rssi {:?}, aa {:#010x}, {} results, last {:?} m ({})",
            record.address,
            record.last_rssi,
            record.access_address,
            record.results,
            record.last_distance,
            record.last_quality.as_str(),
        );
    }
    if let Some(msg) = comm::status_message(
        &snapshot,
        orch.config().running,
        uptime_secs(),
        board::BOARD_NAME,
        VERSION,
    ) {
        let _ = output_tx.try_send(msg);
    }
}

// ── Output thread ────────────────────────────────────────────────────

fn output_thread(output_rx: Receiver<MsgBuffer>) {
    log::info!("Output thread started");

    let mut stdout = std::io::stdout();
    while let Ok(msg) = output_rx.recv() {
        if stdout.write_all(&msg).and_then(|_| stdout.flush()).is_err() {
            log::warn!("Serial write failed");
        }
    }
}

// ── Serial command thread ────────────────────────────────────────────

fn serial_input_thread(event_tx: SyncSender<NodeEvent>) {
    log::info!("Serial thread started");

    let mut reader: LineReader = LineReader::new();
    let mut stdin = std::io::stdin();
    let mut chunk = [0u8; 64];

    loop {
        let n = match stdin.read(&mut chunk) {
            Ok(n) if n > 0 => n,
            // Console reads are non-blocking on ESP-IDF
            _ => {
                thread::sleep(Duration::from_millis(20));
                continue;
            }
        };
        for &byte in &chunk[..n] {
            let Some(line) = reader.feed(byte) else {
                continue;
            };
            match comm::parse_command(line) {
                // Results free the session gate; never drop them
                Some(cmd) => {
                    if event_tx.send(NodeEvent::Command(cmd)).is_err() {
                        return;
                    }
                }
                None => log::warn!("Unrecognized command line"),
            }
        }
    }
}

// ── Status thread ────────────────────────────────────────────────────

fn status_thread(event_tx: SyncSender<NodeEvent>) {
    loop {
        thread::sleep(Duration::from_secs(defaults::STATUS_PERIOD_SECS));
        if event_tx.send(NodeEvent::StatusTick).is_err() {
            return;
        }
    }
}
