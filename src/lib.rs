//! RangeKeeper library: ranging session orchestration for BLE distance
//! measurement nodes.
//!
//! A scanner node cycles through a fixed roster of beacon peers and asks an
//! external ranging engine to measure the distance to each in turn. Peers
//! announce ranging support with a 10-byte manufacturer-data payload carried
//! in their scan response. This crate contains the protocol codec, the peer
//! directory, the single-slot session gate, the roster scheduler and the event
//! dispatch that ties them together, with no platform dependencies and
//! testable on any host with `cargo test`. The ESP-IDF firmware in
//! `firmware-std/` is a thin consumer that provides radio access, the host
//! link and the restart primitive.
//!
//! Module map, leaves first:
//! - `peer`: addresses and the bounded peer directory
//! - `codec`, `scanner`: manufacturer payload and AD structure handling
//! - `gate`, `roster`: session admission and round-robin scheduling
//! - `ranging`, `dispatch`: requests, results and the orchestrator
//! - `protocol`, `comm`: NDJSON host link

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod codec;
pub mod comm;
pub mod defaults;
pub mod dispatch;
pub mod gate;
pub mod peer;
pub mod protocol;
pub mod ranging;
pub mod roster;
pub mod scanner;
