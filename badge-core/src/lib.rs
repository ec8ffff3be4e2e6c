#![no_std]

// Firmware core for the chained conference badge.
//
// Everything here is portable between the STM32 firmware and host tooling:
// the cooperative scheduler, link sensing, the framed wire codec and the
// discovery/turn-taking protocol run by the network handler.

#[macro_use]
mod fmt;

pub mod config;
pub mod diagnostics;
pub mod link;
pub mod loopback;
pub mod network;
pub mod scheduler;
pub mod wire;
