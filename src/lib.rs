//! A software-defined Ethernet MAC for RMII PHYs driven by programmable I/O state machines and
//! DMA, plus the MDIO management logic needed to bring up and monitor the PHY.
//!
//! This crate contains the hardware-agnostic half of the driver. Chip-specific code implements
//! the traits in [hal] (see the `rmii_mac_rp` crate for the RP2040 implementation).
#![cfg_attr(not(test), no_std)]

pub mod crc;
pub mod debug_util;
pub mod eth_mac;
pub mod example_data;
pub mod hal;
pub mod mdio;
pub mod netif;
pub mod ring;

#[cfg(test)]
mod sim;
