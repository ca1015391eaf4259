//! Formatting helpers for logging frames and raw buffer contents.

use bitvec::prelude::*;
use core::fmt;

/// How each byte of a [Dump] is rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DumpStyle {
    /// Two hex digits.
    Hex,
    /// Eight binary digits in network bit order: the bit that goes on the wire first is printed
    /// leftmost, so a dump reads left to right the way the data was transmitted.
    Binary,
    /// Both of the above, e.g. `10000000 (01)`.
    BinaryHex,
}

/// Displays a buffer the way Wireshark does: rows of 16 bytes prefixed with their offset, split
/// into two groups of 8.
pub struct Dump<'a> {
    pub data: &'a [u8],
    pub style: DumpStyle,
}

/// Reverses the bit order of a byte, since Ethernet sends the least significant bit first.
fn in_network_bit_order(value: u8) -> u8 {
    let mut reversed = value;
    reversed.view_bits_mut::<Lsb0>().reverse();
    reversed
}

impl fmt::Display for Dump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row_idx, row) in self.data.chunks(16).enumerate() {
            if row_idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{:04x}: ", row_idx * 16)?;
            for (group_idx, group) in row.chunks(8).enumerate() {
                if group_idx > 0 {
                    f.write_str("  ")?;
                }
                for (idx, &byte) in group.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" ")?;
                    }
                    match self.style {
                        DumpStyle::Hex => write!(f, "{byte:02x}")?,
                        DumpStyle::Binary => write!(f, "{:08b}", in_network_bit_order(byte))?,
                        DumpStyle::BinaryHex => {
                            write!(f, "{:08b} ({byte:02x})", in_network_bit_order(byte))?
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn log_dump(level: log::Level, data: &[u8], style: DumpStyle) {
    log::log!(level, "Length: {} bytes\n{}", data.len(), Dump { data, style });
}

/// Logs the given buffer as a hex dump.
pub fn log_data_hex(level: log::Level, data: &[u8]) {
    log_dump(level, data, DumpStyle::Hex)
}

/// Logs the given buffer with every byte in both binary (network bit order) and hex.
pub fn log_data_binary_hex(level: log::Level, data: &[u8]) {
    log_dump(level, data, DumpStyle::BinaryHex)
}

/// Displays a MAC address in the usual colon-separated form.
pub struct FormatMacAddress<'a>(pub &'a [u8; 6]);

impl fmt::Display for FormatMacAddress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

fn ethertype_name(ethertype: u16) -> Option<&'static str> {
    Some(match ethertype {
        0x0800 => "IPv4",
        0x0806 => "ARP",
        0x86dd => "IPv6",
        0x8100 => "VLAN",
        0x88cc => "LLDP",
        _ => return None,
    })
}

/// Displays a one-line summary of an Ethernet frame: its length, EtherType and addresses. Frames
/// too short to contain a header are displayed as such.
pub struct FormatEthernetFrame<'a>(pub &'a [u8]);

impl fmt::Display for FormatEthernetFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0;
        let (Some(dst), Some(src), Some(ethertype)) = (
            data.get(0..6).and_then(|s| <&[u8; 6]>::try_from(s).ok()),
            data.get(6..12).and_then(|s| <&[u8; 6]>::try_from(s).ok()),
            data.get(12..14),
        ) else {
            return write!(f, "EthFrame(len: {}, truncated)", data.len());
        };
        let ethertype = u16::from_be_bytes([ethertype[0], ethertype[1]]);
        write!(f, "EthFrame(len: {}, type 0x{ethertype:04X}", data.len())?;
        if let Some(name) = ethertype_name(ethertype) {
            write!(f, " ({name})")?;
        }
        write!(
            f,
            ", dst {}, src {})",
            FormatMacAddress(dst),
            FormatMacAddress(src)
        )
    }
}
