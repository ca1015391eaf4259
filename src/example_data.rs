//! Known-good frames for tests and bring-up.

/// An ARP request, laid out field by field. See [TEST_FRAME_ARP_REQUEST_RAW].
#[repr(C, packed)]
pub struct EthernetArpFrame {
    pub dst: [u8; 6],
    pub src: [u8; 6],
    pub ethertype: [u8; 2],
    pub hardware_type: [u8; 2],
    pub protocol_type: [u8; 2],
    pub hardware_len: u8,
    pub protocol_len: u8,
    pub operation: [u8; 2],
    pub sender_hardware_addr: [u8; 6],
    pub sender_protocol_addr: [u8; 4],
    pub target_hardware_addr: [u8; 6],
    pub target_protocol_addr: [u8; 4],
    /// Zero padding up to the minimum frame size.
    pub padding: [u8; 18],
    pub fcs: [u8; 4],
}

impl EthernetArpFrame {
    pub const fn as_raw_bytes(&self) -> &[u8] {
        // SAFETY: the struct is `packed` and consists of byte arrays only, so it has no padding
        // and every byte is initialized.
        unsafe {
            core::slice::from_raw_parts(
                (self as *const EthernetArpFrame) as *const u8,
                core::mem::size_of::<EthernetArpFrame>(),
            )
        }
    }
}

// Changing any field requires updating `fcs` too; `tests::arp_request_fcs_valid` prints the
// correct value when it doesn't match.
const EXAMPLE_FRAME_ARP_REQUEST: EthernetArpFrame = EthernetArpFrame {
    dst: [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
    src: [0x12, 0x34, 0x56, 0x78, 0x90, 0x12],
    ethertype: [0x08, 0x06],
    hardware_type: [0x00, 0x01],
    protocol_type: [0x08, 0x00],
    hardware_len: 6,
    protocol_len: 4,
    operation: [0x00, 0x01],
    sender_hardware_addr: [0x12, 0x34, 0x56, 0x78, 0x90, 0x12],
    sender_protocol_addr: [0xA9, 0xFE, 0xAC, 0x72], // 169.254.172.114
    target_hardware_addr: [0x00; 6],
    target_protocol_addr: [0xA9, 0xFE, 0xAC, 0x73], // 169.254.172.115
    padding: [0x00; 18],
    fcs: [0x76, 0xE9, 0x85, 0xB4],
};

/// A broadcast ARP request from 12:34:56:78:90:12 (169.254.172.114) asking who has
/// 169.254.172.115, as it appears on the wire: padded to 60 bytes and followed by its FCS, for a
/// total of 64 bytes, the minimum frame size.
pub const TEST_FRAME_ARP_REQUEST_RAW: &[u8] = EXAMPLE_FRAME_ARP_REQUEST.as_raw_bytes();

/// The same ARP request as a network stack would hand it to the MAC: 42 bytes, without padding
/// and FCS.
pub const TEST_FRAME_ARP_REQUEST_UNPADDED: &[u8] = TEST_FRAME_ARP_REQUEST_RAW.split_at(42).0;
