//! ANT protocol and USB constants.

/// Default baud rate for ANT USB sticks (AP1 based). AT3/AP2 parts use 57600.
pub const DEFAULT_BAUD_RATE: u32 = 50_000;

/// Size of a standard ANT broadcast/acknowledged data payload.
pub const ANT_STANDARD_DATA_PAYLOAD_SIZE: usize = 8;

/// Sync byte that starts every ANT frame.
pub const MESSAGE_TX_SYNC: u8 = 0xA4;

/// Largest data length an ANT frame may declare.
pub const MAX_MESSAGE_DATA_SIZE: usize = 41;

/// Largest message body: message id plus data.
pub const MAX_MESSAGE_BODY_SIZE: usize = MAX_MESSAGE_DATA_SIZE + 1;

/// Frame bytes around the data: sync, length, message id and checksum.
pub const FRAME_OVERHEAD: usize = 4;

/// Largest complete ANT frame.
pub const MAX_FRAME_SIZE: usize = MAX_MESSAGE_DATA_SIZE + FRAME_OVERHEAD;

/// USB vendor id of Dynastream Innovations (ANT USB sticks).
pub const DYNASTREAM_VID: u16 = 0x0FCF;

/// ANT message id: reset system.
pub const MESSAGE_SYSTEM_RESET: u8 = 0x4A;
/// ANT message id: broadcast data.
pub const MESSAGE_CHANNEL_BROADCAST_DATA: u8 = 0x4E;
/// ANT message id: startup notification.
pub const MESSAGE_STARTUP: u8 = 0x6F;
