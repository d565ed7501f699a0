// Chain-wide constants shared between the daemon and any tooling built on
// top of the common library.

// Block version written into every block assembled by this node
pub const CURRENT_BLOCK_VERSION: u32 = 3;

// Transaction format version accepted by the current chain
pub const CURRENT_TX_VERSION: u32 = 1;

// Network protocol version carried in signed message envelopes
pub const NETWORK_VERSION: u32 = 1;

// Version byte prepended to the payload before base58check encoding
pub const ADDRESS_VERSION_PREFIX: u8 = 0x1c;

// Maximum number of inputs a single transaction may spend
pub const MAX_TX_INPUTS: usize = 255;

// Maximum number of transaction requests a single packager message may carry
pub const MAX_TXS_PER_PACKAGER_MSG: usize = 1024;
