pub mod address;
pub mod ed25519;
pub mod hash;
pub mod vrf;

pub use address::{Address, AddressError};
pub use ed25519::{
    CryptoError, KeyPair, PublicKey, SecretKey, Signature, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE,
    SIGNATURE_SIZE,
};
pub use hash::{hash, Hash, HashParseError, HASH_SIZE};
pub use vrf::{VrfError, VrfOutput, VrfProof, VRF_OUTPUT_SIZE, VRF_PROOF_SIZE};
