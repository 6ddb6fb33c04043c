//! Provider API key management
//!
//! Key selection with health state, usage accounting, degradation with a
//! timed cooldown, the in-memory plaintext secret map, and the one-shot
//! validation probe.

mod manager;
mod probe;
mod secrets;

pub use manager::{KeyManager, KeyManagerConfig};
pub use probe::KeyProbeResult;
pub use secrets::SecretMap;
