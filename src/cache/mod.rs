pub mod fingerprint_cache;

pub use fingerprint_cache::{CachedVerdict, Fingerprint, FingerprintCache};
