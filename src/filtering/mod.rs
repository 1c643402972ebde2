// DANS : src/filtering/mod.rs

// Ce qui décide si un événement est nouveau (cache de signatures)
// et à qui il importe (registre des watches).
pub mod cache;
pub mod watch_registry;

pub use cache::SignatureCache;
pub use watch_registry::{EventContext, Owner, WatchEntry, WatchFilter, WatchRegistry, WatchScope};
