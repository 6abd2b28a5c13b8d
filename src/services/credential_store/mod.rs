pub mod kv;
pub mod memory;
pub mod store;
pub mod valkey;

pub use kv::{KeyValueStore, KvError, KvResult};
pub use memory::MemoryKv;
pub use store::{CredentialStore, SecretKind, StoredSecret};
pub use valkey::ValkeyKv;
