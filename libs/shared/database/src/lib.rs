pub mod memory;
pub mod retry;
pub mod store;
pub mod supabase;
pub mod supabase_store;

use std::sync::Arc;

use tracing::info;

use shared_config::{AppConfig, StorageBackend};

pub use memory::InMemorySchedulingStore;
pub use retry::retry_transient;
pub use store::{SchedulingStore, SlotKey, SlotQuery, StoreError};
pub use supabase_store::SupabaseSchedulingStore;

/// Pick the scheduling store named by `STORAGE_BACKEND`.
pub fn build_store(config: &AppConfig) -> Arc<dyn SchedulingStore> {
    match config.storage_backend {
        StorageBackend::Memory => {
            info!("Using in-memory scheduling store");
            Arc::new(InMemorySchedulingStore::new())
        }
        StorageBackend::Supabase => {
            info!("Using Supabase scheduling store at {}", config.supabase_url);
            Arc::new(SupabaseSchedulingStore::new(config))
        }
    }
}
