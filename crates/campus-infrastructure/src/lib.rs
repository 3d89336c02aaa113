pub mod config_service;
pub mod memory_gateway;
pub mod paths;
pub mod storage;
pub mod supabase;

pub use crate::config_service::ConfigService;
pub use crate::memory_gateway::{GatewayOp, MemoryGateway};
pub use crate::paths::CampusPaths;
pub use crate::storage::{SessionFile, StoredSession};
pub use crate::supabase::SupabaseGateway;
