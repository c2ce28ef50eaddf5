pub mod memory_store;
pub mod principals;
pub mod redis_config;
pub mod redis_pool;
pub mod store;

pub use memory_store::MemoryStore;
pub use principals::{
    normalize_email, seed_from_config, InMemoryPrincipalRepository, PrincipalRepository, RepositoryError,
    SharedPrincipalRepository,
};
pub use redis_config::RedisConfig;
pub use redis_pool::{mask_redis_url, RedisHealth, RedisPool};
pub use store::{KeyValueStore, SharedStore, StoreError};
