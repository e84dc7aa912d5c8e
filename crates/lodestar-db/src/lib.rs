//! Store backends for the lodestar registry.

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Builds a redis connection URL from discrete settings.
pub fn redis_url(host: &str, port: u16, password: Option<&str>) -> String {
    match password {
        Some(password) if !password.is_empty() => format!("redis://:{}@{}:{}/", password, host, port),
        _ => format!("redis://{}:{}/", host, port),
    }
}
