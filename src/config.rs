//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::models::RoomId;
use crate::server::OUTBOUND_CAPACITY;

/// Startup settings for the quiz server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: SocketAddr,
    /// JSON array of questions, read once at startup.
    pub questions_path: PathBuf,
    /// Credential file, rewritten on every account mutation.
    pub users_path: PathBuf,
    /// Failed logins a connection may make before it is dropped.
    pub max_login_attempts: u32,
    /// Id given to the first room created.
    pub first_room_id: RoomId,
    /// Fixed seed for question selection. Each room derives its own stream
    /// from it. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
    /// Messages queued per connection before fan-out drops it.
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            questions_path: PathBuf::from("data/questions.json"),
            users_path: PathBuf::from("data/users.json"),
            max_login_attempts: 3,
            first_room_id: 100,
            rng_seed: None,
            outbound_capacity: OUTBOUND_CAPACITY,
        }
    }
}
