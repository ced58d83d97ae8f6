//! Quiz server: sessions, rooms, games and the TCP front end.

mod connection;
mod directory;
mod handler;
mod room;
mod round;
mod server;
mod session;
mod state;

pub use connection::{ConnectionHandle, ConnectionId, OUTBOUND_CAPACITY, Outbound, Outbox, write_loop};
pub use directory::{RoomAction, RoomDirectory, SharedRoom};
pub use handler::{ConnectionHandler, Flow};
pub use room::{Member, Room};
pub use round::{QuestionRng, RoundEngine, RoundHost};
pub use server::{run, serve};
pub use session::{SessionRegistry, SessionTable};
pub use state::ServerState;
