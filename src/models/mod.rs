mod account;
mod question;
mod room;

pub use account::{Account, AccountStatus};
pub use question::Question;
pub use room::{RoomId, RoomState};
