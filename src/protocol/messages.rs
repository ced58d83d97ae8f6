//! Protocol messages for client-server communication.
//!
//! Every frame body is a JSON object `{"action": <tag>, "payload": {...}}`.
//! Frames are first decoded into a loose [`Envelope`] so that an unknown tag
//! can be answered with a notice instead of dropping the connection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Question, RoomId, RoomState};

/// A decoded frame whose action tag has not been interpreted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Interpret the envelope as a client action.
    ///
    /// A missing or `null` payload is treated as an empty object.
    pub fn into_client_message(self) -> Result<ClientMessage, serde_json::Error> {
        let payload = match self.payload {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let mut body = serde_json::Map::new();
        body.insert("action".to_string(), Value::String(self.action));
        body.insert("payload".to_string(), payload);
        serde_json::from_value(Value::Object(body))
    }
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with username and password.
    Login { username: String, password: String },

    /// Register a new account.
    CreateAccount { username: String, password: String },

    /// End the session but keep the connection.
    Logout {},

    /// Create a room and become its host.
    CreateRoom {
        #[serde(default = "default_room_name")]
        name: String,
    },

    /// Join an existing room in the lobby state.
    JoinRoom { room_id: RoomId },

    /// Leave the current room.
    LeaveRoom {},

    /// Invite an online player to the current room.
    InvitePlayer { username: String },

    /// Refuse an invitation; the room host is told.
    DeclineInvite { room_id: RoomId },

    /// Host only: start a game in the current room.
    StartGame {},

    /// Answer the current question with an option label.
    SubmitAnswer {
        answer: String,
        #[serde(default)]
        question_id: Option<String>,
    },

    /// Drop out of the running game.
    Surrender {},
}

impl ClientMessage {
    /// Every action tag a client may send.
    pub const ACTIONS: &'static [&'static str] = &[
        "login",
        "create_account",
        "logout",
        "create_room",
        "join_room",
        "leave_room",
        "invite_player",
        "decline_invite",
        "start_game",
        "submit_answer",
        "surrender",
    ];

    pub fn is_known_action(action: &str) -> bool {
        Self::ACTIONS.contains(&action)
    }
}

fn default_room_name() -> String {
    "New Room".to_string()
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    LoginSuccess { username: String, score: i64 },

    LoginFailure { message: String },

    CreateAccountSuccess { message: String },

    CreateAccountFailure { message: String },

    LogoutSuccess {},

    /// Caller is now a member of the room.
    JoinSuccess { room_id: RoomId },

    LeaveSuccess {},

    /// Full room snapshot, sent on every membership or state change.
    RoomUpdate {
        room_id: RoomId,
        room_name: String,
        host_username: String,
        state: RoomState,
        players: Vec<PlayerScore>,
    },

    InviteReceived { from_user: String, room_id: RoomId },

    GameStarted {},

    NewQuestion {
        question_id: String,
        question_text: String,
        options: BTreeMap<String, String>,
    },

    /// Per-player verdict for a resolved round.
    AnswerResult {
        player_username: String,
        is_correct: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_score: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correct_answer: Option<String>,
    },

    GameOver {
        message: String,
        final_scores: Vec<PlayerScore>,
    },

    /// Generic notice.
    Info { message: String },
}

impl ServerMessage {
    pub fn info(message: impl Into<String>) -> Self {
        ServerMessage::Info {
            message: message.into(),
        }
    }

    pub fn new_question(question: &Question) -> Self {
        ServerMessage::NewQuestion {
            question_id: question.id.clone(),
            question_text: question.text.clone(),
            options: question.options.clone(),
        }
    }

    /// The wire tag of this message.
    pub fn action(&self) -> &'static str {
        match self {
            ServerMessage::LoginSuccess { .. } => "login_success",
            ServerMessage::LoginFailure { .. } => "login_failure",
            ServerMessage::CreateAccountSuccess { .. } => "create_account_success",
            ServerMessage::CreateAccountFailure { .. } => "create_account_failure",
            ServerMessage::LogoutSuccess {} => "logout_success",
            ServerMessage::JoinSuccess { .. } => "join_success",
            ServerMessage::LeaveSuccess {} => "leave_success",
            ServerMessage::RoomUpdate { .. } => "room_update",
            ServerMessage::InviteReceived { .. } => "invite_received",
            ServerMessage::GameStarted {} => "game_started",
            ServerMessage::NewQuestion { .. } => "new_question",
            ServerMessage::AnswerResult { .. } => "answer_result",
            ServerMessage::GameOver { .. } => "game_over",
            ServerMessage::Info { .. } => "info",
        }
    }
}

/// A player name with their stored score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerScore {
    pub username: String,
    pub score: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_message_wire_shape() {
        let msg = ServerMessage::info("hello");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"action": "info", "payload": {"message": "hello"}}));

        let value = serde_json::to_value(ServerMessage::GameStarted {}).unwrap();
        assert_eq!(value, json!({"action": "game_started", "payload": {}}));
    }

    #[test]
    fn test_action_matches_serialized_tag() {
        let msg = ServerMessage::AnswerResult {
            player_username: "alice".to_string(),
            is_correct: false,
            new_score: None,
            correct_answer: Some("B".to_string()),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["action"], msg.action());
        assert!(value["payload"].get("new_score").is_none());
        assert_eq!(value["payload"]["correct_answer"], "B");
    }

    #[test]
    fn test_envelope_into_client_message() {
        let env = Envelope {
            action: "login".to_string(),
            payload: json!({"username": "alice", "password": "pw"}),
        };
        assert_eq!(
            env.into_client_message().unwrap(),
            ClientMessage::Login {
                username: "alice".to_string(),
                password: "pw".to_string(),
            }
        );

        let env = Envelope {
            action: "surrender".to_string(),
            payload: Value::Null,
        };
        assert_eq!(env.into_client_message().unwrap(), ClientMessage::Surrender {});

        let env = Envelope {
            action: "create_room".to_string(),
            payload: json!({}),
        };
        assert_eq!(
            env.into_client_message().unwrap(),
            ClientMessage::CreateRoom {
                name: "New Room".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let env = Envelope {
            action: "fly_to_moon".to_string(),
            payload: json!({}),
        };
        assert!(!ClientMessage::is_known_action(&env.action));
        assert!(env.into_client_message().is_err());

        // Known tag, wrong payload shape.
        let env = Envelope {
            action: "join_room".to_string(),
            payload: json!({"room_id": "lobby"}),
        };
        assert!(ClientMessage::is_known_action(&env.action));
        assert!(env.into_client_message().is_err());
    }

    #[test]
    fn test_room_state_serialization() {
        let msg = ServerMessage::RoomUpdate {
            room_id: 100,
            room_name: "r".to_string(),
            host_username: "alice".to_string(),
            state: RoomState::InGame,
            players: vec![],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["payload"]["state"], "IN_GAME");
    }
}
