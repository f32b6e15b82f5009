use shared::models::game_session::{GameSession, GameType, SessionStatus};
use std::fmt;

/// Something worth telling a group about a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionActivity {
    Created {
        session_id: String,
        game_type: GameType,
        created_by: String,
    },
    PlayerJoined {
        session_id: String,
        player_id: String,
        seats_taken: usize,
        max_players: usize,
    },
    StatusChanged {
        session_id: String,
        from: SessionStatus,
        to: SessionStatus,
    },
    Removed {
        session_id: String,
    },
}

impl fmt::Display for SessionActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionActivity::Created {
                session_id,
                game_type,
                created_by,
            } => write!(f, "{} created {} session {}", created_by, game_type, session_id),
            SessionActivity::PlayerJoined {
                session_id,
                player_id,
                seats_taken,
                max_players,
            } => write!(
                f,
                "{} joined session {} ({}/{})",
                player_id, session_id, seats_taken, max_players
            ),
            SessionActivity::StatusChanged {
                session_id,
                from,
                to,
            } => write!(f, "Session {} moved from {} to {}", session_id, from, to),
            SessionActivity::Removed { session_id } => write!(f, "Session {} removed", session_id),
        }
    }
}

/// Activities implied by one change of a session document.
pub fn describe_change(
    old: Option<&GameSession>,
    new: Option<&GameSession>,
) -> Vec<SessionActivity> {
    match (old, new) {
        (None, Some(new)) => vec![SessionActivity::Created {
            session_id: new.id.clone(),
            game_type: new.game_type,
            created_by: new.created_by.clone(),
        }],
        (Some(old), None) => vec![SessionActivity::Removed {
            session_id: old.id.clone(),
        }],
        (Some(old), Some(new)) => {
            let mut activities: Vec<SessionActivity> = new
                .players
                .iter()
                .filter(|player| !old.is_seated(player))
                .map(|player| SessionActivity::PlayerJoined {
                    session_id: new.id.clone(),
                    player_id: player.clone(),
                    seats_taken: new.players.len(),
                    max_players: new.max_players,
                })
                .collect();
            if old.status != new.status {
                activities.push(SessionActivity::StatusChanged {
                    session_id: new.id.clone(),
                    from: old.status,
                    to: new.status,
                });
            }
            activities
        }
        (None, None) => Vec::new(),
    }
}
