pub mod chess;
pub mod document;
pub mod game_session;
pub mod stop;
pub mod uno;
