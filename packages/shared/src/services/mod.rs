pub mod chess_service;
pub mod errors;
pub mod lobby_service;
pub mod stop_rules;
pub mod uno_rules;
