pub mod chess_controller;
pub mod errors;
pub mod session_controller;
pub mod stop_controller;
pub mod uno_controller;
