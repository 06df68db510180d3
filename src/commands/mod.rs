pub mod gate;
pub mod session;
pub mod utils;
