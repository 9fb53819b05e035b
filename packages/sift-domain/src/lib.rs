pub mod events;
pub mod tokens;
