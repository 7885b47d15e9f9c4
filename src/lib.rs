pub mod aggregate;
pub mod classifier;
pub mod config;
pub mod detection;
pub mod detector;
pub mod error;
pub mod events;
pub mod export;
pub mod extract;
pub mod formation;
pub mod movement;
pub mod persist;
pub mod pipeline;
pub mod pitch;
pub mod players;
pub mod possession;
pub mod roster;
pub mod runner;
pub mod state;
pub mod store;
pub mod team_attribution;
