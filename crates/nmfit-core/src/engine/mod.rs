pub mod collaborators;
pub mod config;
pub mod error;
pub mod progress;
pub mod selection;
pub mod sensitivity;
pub mod state;
pub mod termination;
pub mod trajectory;
