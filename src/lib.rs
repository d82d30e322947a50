pub mod config;
pub mod dispatcher;
pub mod messages;
pub mod motor;
pub mod runtime;
