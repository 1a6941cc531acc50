pub mod alerts;
pub mod clock;
pub mod config;
pub mod error;
pub mod notifications;
pub mod presentation;
