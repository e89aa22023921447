pub mod config;
pub mod dashboard;
pub mod launch;
pub mod session;
