pub mod alarm;
pub mod api;
pub mod bus;
pub mod config;
pub mod engine;
pub mod notify;

pub use alarm::AlarmPolicy;
pub use alarm::Decision;
pub use config::Config;
pub use engine::Engine;
