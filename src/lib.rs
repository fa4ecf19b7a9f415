pub mod config;
pub mod events;
pub mod gateway;
pub mod mocks;
pub mod network;
pub mod provider;
pub mod session;
pub mod units;
