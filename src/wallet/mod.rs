pub mod connection;
pub mod controller;
pub mod types;

pub use connection::{WalletConnectionInfo, WalletConnectionSettings};
pub use controller::WalletController;
pub use types::*;
