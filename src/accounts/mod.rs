//! Users and the storage accounts they register

mod error;
mod models;
mod service;
mod store;

pub use error::{AccountError, Result};
pub use models::{Account, NewAccount, UserRecord};
pub use service::AccountService;
pub use store::AccountStore;
