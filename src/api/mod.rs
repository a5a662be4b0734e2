mod auth;
mod error;
pub mod models;
mod server;
pub mod services;
pub mod state;
pub(crate) mod utils;

pub use auth::{AuthenticatedUser, USER_ID_HEADER};
pub use error::ApiError;
pub use server::{router, run};
pub use state::AppState;
pub use utils::CRON_SECRET_HEADER;
