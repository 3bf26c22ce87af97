pub mod error;
pub mod messenger;
pub mod middleware;
pub mod news;
pub mod notifications;
pub mod notify;
pub mod questions;
pub mod state;
pub mod users;
pub mod votes;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, AppStateInner};
