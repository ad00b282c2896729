// Client core for a medication reminder app: dose reminder slots, push token
// lifecycle, countdown/treatment progress and the REST backend client.
pub mod alarms;
pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod push;
pub mod schedule;
pub mod session;
pub mod timing;
pub mod types;
pub mod util;

pub use api::ApiClient;
pub use error::ClientError;
pub use push::{MessagingPlatform, PushTokenManager, TokenRegistry};
pub use session::{Session, SessionStore};
