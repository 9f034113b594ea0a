//! Core module containing the traits and types shared by the client and the
//! realtime channel

pub mod auth;
pub mod error;
pub mod notifications;

pub use auth::{AuthProvider, NoAuthProvider, Session, TokenStore};
pub use error::{ApiError, ClientError, ClientResult, FailureKind};
pub use notifications::{
    Notification, NotificationAction, NotificationBus, NotificationKind, Priority,
};
