//! Blog service models

pub mod post;
pub mod token;
pub mod user;

// Re-export for convenience
pub use post::{NewPost, Post, SearchQuery};
pub use token::{
    IssuedToken, NewToken, RefreshRequest, ResetConfirm, ResetRequest, Token, TokenResponse,
};
pub use user::{NewUser, RegisterRequest, User};
