//! Command handlers for the dex CLI.

pub mod auth;
pub mod check;
pub mod logging;
pub mod meetings;

pub use auth::*;
pub use check::*;
pub use logging::*;
pub use meetings::*;
