pub mod config;
pub mod diff;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod permission;
pub mod scope;
pub mod transcript;

pub use diff::*;
pub use dispatcher::*;
pub use event::*;
pub use permission::*;
pub use scope::*;

pub use error::*;
