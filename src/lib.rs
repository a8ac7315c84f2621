mod types;
mod commands;
mod composer;
mod handlers;
mod error;
mod scheduler;
mod storage;

pub use types::*;
pub use commands::*;
pub use composer::*;
pub use handlers::*;
pub use error::*;
pub use scheduler::*;
pub use storage::*;
