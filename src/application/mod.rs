pub mod command_history;
pub mod path_negotiator;
pub mod profile_registry;
pub mod session_manager;
pub mod transfer_engine;
pub mod workspace;

pub use command_history::{CommandHistoryIndex, CommandSpec, HistoryEntry, COMMAND_CATALOG};
pub use path_negotiator::ProxyNegotiator;
pub use profile_registry::ConnectionRegistry;
pub use session_manager::SessionManager;
pub use transfer_engine::TransferEngine;
pub use workspace::Workspace;
