pub mod channel_manager;
pub mod command_manager;
pub mod override_manager;

pub use channel_manager::{create_shared_channel_manager, ChannelManager, SharedChannelManager};
pub use command_manager::{
    create_shared_command_manager, CommandCreateAction, CommandManager, SharedCommandManager,
};
pub use override_manager::{create_shared_override_manager, OverrideManager, SharedOverrideManager};
