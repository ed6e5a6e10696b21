pub mod builder;
pub mod channel;
pub mod guild;
pub mod message;

pub use builder::{EntityBuilder, RawChannel, RawOverride};
pub use channel::{
    AudioCapable, AudioChannel, CategoryChannel, ChannelCore, ChannelKind, GuildChannel,
    Messageable, NewsChannel, PermissionContainer, TextChannel,
};
pub use guild::{Guild, Member, Role};
pub use message::{Command, Message, WebhookReference};
