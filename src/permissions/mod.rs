pub mod overrides;
pub mod resolver;
pub mod types;
pub mod validator;

pub use overrides::{OverrideTarget, PermissionHolder, PermissionOverride, PermissionOverrideStore};
pub use resolver::{has_all, resolve};
pub use types::{parse_raw, Permissions, FULL_MASK};
pub use validator::AccessValidator;
