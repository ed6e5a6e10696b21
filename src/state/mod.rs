pub mod refs;
pub mod registry;
pub mod snapshot;

pub use refs::{EntityRef, EntityRefResolver, Resolvable};
pub use registry::{create_shared_registry, EntityRegistry, SharedRegistry, Snapshot};
pub use snapshot::SnapshotPayload;
