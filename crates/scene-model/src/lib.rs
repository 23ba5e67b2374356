//! Scene data model vocabulary: object identities, property paths, links, and the change
//! recorder that batches data model mutations for notification.

mod error;
mod link;
mod path;
mod recorder;

pub use error::Error;
pub use link::LinkDescriptor;
pub use path::{ObjectId, PropertyPath};
pub use recorder::{
    ChangeRecorder, ChangedObjects, LinksByEndObject, MultiplexedRecorder, PathsByObject, RecordChanges,
};

// Reexport smol_str, property names are `SmolStr`
pub use smol_str::{self, SmolStr};
