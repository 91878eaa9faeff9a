//! Image store abstraction

mod filesystem;
mod naming;
mod traits;

pub use filesystem::FilesystemStore;
pub use naming::resolve_target_name;
pub use traits::{FilenamePolicy, ImageStore, PutRequest, StoreError};
