pub mod cipher;
pub mod constants;
pub mod constraint;
pub mod error;
pub mod hooks;
pub mod keys;
pub mod log;
pub mod model;
pub mod path;
pub mod storage;
pub mod utils;
pub mod vault;
pub mod view;

pub use error::{Error, Result};
pub use model::{
    Annotations, AppendEvent, EncryptionKeyRecord, EventRecord, SnapshotRecord, SnapshotView,
};
pub use storage::{Storage, StorageConfig};
pub use vault::Vault;
pub use view::ViewReader;
