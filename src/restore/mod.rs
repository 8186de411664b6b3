//! Media recovery of a failed volume from a base image and the log archive.

pub mod backup;
pub mod manager;
pub mod page;
pub mod redo;
mod segment;
pub mod volume;

pub use backup::BackupImage;
pub use manager::RestoreManager;
pub use manager::RestoreMode;
pub use manager::RestoreState;
pub use page::Page;
pub use page::PAGE_HEADER_SIZE;
pub use redo::PageRedo;
pub use redo::RedoApplier;
pub use volume::dump_page_lsns;
pub use volume::FileVolume;
pub use volume::Volume;
