//! Folder management module.

mod model;
mod repository;

pub use model::{Folder, FolderId, FolderType};
pub use repository::FolderRepository;
pub(crate) use repository::{recompute_folder_counts, set_folder_watermark};
