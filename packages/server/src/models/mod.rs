pub mod file;
pub mod owner;
pub mod sync;

pub use file::{FileDownload, FileListResponse, FileRecord, NewFile, UploadRequest};
pub use owner::Owner;
pub use sync::{ClientFile, ClientFileEntry, ReconcilePlan};
