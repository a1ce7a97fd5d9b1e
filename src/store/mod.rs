pub mod accounting;
pub mod blobs;
pub mod directory;
pub mod records;
