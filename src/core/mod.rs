pub mod jobs;
pub mod mapping;
pub mod metadata;
pub mod only;
pub mod restore;
pub mod retriever;
pub mod selection;
pub mod sqlite;
pub mod tree;
pub(crate) mod tree_hash;
pub mod vaults;
