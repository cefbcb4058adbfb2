// src/repositories/mod.rs

pub mod credential_file;

pub use credential_file::JsonFileCredentialStore;
pub use miraibot_common::traits::repository_traits::CredentialStore;
