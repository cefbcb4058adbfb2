pub mod auth_traits;
pub mod repository_traits;
pub mod stream_traits;
