// =============================================================================
// miraibot-core/src/auth/mod.rs
// =============================================================================

pub mod coordinator;
pub mod login;
pub mod two_factor;
pub mod validator;

pub use coordinator::AuthenticationCoordinator;
pub use login::HttpLoginClient;
pub use two_factor::{ConsoleTwoFactorInput, HeadlessTwoFactorInput};
pub use validator::HttpSessionValidator;

pub use miraibot_common::traits::auth_traits::{LoginClient, SessionValidator, TwoFactorInput};
