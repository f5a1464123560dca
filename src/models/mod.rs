pub mod password_reset;
pub mod refresh_token;
pub mod user;

pub use password_reset::{
    ForgotPasswordRequest, PasswordResetError, PasswordResetStore, PasswordResetToken,
    ResetPasswordRequest, SqlPasswordResetStore,
};
pub use refresh_token::{DeviceInfo, RefreshToken, SqlTokenStore, TokenStore, TokenStoreError};
pub use user::{AuthUserStore, SqlUserStore, User, UserError, UserUpdate};
