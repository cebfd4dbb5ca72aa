use serde::Deserialize;

use crate::domain::device_token::Platform;

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub token: String,
    pub platform: Platform,
}

impl RegisterDeviceRequest {
    /// # Errors
    /// Returns an error if the token is empty or excessively large (anti-abuse).
    pub fn validate(&self) -> Result<(), String> {
        let trimmed = self.token.trim();
        if trimmed.is_empty() {
            return Err("Token cannot be empty".into());
        }
        if trimmed.len() > 4096 {
            return Err("Token is too long (max 4096 characters)".into());
        }
        Ok(())
    }
}
