use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dotenvy::dotenv;
use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub encryption_master_key: [u8; 32],
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8085);
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::Config("JWT_SECRET missing".into()))?;

        let master_key_b64 = env::var("MESSAGE_ENC_KEY")
            .map_err(|_| AppError::Config("MESSAGE_ENC_KEY missing".into()))?;
        let encryption_master_key = Self::decode_master_key(&master_key_b64)?;

        Ok(Self {
            database_url,
            redis_url,
            port,
            jwt_secret,
            encryption_master_key,
        })
    }

    fn decode_master_key(value: &str) -> Result<[u8; 32], AppError> {
        let bytes = STANDARD
            .decode(value.trim())
            .map_err(|_| AppError::Config("MESSAGE_ENC_KEY invalid base64".into()))?;
        if bytes.len() != 32 {
            return Err(AppError::Config(
                "MESSAGE_ENC_KEY must decode to 32 bytes".into(),
            ));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(key)
    }
}
