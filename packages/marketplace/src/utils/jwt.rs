use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// JWT Claims issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Active organization, if any
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Expiration timestamp
    pub exp: usize,
}

impl Claims {
    pub fn new(user_id: &str, org: Option<&str>, permissions: &[&str], ttl: Duration) -> Self {
        Self {
            sub: user_id.to_owned(),
            org: org.map(str::to_owned),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            exp: (Utc::now() + ttl).timestamp() as usize,
        }
    }
}

/// Sign a token. Used by tooling and tests; production tokens come from the identity provider.
pub fn sign(secret: &str, claims: &Claims) -> Result<String> {
    let token = encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Verify and decode a JWT token.
pub fn verify(secret: &str, token: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}
