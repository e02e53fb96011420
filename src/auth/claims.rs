use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::Role;

/// JWT payload proving an authenticated session. Stateless: logout only
/// discards the cookie, the token itself stays valid until `exp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,    // user ID
    pub role: Role,   // authorization role carried with the session
    pub iat: usize,   // issued at (unix timestamp)
    pub exp: usize,   // expires at (unix timestamp)
    pub iss: String,  // issuer
    pub aud: String,  // audience
}
