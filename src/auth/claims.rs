//! Access token claims and HS256 signing.

use std::fmt;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Base64 of the encrypted identity handle.
    pub id: String,
    pub name: String,
    /// Session expiry, Unix seconds.
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

impl AccessClaims {
    /// Claims whose token expires together with the session.
    pub fn new(id: impl Into<String>, name: impl Into<String>, expires_in: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            expires_in,
            exp: Some(expires_in),
            nbf: None,
        }
    }
}

/// Signing and verification keys for access tokens.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenKeys").finish_non_exhaustive()
    }
}

impl TokenKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time claims are optional, but enforced when present.
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn sign(&self, claims: &AccessClaims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
    }

    /// Verify signature and time claims, mapping failures to auth reasons.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        decode::<AccessClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => AuthError::TokenExpired,
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => AuthError::MalformedToken,
                _ => AuthError::InvalidToken,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::cipher::{seal_handle, AesCbcCipher};
    use crate::auth::session::unix_now;

    fn keys() -> TokenKeys {
        TokenKeys::from_secret(b"gateway-secret")
    }

    #[test]
    fn test_sign_and_verify() {
        let claims = AccessClaims::new("aGFuZGxl", "ann", unix_now() + 3600);
        let token = keys().sign(&claims).unwrap();
        assert_eq!(keys().verify(&token).unwrap(), claims);
    }

    #[test]
    fn test_expired_token() {
        let claims = AccessClaims::new("aGFuZGxl", "ann", unix_now() - 10);
        let token = keys().sign(&claims).unwrap();
        assert_eq!(keys().verify(&token), Err(AuthError::TokenExpired));
    }

    #[test]
    fn test_not_yet_valid_token() {
        let claims = AccessClaims {
            nbf: Some(unix_now() + 600),
            ..AccessClaims::new("aGFuZGxl", "ann", unix_now() + 3600)
        };
        let token = keys().sign(&claims).unwrap();
        assert_eq!(keys().verify(&token), Err(AuthError::TokenExpired));
    }

    #[test]
    fn test_wrong_key_is_invalid() {
        let claims = AccessClaims::new("aGFuZGxl", "ann", unix_now() + 3600);
        let token = TokenKeys::from_secret(b"other").sign(&claims).unwrap();
        assert_eq!(keys().verify(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_tampered_signature_is_not_expired() {
        let cipher = AesCbcCipher::new(b"0123456789abcdef").unwrap();
        let handle = seal_handle(&cipher, "user-42").unwrap();
        let token = keys()
            .sign(&AccessClaims::new(handle, "alice", unix_now() + 3600))
            .unwrap();
        assert!(keys().verify(&token).is_ok());

        let sig_start = token.rfind('.').unwrap() + 1;
        let at = sig_start + (token.len() - sig_start) / 2;
        let mut tampered = token.clone().into_bytes();
        tampered[at] = if tampered[at] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(tampered).unwrap();

        let err = keys().verify(&tampered).unwrap_err();
        assert!(
            matches!(err, AuthError::MalformedToken | AuthError::InvalidToken),
            "unexpected rejection: {err:?}"
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert_eq!(keys().verify("not-a-token"), Err(AuthError::MalformedToken));
    }

    #[test]
    fn test_token_without_exp_is_accepted() {
        let claims = AccessClaims {
            exp: None,
            ..AccessClaims::new("aGFuZGxl", "ann", unix_now() + 3600)
        };
        let token = keys().sign(&claims).unwrap();
        assert!(keys().verify(&token).is_ok());
    }
}
