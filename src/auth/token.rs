use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{ProjectToken, Role};

const ARGON2_MEMORY_KIB: u32 = 19 * 1024;
const ARGON2_ITERATIONS: u32 = 2;
const ARGON2_PARALLELISM: u32 = 1;
const ARGON2_OUTPUT_LEN: usize = 32;

const TOKEN_PREFIX: &str = "atelier";
const LOOKUP_LENGTH: usize = 8;
const SECRET_LENGTH: usize = 32;
const SECRET_BYTES: usize = 16;

/// A freshly minted credential. `raw` is shown to the caller once and never stored.
pub struct GeneratedToken {
    pub raw: String,
    pub lookup: String,
    pub hash: String,
}

pub struct TokenGenerator {
    argon2: Argon2<'static>,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator {
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(
            ARGON2_MEMORY_KIB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(ARGON2_OUTPUT_LEN),
        )
        .unwrap_or_default();

        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Generates a new token with the format: atelier_<lookup>_<secret>
    pub fn generate(&self) -> Result<GeneratedToken> {
        let lookup = generate_lookup();
        let secret = generate_secret();
        let raw = build_token(&lookup, &secret);
        let hash = self.hash(&raw)?;
        Ok(GeneratedToken { raw, lookup, hash })
    }

    /// Mints a project token record. Returns the record and the raw credential.
    pub fn issue(
        &self,
        project_id: &str,
        role: Role,
        label: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(ProjectToken, String)> {
        let generated = self.generate()?;
        let token = ProjectToken {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            token_hash: generated.hash,
            token_lookup: generated.lookup,
            role,
            label,
            is_default: false,
            created_at: Utc::now(),
            expires_at,
            last_used_at: None,
        };
        Ok((token, generated.raw))
    }

    /// Hashes a raw token using Argon2id
    pub fn hash(&self, token: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(token.as_bytes(), &salt)
            .map_err(|e| Error::Config(format!("failed to hash token: {e}")))?;
        Ok(hash.to_string())
    }

    /// Verifies a raw token against a stored hash
    pub fn verify(&self, token: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| Error::Config(format!("invalid hash format: {e}")))?;

        match self.argon2.verify_password(token.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Config(format!("failed to verify token: {e}"))),
        }
    }
}

/// Generates the lookup portion of the token (first 8 chars of a UUID)
#[must_use]
fn generate_lookup() -> String {
    let uuid = Uuid::new_v4();
    uuid.simple().to_string()[..LOOKUP_LENGTH].to_string()
}

/// Generates a cryptographically secure random hex string for the secret
#[must_use]
fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)[..SECRET_LENGTH].to_string()
}

#[must_use]
fn build_token(lookup: &str, secret: &str) -> String {
    format!("{TOKEN_PREFIX}_{lookup}_{secret}")
}

/// Parses a token string into its components (lookup, secret)
pub fn parse_token(token: &str) -> Result<(String, String)> {
    let rest = token
        .strip_prefix(TOKEN_PREFIX)
        .and_then(|r| r.strip_prefix('_'))
        .ok_or(Error::InvalidTokenFormat)?;

    let (lookup, secret) = rest.split_once('_').ok_or(Error::InvalidTokenFormat)?;

    if lookup.len() != LOOKUP_LENGTH
        || secret.len() != SECRET_LENGTH
        || !lookup.chars().all(|c| c.is_ascii_hexdigit())
        || !secret.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(Error::InvalidTokenFormat);
    }

    Ok((lookup.to_string(), secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_generation_format() {
        let generator = TokenGenerator::new();
        let token = generator.generate().unwrap();

        assert!(token.raw.starts_with("atelier_"));
        assert_eq!(token.lookup.len(), 8);

        let parts: Vec<&str> = token.raw.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "atelier");
        assert_eq!(parts[1], token.lookup);
        assert_eq!(parts[2].len(), 32);
    }

    #[test]
    fn test_token_verification_correct() {
        let generator = TokenGenerator::new();
        let token = generator.generate().unwrap();

        assert!(generator.verify(&token.raw, &token.hash).unwrap());
    }

    #[test]
    fn test_token_verification_wrong_secret() {
        let generator = TokenGenerator::new();
        let token = generator.generate().unwrap();

        let mut wrong = token.raw.clone();
        let last = wrong.pop().unwrap();
        wrong.push(if last == '0' { '1' } else { '0' });
        assert!(!generator.verify(&wrong, &token.hash).unwrap());
    }

    #[test]
    fn test_parse_token_valid() {
        let (lookup, secret) =
            parse_token("atelier_1234abcd_0123456789abcdef0123456789abcdef").unwrap();
        assert_eq!(lookup, "1234abcd");
        assert_eq!(secret, "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn test_parse_token_invalid() {
        assert!(parse_token("other_1234abcd_0123456789abcdef0123456789abcdef").is_err());
        assert!(parse_token("atelier_1234abcd").is_err());
        assert!(parse_token("atelier_1234abcd_short").is_err());
        assert!(parse_token("atelier_zzzzzzzz_0123456789abcdef0123456789abcdef").is_err());
        assert!(parse_token("").is_err());
    }

    #[test]
    fn test_issue_binds_project_and_role() {
        let generator = TokenGenerator::new();
        let (token, raw) = generator
            .issue("project-1", Role::Viewer, Some("ci".to_string()), None)
            .unwrap();

        assert_eq!(token.project_id, "project-1");
        assert_eq!(token.role, Role::Viewer);
        assert!(!token.is_default);
        let (lookup, _) = parse_token(&raw).unwrap();
        assert_eq!(lookup, token.token_lookup);
        assert!(generator.verify(&raw, &token.token_hash).unwrap());
    }

    #[test]
    fn test_hash_is_phc_format() {
        let generator = TokenGenerator::new();
        let token = generator.generate().unwrap();

        assert!(token.hash.starts_with("$argon2id$"));
    }
}
