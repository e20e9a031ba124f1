//! Identity verification for bearer credentials.
//!
//! A bearer credential is a compact JWS (`header.payload.signature`, base64url without
//! padding) signed with ES256 by a trusted external issuer. The trust root is a set of P-256
//! public keys loaded once at startup. Verification is stateless: no tokens are cached and no
//! issuer is contacted per request.
//!
//! [`DevTokenIssuer`] signs tokens the same way, for tests and local tooling.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use clinic_types::EmailAddress;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Clock skew tolerated on `exp` and `nbf`, in seconds.
pub const CLOCK_LEEWAY_SECS: i64 = 60;

/// Default bound on a single verification call.
pub const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_millis(5_000);

const ES256: &str = "ES256";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("unauthorized, provide Bearer token in Authorization header")]
    MissingCredential,
    #[error("authorization header format must be Bearer {{token}}")]
    MalformedHeader,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token expired")]
    Expired,
    #[error("token audience mismatch")]
    AudienceMismatch,
    #[error("email not found in token")]
    IdentityIncomplete,
    #[error("identity verification timed out")]
    Timeout,
    #[error("issuer configuration: {0}")]
    IssuerConfig(String),
}

impl AuthError {
    /// The token verified but does not carry the mandatory email claim.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::IdentityIncomplete)
    }

    fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidToken(detail.into())
    }
}

/// Extracts the token from an `Authorization` header value.
///
/// The value must be exactly two whitespace-separated parts, the first equal to `bearer`
/// ignoring case.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(AuthError::MissingCredential)?;
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Canonical identity extracted from a verified token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub email: EmailAddress,
    pub subject: String,
    pub name: String,
    pub picture: String,
}

/// Verifies bearer credentials against a trust root.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError>;
}

// ============================================================================
// CLAIMS
// ============================================================================

/// `aud` may be a single string or an array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, expected: &str) -> bool {
        match self {
            Self::One(aud) => aud == expected,
            Self::Many(auds) => auds.iter().any(|a| a == expected),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl TokenClaims {
    /// Claims for `email`, issued now and valid for `ttl`.
    pub fn for_email(email: &str, ttl: Duration) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: Some(format!("dev|{email}")),
            email: Some(email.to_owned()),
            iat: Some(now),
            exp: Some(now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JwsHeader {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

// ============================================================================
// VERIFIER
// ============================================================================

/// What the verifier expects of every token.
#[derive(Clone, Debug)]
pub struct IssuerConfig {
    audience: String,
    issuer: Option<String>,
    keys_path: PathBuf,
    timeout: Duration,
}

impl IssuerConfig {
    pub fn new(
        audience: String,
        issuer: Option<String>,
        keys_path: PathBuf,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        if audience.trim().is_empty() {
            return Err(AuthError::IssuerConfig("expected audience cannot be empty".into()));
        }
        if timeout.is_zero() {
            return Err(AuthError::IssuerConfig(
                "identity timeout must be greater than zero".into(),
            ));
        }
        Ok(Self {
            audience: audience.trim().to_owned(),
            issuer: issuer.map(|i| i.trim().to_owned()).filter(|i| !i.is_empty()),
            keys_path,
            timeout,
        })
    }

    /// Builds the configuration from raw environment values.
    ///
    /// `audience` and `keys_path` are required; `timeout_ms` defaults to
    /// [`DEFAULT_IDENTITY_TIMEOUT`].
    pub fn from_env_values(
        audience: Option<String>,
        issuer: Option<String>,
        keys_path: Option<String>,
        timeout_ms: Option<String>,
    ) -> Result<Self, AuthError> {
        let required = |value: Option<String>, name: &str| {
            value
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AuthError::IssuerConfig(format!("{name} is required")))
        };
        let audience = required(audience, "CLINIC_ISSUER_AUDIENCE")?;
        let keys_path = PathBuf::from(required(keys_path, "CLINIC_ISSUER_KEYS")?);
        let timeout = match timeout_ms.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            None => DEFAULT_IDENTITY_TIMEOUT,
            Some(raw) => raw.parse::<u64>().map(Duration::from_millis).map_err(|_| {
                AuthError::IssuerConfig(format!(
                    "CLINIC_IDENTITY_TIMEOUT_MS must be whole milliseconds, got {raw:?}"
                ))
            })?,
        };
        Self::new(audience, issuer, keys_path, timeout)
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    pub fn keys_path(&self) -> &Path {
        &self.keys_path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// A trusted issuer key, optionally addressed by `kid`.
#[derive(Clone, Debug)]
pub struct TrustedKey {
    pub kid: Option<String>,
    pub key: VerifyingKey,
}

/// Parses every `PUBLIC KEY` block of a PEM bundle. Other block types are ignored.
pub fn parse_public_key_bundle(pem_text: &str) -> Result<Vec<TrustedKey>, AuthError> {
    let blocks = pem::parse_many(pem_text).map_err(|e| AuthError::IssuerConfig(e.to_string()))?;
    let keys = blocks
        .iter()
        .filter(|block| block.tag == "PUBLIC KEY")
        .map(|block| {
            VerifyingKey::from_public_key_der(&block.contents)
                .map(|key| TrustedKey { kid: None, key })
                .map_err(|e| AuthError::IssuerConfig(format!("not a P-256 public key: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if keys.is_empty() {
        return Err(AuthError::IssuerConfig("no PUBLIC KEY blocks found".into()));
    }
    Ok(keys)
}

/// Loads the trusted keys at `path`.
///
/// A file is read as one PEM bundle whose keys carry no `kid`. A directory contributes
/// every `*.pem` file in it, each key addressed by its file stem (`k1.pem` holds key `k1`).
pub fn load_trusted_keys(path: &Path) -> Result<Vec<TrustedKey>, AuthError> {
    let read = |path: &Path| {
        std::fs::read_to_string(path)
            .map_err(|e| AuthError::IssuerConfig(format!("{}: {e}", path.display())))
    };
    if !path.is_dir() {
        return parse_public_key_bundle(&read(path)?);
    }

    let entries = std::fs::read_dir(path)
        .map_err(|e| AuthError::IssuerConfig(format!("{}: {e}", path.display())))?;
    let mut files = Vec::new();
    for entry in entries {
        let file = entry
            .map_err(|e| AuthError::IssuerConfig(format!("{}: {e}", path.display())))?
            .path();
        if file.extension().and_then(|ext| ext.to_str()) == Some("pem") {
            files.push(file);
        }
    }
    files.sort();

    let mut keys = Vec::new();
    for file in files {
        let kid = file
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_owned);
        keys.extend(
            parse_public_key_bundle(&read(&file)?)?
                .into_iter()
                .map(|key| TrustedKey { kid: kid.clone(), ..key }),
        );
    }
    if keys.is_empty() {
        return Err(AuthError::IssuerConfig(format!(
            "{}: no .pem files found",
            path.display()
        )));
    }
    Ok(keys)
}

/// ES256 compact-JWS verifier.
#[derive(Clone, Debug)]
pub struct Es256Verifier {
    keys: Vec<TrustedKey>,
    audience: String,
    issuer: Option<String>,
}

impl Es256Verifier {
    pub fn new(keys: Vec<TrustedKey>, audience: impl Into<String>, issuer: Option<String>) -> Self {
        Self {
            keys,
            audience: audience.into(),
            issuer,
        }
    }

    /// Loads the trusted keys named by `cfg`.
    pub fn from_config(cfg: &IssuerConfig) -> Result<Self, AuthError> {
        let keys = load_trusted_keys(cfg.keys_path())?;
        let named = keys.iter().filter(|k| k.kid.is_some()).count();
        tracing::info!(keys = keys.len(), named, audience = cfg.audience(), "issuer keys loaded");
        Ok(Self::new(
            keys,
            cfg.audience(),
            cfg.issuer().map(str::to_owned),
        ))
    }

    /// Keys named by the token's `kid` when any match; every trusted key otherwise.
    fn candidate_keys<'a>(&'a self, kid: Option<&str>) -> Vec<&'a VerifyingKey> {
        if let Some(kid) = kid {
            let named: Vec<_> = self
                .keys
                .iter()
                .filter(|k| k.kid.as_deref() == Some(kid))
                .map(|k| &k.key)
                .collect();
            if !named.is_empty() {
                return named;
            }
        }
        self.keys.iter().map(|k| &k.key).collect()
    }

    fn check_claims(&self, claims: &TokenClaims, now: i64) -> Result<(), AuthError> {
        let exp = claims.exp.ok_or_else(|| AuthError::invalid("missing exp claim"))?;
        if exp.saturating_add(CLOCK_LEEWAY_SECS) < now {
            return Err(AuthError::Expired);
        }
        if let Some(nbf) = claims.nbf {
            if nbf.saturating_sub(CLOCK_LEEWAY_SECS) > now {
                return Err(AuthError::invalid("token not yet valid"));
            }
        }
        match &claims.aud {
            Some(aud) if aud.contains(&self.audience) => {}
            _ => return Err(AuthError::AudienceMismatch),
        }
        if let Some(expected) = &self.issuer {
            if claims.iss.as_deref() != Some(expected.as_str()) {
                return Err(AuthError::invalid("issuer mismatch"));
            }
        }
        Ok(())
    }
}

fn decode_segment(segment: &str, what: &str) -> Result<Vec<u8>, AuthError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::invalid(format!("{what} is not base64url")))
}

impl IdentityVerifier for Es256Verifier {
    fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::invalid("expected three dot-separated segments"));
        };

        let header: JwsHeader = serde_json::from_slice(&decode_segment(header_b64, "header")?)
            .map_err(|e| AuthError::invalid(format!("header: {e}")))?;
        if header.alg != ES256 {
            return Err(AuthError::invalid(format!("unsupported alg {}", header.alg)));
        }

        let signature = Signature::from_slice(&decode_segment(signature_b64, "signature")?)
            .map_err(|_| AuthError::invalid("malformed signature"))?;
        let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
        let trusted = self
            .candidate_keys(header.kid.as_deref())
            .into_iter()
            .any(|key| key.verify(signing_input.as_bytes(), &signature).is_ok());
        if !trusted {
            return Err(AuthError::invalid("bad signature"));
        }

        let claims: TokenClaims = serde_json::from_slice(&decode_segment(payload_b64, "payload")?)
            .map_err(|e| AuthError::invalid(format!("claims: {e}")))?;
        self.check_claims(&claims, chrono::Utc::now().timestamp())?;

        let email = claims
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(AuthError::IdentityIncomplete)?;
        let email = EmailAddress::parse(email)
            .map_err(|_| AuthError::invalid("email claim is not an address"))?;

        Ok(VerifiedIdentity {
            email,
            subject: claims.sub.unwrap_or_default(),
            name: claims.name.unwrap_or_default(),
            picture: claims.picture.unwrap_or_default(),
        })
    }
}

// ============================================================================
// DEVELOPMENT ISSUER
// ============================================================================

/// Signs tokens with a local P-256 key. Not a production identity provider.
#[derive(Clone)]
pub struct DevTokenIssuer {
    key: SigningKey,
    kid: Option<String>,
    audience: String,
    issuer: Option<String>,
}

impl DevTokenIssuer {
    /// Issuer with a freshly generated key.
    pub fn generate(audience: impl Into<String>) -> Self {
        Self {
            key: SigningKey::random(&mut rand::thread_rng()),
            kid: None,
            audience: audience.into(),
            issuer: None,
        }
    }

    pub fn from_pkcs8_pem(pem_text: &str, audience: impl Into<String>) -> Result<Self, AuthError> {
        let key = SigningKey::from_pkcs8_pem(pem_text)
            .map_err(|e| AuthError::IssuerConfig(format!("private key: {e}")))?;
        Ok(Self {
            key,
            kid: None,
            audience: audience.into(),
            issuer: None,
        })
    }

    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn private_key_pem(&self) -> Result<String, AuthError> {
        self.key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| AuthError::IssuerConfig(e.to_string()))
    }

    pub fn public_key_pem(&self) -> Result<String, AuthError> {
        self.key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AuthError::IssuerConfig(e.to_string()))
    }

    pub fn trusted_key(&self) -> TrustedKey {
        TrustedKey {
            kid: self.kid.clone(),
            key: self.key.verifying_key().clone(),
        }
    }

    /// A verifier that trusts exactly this issuer.
    pub fn verifier(&self) -> Es256Verifier {
        Es256Verifier::new(vec![self.trusted_key()], self.audience.clone(), self.issuer.clone())
    }

    /// Signs `claims`, filling `aud` and `iss` from the issuer when absent.
    pub fn mint(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        let mut claims = claims.clone();
        claims
            .aud
            .get_or_insert_with(|| Audience::One(self.audience.clone()));
        if claims.iss.is_none() {
            claims.iss = self.issuer.clone();
        }

        let header = JwsHeader {
            alg: ES256.to_owned(),
            typ: Some("JWT".to_owned()),
            kid: self.kid.clone(),
        };
        let header = serde_json::to_vec(&header).map_err(|e| AuthError::invalid(e.to_string()))?;
        let payload = serde_json::to_vec(&claims).map_err(|e| AuthError::invalid(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let signature: Signature = self.key.sign(signing_input.as_bytes());
        Ok(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }
}
