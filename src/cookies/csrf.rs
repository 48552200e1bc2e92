use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::{HeaderMap, Request};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cookies::{append_set_cookie, make_cookie, request_cookie, Cookie};
use crate::encryption::cipher::{CfbCipher, Cipher};
use crate::encryption::signed_value::{self, SignedValueError};
use crate::encryption::{nonce, secret, CryptoError};
use crate::session::SessionState;
use crate::settings::CookieSettings;

/// How a CSRF cookie failed. Every decode-side variant collapses to the
/// same caller-visible outcome (treat the cookie as absent and start a
/// fresh flow) while the variant itself is logged server-side only.
#[derive(Debug, Error, Diagnostic)]
pub enum CsrfError {
    #[error("CSRF cookie not present on the request")]
    #[diagnostic(code(gateward::csrf::missing))]
    Missing,

    #[error("CSRF cookie failed signature validation")]
    #[diagnostic(code(gateward::csrf::signature_invalid))]
    SignatureInvalid,

    #[error("CSRF cookie has expired")]
    #[diagnostic(code(gateward::csrf::expired))]
    Expired,

    #[error("CSRF cookie could not be decrypted")]
    #[diagnostic(code(gateward::csrf::crypto))]
    Crypto(#[source] CryptoError),

    #[error("CSRF cookie payload is malformed: {0}")]
    #[diagnostic(code(gateward::csrf::malformed))]
    Malformed(String),

    #[error("system random source failed while minting CSRF nonces")]
    #[diagnostic(
        code(gateward::csrf::random_source),
        help("this aborts the login attempt; the client should retry")
    )]
    RandomSource(#[source] rand::Error),
}

impl CsrfError {
    fn from_crypto(err: CryptoError) -> Self {
        match err {
            CryptoError::RandomSource(source) => CsrfError::RandomSource(source),
            other => CsrfError::Crypto(other),
        }
    }
}

/// CSRF state for one interactive authentication attempt.
///
/// Born when the authorization redirect is issued, carried only as a
/// signed-and-encrypted cookie on the user-agent, and consumed (or left to
/// expire) on the callback. Never persisted server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrfToken {
    /// Nonce component of the OAuth2 `state` parameter, mirrored back by
    /// the identity provider in the callback redirect.
    #[serde(
        rename = "s",
        default,
        with = "serde_bytes",
        skip_serializing_if = "Vec::is_empty"
    )]
    oauth_state: Vec<u8>,

    /// OIDC `nonce` parameter, later asserted as the nonce claim of the ID
    /// tokens minted for this session. Mitigates replay.
    #[serde(
        rename = "n",
        default,
        with = "serde_bytes",
        skip_serializing_if = "Vec::is_empty"
    )]
    oidc_nonce: Vec<u8>,

    #[serde(skip)]
    cookie_opts: CookieSettings,
}

impl CsrfToken {
    /// Mint a token with fresh random nonces.
    pub fn new(opts: &CookieSettings) -> Result<Self, CsrfError> {
        let oauth_state = nonce::nonce().map_err(CsrfError::from_crypto)?;
        let oidc_nonce = nonce::nonce().map_err(CsrfError::from_crypto)?;
        Ok(Self {
            oauth_state,
            oidc_nonce,
            cookie_opts: opts.clone(),
        })
    }

    /// Load and verify the CSRF cookie from a callback request.
    pub fn load<B>(req: &Request<B>, opts: &CookieSettings) -> Result<Self, CsrfError> {
        let value = request_cookie(req, &csrf_cookie_name(opts)).ok_or(CsrfError::Missing)?;
        Self::decode(&value, opts, SystemTime::now())
    }

    /// Hash of the OAuth state nonce, as sent in the `state` parameter.
    pub fn hash_oauth_state(&self) -> String {
        nonce::hash_nonce(&self.oauth_state)
    }

    /// Hash of the OIDC nonce, as sent in the `nonce` claim.
    pub fn hash_oidc_nonce(&self) -> String {
        nonce::hash_nonce(&self.oidc_nonce)
    }

    /// Constant-time check of a candidate `state` hash.
    pub fn check_oauth_state(&self, hashed: &str) -> bool {
        nonce::check_nonce(&self.oauth_state, hashed)
    }

    /// Constant-time check of a candidate `nonce` hash.
    pub fn check_oidc_nonce(&self, hashed: &str) -> bool {
        nonce::check_nonce(&self.oidc_nonce, hashed)
    }

    /// Transfer the OIDC nonce into the user's session on a successful
    /// callback.
    pub fn set_session_nonce(&self, session: &mut SessionState) {
        session.nonce = Some(self.oidc_nonce.clone());
    }

    /// Name of the CSRF cookie, derived from the base cookie name.
    pub fn cookie_name(&self) -> String {
        csrf_cookie_name(&self.cookie_opts)
    }

    /// Encode the token and attach it as a cookie on the response headers,
    /// returning the attached cookie.
    pub fn set_cookie<B>(
        &self,
        response_headers: &mut HeaderMap,
        req: &Request<B>,
    ) -> Result<Cookie, CsrfError> {
        let now = SystemTime::now();
        let value = self.encode_cookie(now)?;
        let cookie = make_cookie(
            req,
            &self.cookie_name(),
            &value,
            &self.cookie_opts,
            Some(now + self.cookie_opts.expire),
        );
        append_set_cookie(response_headers, &cookie);
        Ok(cookie)
    }

    /// Overwrite the CSRF cookie with an empty, already-expired one.
    pub fn clear_cookie<B>(&self, response_headers: &mut HeaderMap, req: &Request<B>) {
        let past = SystemTime::now()
            .checked_sub(Duration::from_secs(3600))
            .unwrap_or(UNIX_EPOCH);
        let cookie = make_cookie(req, &self.cookie_name(), "", &self.cookie_opts, Some(past));
        append_set_cookie(response_headers, &cookie);
    }

    /// MessagePack-encode, encrypt, and sign the token into a cookie value.
    fn encode_cookie(&self, now: SystemTime) -> Result<String, CsrfError> {
        let packed = rmp_serde::to_vec_named(self)
            .map_err(|err| CsrfError::Malformed(format!("could not pack CSRF payload: {err}")))?;

        let cipher = CfbCipher::new(&secret::secret_bytes(&self.cookie_opts.secret))
            .map_err(CsrfError::from_crypto)?;
        let encrypted = cipher.encrypt(&packed).map_err(CsrfError::from_crypto)?;

        Ok(signed_value::sign(
            &self.cookie_opts.secret,
            &self.cookie_name(),
            &encrypted,
            now,
        ))
    }

    /// Inverse of `encode_cookie`: signature and expiry first, then
    /// decryption, then unpacking.
    fn decode(value: &str, opts: &CookieSettings, now: SystemTime) -> Result<Self, CsrfError> {
        let encrypted = signed_value::validate(
            &opts.secret,
            &csrf_cookie_name(opts),
            value,
            opts.expire,
            now,
        )
        .map_err(|err| match err {
            SignedValueError::SignatureInvalid => CsrfError::SignatureInvalid,
            SignedValueError::Expired => CsrfError::Expired,
        })?;

        let cipher = CfbCipher::new(&secret::secret_bytes(&opts.secret))
            .map_err(CsrfError::from_crypto)?;
        let packed = cipher.decrypt(&encrypted).map_err(CsrfError::from_crypto)?;

        let mut token: CsrfToken = rmp_serde::from_slice(&packed)
            .map_err(|err| CsrfError::Malformed(err.to_string()))?;
        token.cookie_opts = opts.clone();
        Ok(token)
    }
}

fn csrf_cookie_name(opts: &CookieSettings) -> String {
    format!("{}_csrf", opts.name)
}
