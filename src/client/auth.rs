//! UFile request signing.
//!
//! Requests carry `Authorization: UCloud <public_key>:<signature>`; private
//! download URLs carry the same signature as query parameters. The signature
//! is base64(HMAC-SHA1(private_key, string_to_sign)).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Signs requests with an HMAC key pair
#[derive(Clone)]
pub struct Signer {
    public_key: String,
    private_key: String,
}

impl Signer {
    pub fn new(public_key: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            private_key: private_key.into(),
        }
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Canonical string covering method, body headers, date and resource
    pub fn string_to_sign(
        method: &str,
        content_md5: &str,
        content_type: &str,
        date: &str,
        bucket: &str,
        key: &str,
    ) -> String {
        format!(
            "{}\n{}\n{}\n{}\n/{}/{}",
            method, content_md5, content_type, date, bucket, key
        )
    }

    pub fn sign(&self, string_to_sign: &str) -> String {
        let mut mac = HmacSha1::new_from_slice(self.private_key.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC takes keys of any size"));
        mac.update(string_to_sign.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Value of the `Authorization` header for a request
    pub fn authorization(
        &self,
        method: &str,
        content_type: &str,
        bucket: &str,
        key: &str,
    ) -> String {
        let string_to_sign = Self::string_to_sign(method, "", content_type, "", bucket, key);
        format!("UCloud {}:{}", self.public_key, self.sign(&string_to_sign))
    }

    /// Query string for a private download URL expiring at `expires` (unix seconds)
    pub fn private_url_query(&self, bucket: &str, key: &str, expires: i64) -> String {
        let string_to_sign =
            Self::string_to_sign("GET", "", "", &expires.to_string(), bucket, key);
        format!(
            "UCloudPublicKey={}&Signature={}&Expires={}",
            urlencoding::encode(&self.public_key),
            urlencoding::encode(&self.sign(&string_to_sign)),
            expires
        )
    }
}
