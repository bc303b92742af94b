//! Signed-link authentication for the front-office correction pages.
//!
//! The workflow engine mails the end user a link carrying `id_history`,
//! `id_task` and a signature over both. The signature is an HMAC-SHA256 with
//! the configured signing key, hex-encoded, verified in constant time. No
//! key configured means no request is authenticated (fail closed).

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    if a_bytes.len() != b_bytes.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for i in 0..a_bytes.len() {
        diff |= a_bytes[i] ^ b_bytes[i];
    }
    diff == 0
}

#[derive(Clone)]
pub struct RequestAuthenticator {
    key: Option<String>,
}

impl RequestAuthenticator {
    pub fn new(key: Option<String>) -> Self {
        Self { key }
    }

    /// Random 32-byte hex key, for dev-mode startup.
    pub fn generate_key() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    fn compute(&self, id_history: &str, id_task: &str) -> Option<String> {
        let key = self.key.as_deref()?;
        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).ok()?;
        mac.update(id_history.as_bytes());
        mac.update(b":");
        mac.update(id_task.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    /// Build the signature for a correction link.
    pub fn sign(&self, id_history: &str, id_task: &str) -> Option<String> {
        self.compute(id_history, id_task)
    }

    /// Verify the signature carried by a request.
    pub fn is_request_authenticated(
        &self,
        id_history: &str,
        id_task: &str,
        signature: &str,
    ) -> bool {
        match self.compute(id_history, id_task) {
            Some(expected) => constant_time_eq(&expected, signature),
            None => false,
        }
    }
}
