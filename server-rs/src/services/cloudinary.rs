use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::CloudinaryConfig;

/// Signs direct browser uploads; the secret never leaves the server.
#[derive(Clone)]
pub struct CloudinarySigner {
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

#[derive(Debug, Serialize)]
pub struct SignedUpload {
    #[serde(rename = "cloudName")]
    pub cloud_name: String,
    #[serde(rename = "apiKey")]
    pub api_key: String,
    pub folder: String,
    pub timestamp: i64,
    pub signature: String,
    #[serde(rename = "signatureAlgorithm")]
    pub signature_algorithm: &'static str,
    #[serde(rename = "uploadUrl")]
    pub upload_url: String,
}

impl CloudinarySigner {
    pub fn new(config: &Option<CloudinaryConfig>) -> Option<Self> {
        let config = config.as_ref()?;
        Some(Self {
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    pub fn sign(&self, folder: &str, timestamp: i64) -> SignedUpload {
        SignedUpload {
            cloud_name: self.cloud_name.clone(),
            api_key: self.api_key.clone(),
            folder: folder.to_string(),
            timestamp,
            signature: signature(&[("folder", folder), ("timestamp", &timestamp.to_string())], &self.api_secret),
            signature_algorithm: "sha256",
            upload_url: format!(
                "https://api.cloudinary.com/v1_1/{}/image/upload",
                self.cloud_name
            ),
        }
    }
}

/// Hex SHA-256 of `k1=v1&k2=v2{secret}` with keys sorted.
pub fn signature(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_sorts_params_and_appends_secret() {
        let a = signature(&[("timestamp", "1700000000"), ("folder", "tallyroster/x")], "s3cret");
        let b = signature(&[("folder", "tallyroster/x"), ("timestamp", "1700000000")], "s3cret");
        assert_eq!(a, b);

        let mut hasher = Sha256::new();
        hasher.update(b"folder=tallyroster/x&timestamp=1700000000s3cret");
        assert_eq!(a, hex::encode(hasher.finalize()));
    }

    #[test]
    fn signed_upload_targets_the_cloud() {
        let signer = CloudinarySigner::new(&Some(CloudinaryConfig {
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
        }))
        .unwrap();
        let signed = signer.sign("tallyroster/org", 42);
        assert_eq!(signed.upload_url, "https://api.cloudinary.com/v1_1/demo/image/upload");
        assert_eq!(signed.signature.len(), 64);
        assert_eq!(signed.signature_algorithm, "sha256");
    }
}
