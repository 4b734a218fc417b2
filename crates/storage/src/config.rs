/// Blob store configuration loaded from environment variables.
///
/// Defaults target the local MinIO from the development compose file.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// S3 API endpoint used by the services themselves.
    pub endpoint: String,
    /// Endpoint reachable by clients, used when signing download URLs.
    /// Falls back to `endpoint`.
    pub public_endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub upload_bucket: String,
    pub converted_bucket: String,
}

impl StorageConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default             |
    /// |----------------------------|---------------------|
    /// | `STORAGE_ENDPOINT`         | `http://minio:9000` |
    /// | `STORAGE_PUBLIC_ENDPOINT`  | unset               |
    /// | `STORAGE_ACCESS_KEY`       | `minioadmin`        |
    /// | `STORAGE_SECRET_KEY`       | `minioadmin`        |
    /// | `STORAGE_REGION`           | `us-east-1`         |
    /// | `STORAGE_UPLOAD_BUCKET`    | `uploads`           |
    /// | `STORAGE_CONVERTED_BUCKET` | `converted`         |
    pub fn from_env() -> Self {
        let var = |name: &str, default: &str| {
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        };

        Self {
            endpoint: var("STORAGE_ENDPOINT", "http://minio:9000"),
            public_endpoint: std::env::var("STORAGE_PUBLIC_ENDPOINT")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            access_key: var("STORAGE_ACCESS_KEY", "minioadmin"),
            secret_key: var("STORAGE_SECRET_KEY", "minioadmin"),
            region: var("STORAGE_REGION", "us-east-1"),
            upload_bucket: var("STORAGE_UPLOAD_BUCKET", "uploads"),
            converted_bucket: var("STORAGE_CONVERTED_BUCKET", "converted"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://minio:9000".into(),
            public_endpoint: None,
            access_key: "minioadmin".into(),
            secret_key: "minioadmin".into(),
            region: "us-east-1".into(),
            upload_bucket: "uploads".into(),
            converted_bucket: "converted".into(),
        }
    }
}
