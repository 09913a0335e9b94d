use std::path::PathBuf;

/// Values an external loader (env vars, config file, CLI flags) is expected
/// to populate before handing a `Config` to `Registry::open`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the disk storage backend and the metadata store.
    pub data_dir: PathBuf,

    /// On-disk byte size of a second-tier shard's writer that triggers rollover.
    pub shard_max_size: u64,

    /// Bound on fan-out parallelism for reader acquisition and ID lookups.
    pub read_goroutine_num: usize,

    /// When set, a `text` field also gets a `.keyword` sub-field on inference.
    pub enable_text_keyword_mapping: bool,

    /// Name of the reserved timestamp field (default `@timestamp`).
    pub time_field: String,

    pub s3_credentials: Option<S3Credentials>,
    pub minio_credentials: Option<MinioCredentials>,
}

#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub bucket: String,
    pub prefix: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct MinioCredentials {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("./data"),
            shard_max_size: 50 * 1024 * 1024,
            read_goroutine_num: num_cpus::get(),
            enable_text_keyword_mapping: true,
            time_field: "@timestamp".to_string(),
            s3_credentials: None,
            minio_credentials: None,
        }
    }
}
