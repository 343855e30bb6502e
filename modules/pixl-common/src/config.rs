use std::env;

/// Application configuration loaded from environment variables. Each binary
/// has its own constructor that reads only the variables it needs, panicking
/// with a clear message if a required one is missing — config is loaded
/// once and passed explicitly, there is no hidden ambient global.
#[derive(Debug, Clone)]
pub struct Config {
    // Registry (Postgres)
    pub database_url: String,

    // Work queues (AMQP)
    pub amqp_url: String,
    pub queue_names: Vec<String>,

    // Staging image stores
    pub orthanc_raw_url: String,
    pub orthanc_raw_username: String,
    pub orthanc_raw_password: String,
    pub orthanc_raw_aet: String,
    pub orthanc_anon_url: String,
    pub orthanc_anon_username: String,
    pub orthanc_anon_password: String,

    // Private tag identity
    pub private_tag_group: u16,
    pub private_tag_creator: String,

    // Hashing service
    pub hasher_url: String,

    // Radiology report de-identification service (opaque HTTP dependency,
    // like the hasher — report text itself is out of scope, §11)
    pub radiology_service_url: String,

    // Project config table
    pub project_config_path: String,

    // Export root
    pub export_root: String,

    // Control API
    pub api_host: String,
    pub api_port: u16,

    // Timeouts
    pub transfer_deadline_secs: u64,
    pub vna_query_modality: String,

    // Destination transports (§6) — only the ones actually configured need
    // to be non-empty; a project's `destination` selects which is used.
    pub ftp_host: String,
    pub ftp_port: u16,
    pub ftp_username: String,
    pub ftp_password: String,
    pub dicomweb_server_name: String,
    pub xnat_base_url: String,
    pub xnat_username: String,
    pub xnat_password: String,
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load config for the Study Coordinator worker binary.
    pub fn coordinator_from_env() -> Self {
        Self {
            database_url: required_env("PIXL_DATABASE_URL"),
            amqp_url: required_env("PIXL_AMQP_URL"),
            queue_names: env_or("PIXL_QUEUE_NAMES", "imaging,export")
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            orthanc_raw_url: required_env("ORTHANC_RAW_URL"),
            orthanc_raw_username: required_env("ORTHANC_RAW_USERNAME"),
            orthanc_raw_password: required_env("ORTHANC_RAW_PASSWORD"),
            orthanc_raw_aet: required_env("ORTHANC_RAW_AE_TITLE"),
            orthanc_anon_url: env_or("ORTHANC_ANON_URL", ""),
            orthanc_anon_username: env_or("ORTHANC_ANON_USERNAME", ""),
            orthanc_anon_password: env_or("ORTHANC_ANON_PASSWORD", ""),
            private_tag_group: u16::from_str_radix(
                env_or("PIXL_PRIVATE_TAG_GROUP", "000B").trim_start_matches("0x"),
                16,
            )
            .expect("PIXL_PRIVATE_TAG_GROUP must be a hex u16"),
            private_tag_creator: env_or("PIXL_PRIVATE_TAG_CREATOR", "UCLH PIXL"),
            hasher_url: required_env("HASHER_API_URL"),
            radiology_service_url: env_or("RADIOLOGY_REPORT_API_URL", ""),
            project_config_path: env_or("PIXL_PROJECT_CONFIG", "projects.toml"),
            export_root: env_or("PIXL_EXPORT_ROOT", "/exports"),
            api_host: String::new(),
            api_port: 0,
            transfer_deadline_secs: env_or("PIXL_DICOM_TRANSFER_TIMEOUT", "600")
                .parse()
                .expect("PIXL_DICOM_TRANSFER_TIMEOUT must be a number"),
            vna_query_modality: env_or("VNAQR_MODALITY", "VNAQR"),
            ftp_host: env_or("FTP_HOST", ""),
            ftp_port: env_or("FTP_PORT", "21").parse().expect("FTP_PORT must be a number"),
            ftp_username: env_or("FTP_USER_NAME", ""),
            ftp_password: env_or("FTP_USER_PASS", ""),
            dicomweb_server_name: env_or("DICOMWEB_SERVER_NAME", ""),
            xnat_base_url: env_or("XNAT_BASE_URL", ""),
            xnat_username: env_or("XNAT_USERNAME", ""),
            xnat_password: env_or("XNAT_PASSWORD", ""),
        }
    }

    /// Load config for the Control API binary.
    pub fn api_from_env() -> Self {
        let mut cfg = Self::coordinator_from_env();
        cfg.api_host = env_or("API_HOST", "0.0.0.0");
        cfg.api_port = env_or("API_PORT", "8080")
            .parse()
            .expect("API_PORT must be a number");
        cfg
    }

    /// Load config for the Exporter worker binary.
    pub fn exporter_from_env() -> Self {
        Self::coordinator_from_env()
    }

    /// Log variable presence/length for debugging, never values.
    pub fn log_redacted(&self) {
        let vars = [
            ("PIXL_DATABASE_URL", &self.database_url),
            ("PIXL_AMQP_URL", &self.amqp_url),
            ("ORTHANC_RAW_URL", &self.orthanc_raw_url),
            ("HASHER_API_URL", &self.hasher_url),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_tag_group_parses_hex() {
        assert_eq!(u16::from_str_radix("000B", 16).unwrap(), 0x000B);
    }
}
