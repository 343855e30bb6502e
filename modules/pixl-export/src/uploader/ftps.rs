//! FTPS transport (§6): TLS control channel, `CWD` into the project slug
//! (creating it if missing), `STOR <pseudo_study_uid>.zip`.

use suppaftp::{AsyncNativeTlsConnector, AsyncNativeTlsFtpStream};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct FtpsConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

pub struct FtpsUploader {
    config: FtpsConfig,
}

impl FtpsUploader {
    pub fn new(config: FtpsConfig) -> Self {
        Self { config }
    }

    pub async fn upload(&self, bytes: &[u8], project_slug: &str, pseudo_uid: &str) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let stream = AsyncNativeTlsFtpStream::connect(&addr).await?;
        let connector = AsyncNativeTlsConnector::from(native_tls::TlsConnector::new()?);
        let mut stream = stream.into_secure(connector, &self.config.host).await?;
        stream
            .login(&self.config.username, &self.config.password)
            .await?;

        create_and_enter_dir(&mut stream, project_slug).await?;

        let filename = format!("{pseudo_uid}.zip");
        let mut cursor = std::io::Cursor::new(bytes);
        stream.put_file(&filename, &mut cursor).await?;
        stream.quit().await?;
        Ok(())
    }
}

/// `CWD` into `project_slug`, creating it first if the server rejects the
/// change with "no such directory" (§6 FTPS).
async fn create_and_enter_dir(
    stream: &mut AsyncNativeTlsFtpStream,
    project_slug: &str,
) -> Result<()> {
    if stream.cwd(project_slug).await.is_err() {
        stream.mkdir(project_slug).await?;
        stream.cwd(project_slug).await?;
    }
    Ok(())
}
