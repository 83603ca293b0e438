//! Docker backend implementation.
//!
//! Talks to the local Docker Engine API. Files cross the container
//! boundary as single-entry tar archives, which is the only format the
//! archive endpoints accept.

use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, DownloadFromContainerOptions,
    InspectContainerOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    UploadToContainerOptions,
};
use bollard::Docker;
use futures_util::TryStreamExt;
use tracing::{debug, instrument};

use super::SandboxRuntime;

/// Sandbox runtime backed by Docker containers.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the platform's default socket or `DOCKER_HOST`.
    pub fn connect() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("Failed to connect to Docker")?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl SandboxRuntime for DockerRuntime {
    #[instrument(skip(self))]
    async fn create(&self, name: &str, image: &str) -> Result<()> {
        let options = CreateContainerOptions {
            name,
            platform: None,
        };
        let config = ContainerConfig {
            image: Some(image.to_string()),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .with_context(|| format!("Failed to create container {name} from {image}"))?;
        debug!(id = %created.id, "Container created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn start(&self, name: &str) -> Result<()> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .with_context(|| format!("Failed to start container {name}"))
    }

    async fn address(&self, name: &str) -> Result<Option<String>> {
        let inspect = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .with_context(|| format!("Failed to inspect container {name}"))?;

        Ok(inspect
            .network_settings
            .and_then(|settings| settings.ip_address)
            .filter(|ip| !ip.is_empty()))
    }

    #[instrument(skip(self))]
    async fn stop(&self, name: &str, timeout: Duration) -> Result<()> {
        let options = StopContainerOptions {
            t: i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX),
        };
        self.docker
            .stop_container(name, Some(options))
            .await
            .with_context(|| format!("Failed to stop container {name}"))
    }

    #[instrument(skip(self))]
    async fn remove(&self, name: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            v: true,
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(name, Some(options))
            .await
            .with_context(|| format!("Failed to remove container {name}"))
    }

    #[instrument(skip(self, contents), fields(len = contents.len()))]
    async fn write_file(&self, name: &str, path: &str, contents: &[u8]) -> Result<()> {
        let (dir, file_name) = split_path(path)?;
        let archive = single_file_archive(file_name, contents)?;

        let options = UploadToContainerOptions {
            path: dir.to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(name, Some(options), archive.into())
            .await
            .with_context(|| format!("Failed to copy {path} into container {name}"))
    }

    #[instrument(skip(self))]
    async fn read_file(&self, name: &str, path: &str) -> Result<Vec<u8>> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        let archive = self
            .docker
            .download_from_container(name, Some(options))
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .with_context(|| format!("Failed to copy {path} out of container {name}"))?;

        first_archive_entry(&archive).with_context(|| format!("Bad archive for {path}"))
    }
}

/// Split an absolute path into its directory and file name.
fn split_path(path: &str) -> Result<(&str, &str)> {
    let (dir, file_name) = path
        .rsplit_once('/')
        .with_context(|| format!("Not an absolute path: {path}"))?;
    anyhow::ensure!(!file_name.is_empty(), "Path names a directory: {path}");
    Ok((if dir.is_empty() { "/" } else { dir }, file_name))
}

fn single_file_archive(file_name: &str, contents: &[u8]) -> Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, file_name, contents)?;
    Ok(builder.into_inner()?)
}

fn first_archive_entry(archive: &[u8]) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(archive);
    let mut entry = archive.entries()?.next().context("Archive is empty")??;

    let mut contents = Vec::new();
    entry.read_to_end(&mut contents)?;
    Ok(contents)
}
