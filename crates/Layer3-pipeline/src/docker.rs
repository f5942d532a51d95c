//! Docker engine plumbing - image resolution and container lifecycle
//!
//! Thin wrappers over the bollard client. The engine's primitives are
//! consumed as capabilities; nothing here inspects container internals.

use bollard::container::{Config, CreateContainerOptions, StartContainerOptions};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info};
use wercker_core::BoxRef;
use wercker_foundation::{Error, Result};

/// Resolve the image id for a box, pulling it when no local tag matches
pub async fn ensure_image(docker: &Docker, box_ref: &BoxRef) -> Result<String> {
    if let Some(id) = find_local_image(docker, &box_ref.name).await? {
        debug!("image {} already present", box_ref.name);
        return Ok(id);
    }

    info!("pulling image {}", box_ref.name);
    let options = CreateImageOptions {
        from_image: box_ref.name.clone(),
        ..Default::default()
    };
    let mut progress = docker.create_image(Some(options), None, None);
    while let Some(update) = progress.next().await {
        let update = update
            .map_err(|e| Error::Docker(format!("Failed to pull image {}: {}", box_ref.name, e)))?;
        if let Some(status) = update.status {
            debug!("pull {}: {}", box_ref.name, status);
        }
    }

    find_local_image(docker, &box_ref.name)
        .await?
        .ok_or_else(|| {
            Error::Docker(format!(
                "image {} not present after pull",
                box_ref.name
            ))
        })
}

/// Look for a local image whose repo tags carry the name (or `name:latest`)
async fn find_local_image(docker: &Docker, name: &str) -> Result<Option<String>> {
    let images = docker
        .list_images(Some(ListImagesOptions::<String> {
            all: false,
            ..Default::default()
        }))
        .await
        .map_err(|e| Error::Docker(format!("Failed to list images: {}", e)))?;

    let latest = format!("{}:latest", name);
    for image in images {
        if image
            .repo_tags
            .iter()
            .any(|tag| tag == name || *tag == latest)
        {
            return Ok(Some(image.id));
        }
    }
    Ok(None)
}

/// Create a build container: interactive shell, stdin open, no tty, every
/// staged host directory bind-mounted read-only
pub async fn create_build_container(
    docker: &Docker,
    image_id: &str,
    name: &str,
    binds: Vec<String>,
) -> Result<String> {
    let config = Config {
        image: Some(image_id.to_string()),
        cmd: Some(vec!["/bin/bash".to_string()]),
        open_stdin: Some(true),
        attach_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        host_config: Some(HostConfig {
            binds: if binds.is_empty() { None } else { Some(binds) },
            ..Default::default()
        }),
        ..Default::default()
    };

    let options = CreateContainerOptions {
        name: name.to_string(),
        ..Default::default()
    };

    let response = docker
        .create_container(Some(options), config)
        .await
        .map_err(|e| Error::Docker(format!("Failed to create container: {}", e)))?;

    debug!("created container {} ({})", name, response.id);
    Ok(response.id)
}

/// Start a created container
pub async fn start_container(docker: &Docker, container_id: &str) -> Result<()> {
    docker
        .start_container(container_id, None::<StartContainerOptions<String>>)
        .await
        .map_err(|e| Error::Docker(format!("Failed to start container: {}", e)))?;
    Ok(())
}
