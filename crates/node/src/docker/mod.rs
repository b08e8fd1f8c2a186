pub(crate) mod container;
pub(crate) mod engine;
pub(crate) mod image;

pub(crate) use container::{NodeContainerSpec, NODE_CONTAINER_NAME, NODE_NETWORK_NAME, NODE_PORT};
pub(crate) use engine::{DockerEngine, EngineError};
pub(crate) use image::ImageReference;

use log::{debug, warn};

/// Decides whether the local copy of `image` lags behind the registry.
///
/// Absent locally means it must be pulled. An unreachable registry is
/// treated as "up to date" so an offline host does not churn.
pub(crate) async fn should_update(engine: &DockerEngine, image: &ImageReference) -> bool {
    let local = match engine.image_inspect(image).await {
        Ok(digests) => digests,
        Err(e) => {
            debug!("Image {image} is not available locally: {e}");
            return true;
        }
    };

    let remote = match engine.manifest_inspect(image).await {
        Ok(digests) => digests,
        Err(e) => {
            warn!("Could not fetch manifest for {image}, assuming it is up to date");
            debug!("{e}");
            return false;
        }
    };

    image::is_stale(&image.repository, &local, &remote)
}
