//! Slideshow operations: rotate the home-page slide images.
//!
//! Slides are image files in a store directory plus a JSON manifest listing
//! the rotation. Uploads and deletes go through the store client's binary
//! write and delete paths; manifest maintenance after a delete is
//! best-effort, matching the admin's tolerance for a manifest that lags the
//! directory.

use anyhow::{bail, Context, Result};
use tracing::warn;

use crate::config::SiteConfig;
use crate::models::{SlideEntry, Slideshow};
use crate::store::RemoteStore;

const IMAGE_EXTENSIONS: [&str; 5] = ["webp", "jpg", "jpeg", "png", "avif"];

/// A bare file name: alphanumerics, `-`, `_`, `.` — no path separators.
pub fn is_safe_slide_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn is_image_name(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn slide_path(site: &SiteConfig, name: &str) -> String {
    format!("{}/{}", site.slides_dir.trim_end_matches('/'), name)
}

/// List slide images present in the store alongside the manifest rows.
pub async fn list_slides(store: &RemoteStore, site: &SiteConfig) -> Result<Slideshow> {
    let entries = store
        .list_dir(&site.slides_dir)
        .await
        .with_context(|| format!("Failed to list slides under {}", site.slides_dir))?;
    let files = entries
        .iter()
        .filter(|e| e.kind != "dir" && is_image_name(&e.name))
        .map(|e| e.name.clone())
        .collect();
    Ok(Slideshow {
        files,
        manifest: fetch_manifest(store, site).await,
    })
}

/// A missing or unparsable manifest is an empty slideshow, not an error.
async fn fetch_manifest(store: &RemoteStore, site: &SiteConfig) -> Vec<SlideEntry> {
    match store.get_file(&site.slides_manifest).await {
        Ok(file) => serde_json::from_str(&file.content).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

/// Replace the manifest wholesale.
pub async fn save_manifest(
    store: &RemoteStore,
    site: &SiteConfig,
    entries: &[SlideEntry],
) -> Result<()> {
    let body = format!("{}\n", serde_json::to_string_pretty(entries)?);
    store
        .put_file(
            &site.slides_manifest,
            &body,
            "chore(admin): update slides manifest",
        )
        .await
        .with_context(|| "Failed to save slides manifest")?;
    Ok(())
}

/// Upload a slide image.
pub async fn upload_slide(
    store: &RemoteStore,
    site: &SiteConfig,
    name: &str,
    bytes: &[u8],
) -> Result<()> {
    if !is_safe_slide_name(name) {
        bail!("invalid slide name '{}'", name);
    }
    if !is_image_name(name) {
        bail!(
            "'{}' is not a supported image ({})",
            name,
            IMAGE_EXTENSIONS.join(", ")
        );
    }
    if bytes.len() > site.max_upload_bytes {
        bail!(
            "slide '{}' is {} bytes, over the {} byte limit",
            name,
            bytes.len(),
            site.max_upload_bytes
        );
    }
    let path = slide_path(site, name);
    store
        .put_binary(&path, bytes, &format!("chore(admin): upload {}", name))
        .await
        .with_context(|| format!("Failed to upload slide {}", name))?;
    Ok(())
}

/// Delete a slide image, then prune it from the manifest (best effort).
pub async fn delete_slide(store: &RemoteStore, site: &SiteConfig, name: &str) -> Result<()> {
    if !is_safe_slide_name(name) {
        bail!("invalid slide name '{}'", name);
    }
    let path = slide_path(site, name);
    store
        .delete_file(&path, &format!("chore(admin): delete {}", name))
        .await
        .with_context(|| format!("Failed to delete slide {}", name))?;

    match store.get_file(&site.slides_manifest).await {
        Ok(file) => {
            let current: Vec<SlideEntry> = serde_json::from_str(&file.content).unwrap_or_default();
            let next: Vec<SlideEntry> = current
                .into_iter()
                .filter(|e| e.filename != name)
                .collect();
            let body = match serde_json::to_string_pretty(&next) {
                Ok(json) => format!("{}\n", json),
                Err(e) => {
                    warn!("failed to serialize pruned manifest after deleting {}: {}", name, e);
                    return Ok(());
                }
            };
            if let Err(e) = store
                .put_file(&site.slides_manifest, &body, "chore(admin): prune manifest")
                .await
            {
                warn!("failed to update manifest after deleting {}: {}", name, e);
            }
        }
        Err(e) => warn!("failed to read manifest after deleting {}: {}", name, e),
    }
    Ok(())
}
