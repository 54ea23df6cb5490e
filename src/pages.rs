//! Page operations: the edit workflow for in-page text.
//!
//! Resolves `(slug, locale)` to a store path, lists editable pages, and runs
//! the fetch → extract → edit → apply → write-back pipeline over the store
//! client and the segment codec. Saves are guarded by the document
//! fingerprint returned at extraction time, so edits made against a page
//! that has since changed are refused instead of silently applied to the
//! wrong structure.

use std::collections::BTreeSet;

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::SiteConfig;
use crate::models::{PageIndex, PageSegments, SegmentUpdate};
use crate::segments::{apply_updates, document_fingerprint, extract_segments};
use crate::store::RemoteStore;

/// `index` (the home pseudo-slug) or a hyphenated alphanumeric name.
pub fn is_safe_slug(slug: &str) -> bool {
    slug == "index"
        || (!slug.is_empty()
            && slug
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-'))
}

fn assert_locale(site: &SiteConfig, locale: &str) -> Result<()> {
    if site.locales.iter().any(|l| l == locale) {
        Ok(())
    } else {
        bail!(
            "unknown locale '{}' (configured: {})",
            locale,
            site.locales.join(", ")
        )
    }
}

/// Store path of one page. `index` resolves through the per-locale home
/// paths; everything else lives at `{pages_root}/{slug}.{locale}.html`.
pub fn resolve_page_path(site: &SiteConfig, slug: &str, locale: &str) -> Result<String> {
    if !is_safe_slug(slug) {
        bail!("invalid slug '{}'", slug);
    }
    assert_locale(site, locale)?;
    if slug == "index" {
        return site
            .home
            .get(locale)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no home page configured for locale '{}'", locale));
    }
    Ok(format!(
        "{}/{}.{}.html",
        site.pages_root.trim_end_matches('/'),
        slug,
        locale
    ))
}

/// List the editable pages found in the store.
pub async fn list_pages(store: &RemoteStore, site: &SiteConfig) -> Result<PageIndex> {
    let include = build_globset(&site.include_globs)?;
    let entries = store
        .list_dir(&site.pages_root)
        .await
        .with_context(|| format!("Failed to list pages under {}", site.pages_root))?;

    let mut slugs = BTreeSet::new();
    for entry in &entries {
        if entry.kind == "dir" {
            continue;
        }
        if !include.is_match(&entry.name) {
            continue;
        }
        if let Some(slug) = parse_page_name(&entry.name, &site.locales) {
            slugs.insert(slug);
        }
    }

    Ok(PageIndex {
        slugs: slugs.into_iter().collect(),
        home: vec!["index".to_string()],
    })
}

/// Parse `{slug}.{locale}.html`, accepting only configured locales.
fn parse_page_name(name: &str, locales: &[String]) -> Option<String> {
    let stem = name.strip_suffix(".html")?;
    let (slug, locale) = stem.rsplit_once('.')?;
    if slug.is_empty() || !locales.iter().any(|l| l == locale) {
        return None;
    }
    Some(slug.to_string())
}

/// Fetch a page and extract its editable segments.
pub async fn page_segments(
    store: &RemoteStore,
    site: &SiteConfig,
    slug: &str,
    locale: &str,
) -> Result<PageSegments> {
    let path = resolve_page_path(site, slug, locale)?;
    let file = store
        .get_file(&path)
        .await
        .with_context(|| format!("Failed to fetch page {} ({})", slug, path))?;
    Ok(PageSegments {
        slug: slug.to_string(),
        locale: locale.to_string(),
        path,
        fingerprint: document_fingerprint(&file.content),
        segments: extract_segments(&file.content),
    })
}

/// Apply edited segments to a page and write it back.
///
/// When `expected_fingerprint` is given it must match the page as currently
/// stored; a mismatch means the page drifted after extraction and the ids in
/// `updates` can no longer be trusted.
pub async fn save_segments(
    store: &RemoteStore,
    site: &SiteConfig,
    slug: &str,
    locale: &str,
    updates: &[SegmentUpdate],
    expected_fingerprint: Option<&str>,
) -> Result<()> {
    let path = resolve_page_path(site, slug, locale)?;
    let file = store
        .get_file(&path)
        .await
        .with_context(|| format!("Failed to fetch page {} ({})", slug, path))?;

    if let Some(expected) = expected_fingerprint {
        let current = document_fingerprint(&file.content);
        if current != expected {
            bail!(
                "page {}.{} changed since its segments were extracted; re-extract and retry",
                slug,
                locale
            );
        }
    }

    let next = apply_updates(&file.content, updates);
    let message = format!("chore(admin): update text segments for {}.{}", slug, locale);
    store
        .put_file(&path, &next, &message)
        .await
        .with_context(|| format!("Failed to save page {} ({})", slug, path))?;
    Ok(())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn site() -> SiteConfig {
        SiteConfig {
            locales: vec!["en".to_string(), "sv".to_string()],
            default_locale: "en".to_string(),
            pages_root: "src/content/pages".to_string(),
            home: HashMap::from([
                ("en".to_string(), "src/site/index.html".to_string()),
                ("sv".to_string(), "src/site/sv/index.html".to_string()),
            ]),
            include_globs: vec!["*.html".to_string()],
            slides_dir: "src/site/images/slide".to_string(),
            slides_manifest: "src/site/images/slide/slides.json".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }

    #[test]
    fn test_safe_slugs() {
        assert!(is_safe_slug("index"));
        assert!(is_safe_slug("about"));
        assert!(is_safe_slug("learn-more"));
        assert!(is_safe_slug("Page2"));
        assert!(!is_safe_slug(""));
        assert!(!is_safe_slug("../etc/passwd"));
        assert!(!is_safe_slug("a/b"));
        assert!(!is_safe_slug("a b"));
    }

    #[test]
    fn test_resolve_content_page_path() {
        let path = resolve_page_path(&site(), "about", "sv").unwrap();
        assert_eq!(path, "src/content/pages/about.sv.html");
    }

    #[test]
    fn test_resolve_home_through_locale_map() {
        assert_eq!(
            resolve_page_path(&site(), "index", "en").unwrap(),
            "src/site/index.html"
        );
        assert_eq!(
            resolve_page_path(&site(), "index", "sv").unwrap(),
            "src/site/sv/index.html"
        );
    }

    #[test]
    fn test_resolve_rejects_bad_input() {
        assert!(resolve_page_path(&site(), "../x", "en").is_err());
        assert!(resolve_page_path(&site(), "about", "de").is_err());
    }

    #[test]
    fn test_parse_page_name() {
        let locales = vec!["en".to_string(), "sv".to_string()];
        assert_eq!(
            parse_page_name("about.en.html", &locales),
            Some("about".to_string())
        );
        assert_eq!(
            parse_page_name("learn-more.sv.html", &locales),
            Some("learn-more".to_string())
        );
        assert_eq!(parse_page_name("about.de.html", &locales), None);
        assert_eq!(parse_page_name("styles.css", &locales), None);
        assert_eq!(parse_page_name(".en.html", &locales), None);
    }
}
