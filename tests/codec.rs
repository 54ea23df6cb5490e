//! Segment codec properties over a realistic page.

use copydesk::models::{Segment, SegmentUpdate};
use copydesk::segments::{apply_updates, document_fingerprint, extract_segments};

const PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Majas Atelier</title>
<style>
  .hero { color: #333; }
</style>
</head>
<body>
<nav><a href="/">Home</a><a href="/about">About</a></nav>
<main>
<h1 data-copy-id="hero-title">Handmade ceramics from Österlen</h1>
<p>Every piece is thrown by hand in our studio.</p>
<p>Visit us <b>Tuesday to Saturday</b>, all year round.</p>
</main>
<script>
  console.log("analytics < beacons");
</script>
</body>
</html>"#;

fn texts(segments: &[Segment]) -> Vec<&str> {
    segments.iter().map(|s| s.text.as_str()).collect()
}

fn update(id: &str, text: &str) -> SegmentUpdate {
    SegmentUpdate {
        id: id.to_string(),
        text: text.to_string(),
    }
}

#[test]
fn extracts_the_page_copy_and_nothing_else() {
    let segments = extract_segments(PAGE);
    let texts = texts(&segments);

    assert!(texts.contains(&"Majas Atelier"));
    assert!(texts.contains(&"Home"));
    assert!(texts.contains(&"About"));
    assert!(texts.contains(&"Handmade ceramics from Österlen"));
    assert!(texts.contains(&"Every piece is thrown by hand in our studio."));
    assert!(texts.contains(&"Tuesday to Saturday"));

    // Script and style bodies are never editable.
    assert!(!texts.iter().any(|t| t.contains("console.log")));
    assert!(!texts.iter().any(|t| t.contains("color")));
}

#[test]
fn marked_element_gets_its_marker_id() {
    let segments = extract_segments(PAGE);
    let hero = segments
        .iter()
        .find(|s| s.text.starts_with("Handmade"))
        .unwrap();
    assert_eq!(hero.id, "hero-title");
    assert_eq!(hero.parent_tag, "h1");
}

#[test]
fn empty_update_set_round_trips() {
    let next = apply_updates(PAGE, &[]);
    assert_eq!(extract_segments(&next), extract_segments(PAGE));
}

#[test]
fn editing_one_segment_leaves_the_rest_alone() {
    let before = extract_segments(PAGE);
    let studio = before
        .iter()
        .find(|s| s.text.contains("studio"))
        .unwrap();

    let next = apply_updates(
        PAGE,
        &[update(&studio.id, "Varje del drejas för hand i vår ateljé.")],
    );
    let after = extract_segments(&next);

    assert_eq!(after.len(), before.len());
    for (a, b) in before.iter().zip(after.iter()) {
        if a.id == studio.id {
            assert_eq!(b.text, "Varje del drejas för hand i vår ateljé.");
        } else {
            assert_eq!(a, b);
        }
    }
}

#[test]
fn repeated_extraction_is_deterministic() {
    assert_eq!(extract_segments(PAGE), extract_segments(PAGE));
}

#[test]
fn positional_ids_shift_when_structure_changes_but_markers_hold() {
    let drifted = PAGE.replace("<main>", "<main>\n<div class=\"banner\">Summer closure</div>");

    let before = extract_segments(PAGE);
    let after = extract_segments(&drifted);

    let find = |segments: &[Segment], needle: &str| {
        segments
            .iter()
            .find(|s| s.text.contains(needle))
            .map(|s| s.id.clone())
            .unwrap()
    };

    // Positional ids under <main> moved.
    assert_ne!(find(&before, "studio"), find(&after, "studio"));
    // The marker id did not.
    assert_eq!(find(&before, "Handmade"), find(&after, "Handmade"));

    // Stale positional updates fall into the void rather than landing on the
    // wrong node's marker; the marker id still applies.
    let next = apply_updates(&drifted, &[update("hero-title", "Keramik från Österlen")]);
    assert!(extract_segments(&next)
        .iter()
        .any(|s| s.text == "Keramik från Österlen"));
}

#[test]
fn markup_in_an_edit_stays_text() {
    let before = extract_segments(PAGE);
    let studio = before.iter().find(|s| s.text.contains("studio")).unwrap();

    let next = apply_updates(
        PAGE,
        &[update(&studio.id, "<img src=x onerror=alert(1)> & more")],
    );
    assert!(!next.contains("<img src=x"));
    assert!(next.contains("&lt;img src=x onerror=alert(1)&gt; &amp; more"));
    // No new segments appeared: the edit added no structure.
    assert_eq!(extract_segments(&next).len(), before.len());
}

#[test]
fn fingerprint_tracks_the_exact_bytes() {
    let a = document_fingerprint(PAGE);
    assert_eq!(a, document_fingerprint(PAGE));
    assert_ne!(a, document_fingerprint(&PAGE.replace("studio", "workshop")));
}
