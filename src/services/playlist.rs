use std::path::Path;

use tokio::fs;

/// Manifest filename inside every stream job directory.
pub const MANIFEST_NAME: &str = "index.m3u8";

/// Segment duration in seconds requested from the encoder; also the target
/// duration advertised by synthesized manifests.
pub const SEGMENT_SECONDS: u32 = 2;

/// Minimal well-formed live manifest with no segments yet. Written at stream
/// launch so early polls receive a parseable playlist instead of a 404.
pub fn placeholder() -> String {
    format!(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:{SEGMENT_SECONDS}\n#EXT-X-MEDIA-SEQUENCE:0\n"
    )
}

/// Build a minimal live manifest referencing exactly the given segments, in
/// order. No `#EXT-X-ENDLIST`: the stream is still running and the real
/// encoder-written manifest will replace this one.
pub fn synthesize(segments: &[String]) -> String {
    let mut manifest = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    manifest.push_str(&format!("#EXT-X-TARGETDURATION:{SEGMENT_SECONDS}\n"));
    manifest.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");
    for segment in segments {
        manifest.push_str(&format!("#EXTINF:{SEGMENT_SECONDS}.0,\n"));
        manifest.push_str(segment);
        manifest.push('\n');
    }
    manifest
}

/// List `.ts` segment files in a stream directory, sorted by name. The
/// numbered naming scheme makes lexical order the production order.
pub async fn list_segments(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut segments = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.ends_with(".ts") {
            segments.push(name.to_string());
        }
    }
    segments.sort();
    Ok(segments)
}

/// Segment URIs referenced by a manifest, in order. Used by reconciliation
/// tests to assert synthesized output is parseable.
pub fn segment_uris(manifest: &str) -> Vec<String> {
    manifest
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_well_formed_and_empty() {
        let manifest = placeholder();
        assert!(manifest.starts_with("#EXTM3U"));
        assert!(segment_uris(&manifest).is_empty());
    }

    #[test]
    fn synthesized_manifest_references_exactly_the_segments() {
        let segments = vec!["abc_000.ts".to_string(), "abc_001.ts".to_string()];
        let manifest = synthesize(&segments);
        assert!(manifest.starts_with("#EXTM3U"));
        assert!(!manifest.contains("#EXT-X-ENDLIST"));
        assert_eq!(segment_uris(&manifest), segments);
    }

    #[tokio::test]
    async fn segments_listed_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["b_001.ts", "b_000.ts", "status.json", "index.m3u8"] {
            tokio::fs::write(tmp.path().join(name), b"x").await.unwrap();
        }
        let segments = list_segments(tmp.path()).await.unwrap();
        assert_eq!(segments, vec!["b_000.ts".to_string(), "b_001.ts".to_string()]);
    }
}
