use std::path::{Path, PathBuf};

/// Write an executable shell script standing in for an encoder binary.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Fake encoder honoring ffmpeg's argv contract (`-i <input> ... <output>`):
/// copies the input file to the output path and exits 0.
pub fn fake_encoder_ok(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-ffmpeg-ok",
        concat!(
            "#!/bin/sh\n",
            "input=\"\"\nprev=\"\"\nlast=\"\"\n",
            "for arg in \"$@\"; do\n",
            "  if [ \"$prev\" = \"-i\" ]; then input=\"$arg\"; fi\n",
            "  prev=\"$arg\"\n",
            "  last=\"$arg\"\n",
            "done\n",
            "cp \"$input\" \"$last\"\n",
            "exit 0\n",
        ),
    )
}

/// Fake encoder that prints a diagnostic to stderr and exits nonzero.
pub fn fake_encoder_fail(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-ffmpeg-fail",
        concat!(
            "#!/bin/sh\n",
            "echo 'boom: could not open input' >&2\n",
            "exit 1\n",
        ),
    )
}

/// Fake restreamer: drops two segment files next to the manifest path (the
/// last argument), then blocks until one byte arrives on stdin — the same
/// quit convention the stop path uses with ffmpeg — and exits 0.
pub fn fake_streamer(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-streamer",
        concat!(
            "#!/bin/sh\n",
            "last=\"\"\n",
            "for arg in \"$@\"; do last=\"$arg\"; done\n",
            "out=$(dirname \"$last\")\n",
            "printf seg0 > \"$out/seg_000.ts\"\n",
            "printf seg1 > \"$out/seg_001.ts\"\n",
            "head -c 1 >/dev/null\n",
            "exit 0\n",
        ),
    )
}
