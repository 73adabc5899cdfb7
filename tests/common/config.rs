//! Fake fetcher executables and downloaders wired to them

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use routed_dl::config::ToolsConfig;
use routed_dl::{Config, RoutedDownloader};
use std::time::Duration;
use tempfile::TempDir;

/// Stand-in for `yt-dlp`: prints progress and writes `clip.mp4` into its
/// working directory
///
/// URLs containing `fail` exit 1 with an error line, URLs containing `hang`
/// record their pid in `hang.pid` and sleep. URLs containing `helper` leave a
/// background process (pid in `helper.pid`) holding the output open and then
/// succeed.
pub const FAKE_VIDEO_EXTRACTOR: &str = r#"#!/bin/sh
for last; do :; done
case "$last" in
  *fail*)
    echo "[generic] extracting $last"
    echo "ERROR: Unsupported URL: $last" >&2
    exit 1
    ;;
  *hang*)
    echo $$ > hang.pid
    exec sleep 30
    ;;
  *helper*)
    sleep 30 &
    echo $! > helper.pid
    ;;
esac
echo "[download]  25.0% of 1.00MiB"
echo "[download] 100.0% of 1.00MiB"
printf 'video' > clip.mp4
"#;

/// Stand-in for `gallery-dl`: prints one path per image and writes them
pub const FAKE_GALLERY_EXTRACTOR: &str = r#"#!/bin/sh
for name in 001.jpg 002.jpg; do
  printf 'img' > "$name"
  echo "./$name"
done
"#;

/// Write an executable shell script named `name` into `dir`
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write fake tool");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake tool");
    path
}

/// Config rooted in `dir` with the fake video and gallery extractors
/// installed and nothing else
pub fn test_config(dir: &Path) -> Config {
    let bin = dir.join("bin");
    std::fs::create_dir_all(&bin).expect("create bin dir");

    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.download.staging_dir = dir.join("staging");
    config.download.quarantine_dir = dir.join("quarantine");
    config.download.max_concurrent_downloads = 1;
    config.download.fetch_timeout = Duration::from_secs(10);
    config.download.kill_grace_period = Duration::from_millis(500);
    config.persistence.database_path = dir.join("routed-dl.db");
    config.routing.seed_known_origins = false;
    config.tools = ToolsConfig {
        video_extractor_path: Some(fake_tool(&bin, "yt-dlp", FAKE_VIDEO_EXTRACTOR)),
        gallery_extractor_path: Some(fake_tool(&bin, "gallery-dl", FAKE_GALLERY_EXTRACTOR)),
        http_fetcher_path: None,
        transfer_client_path: None,
        search_path: false,
        tools_dir: dir.join("no-tools"),
    };
    config
}

/// Downloader over [`test_config`]; keep the tempdir alive
pub async fn create_test_downloader() -> (RoutedDownloader, TempDir) {
    let temp_dir = TempDir::new().expect("create tempdir");
    let downloader = RoutedDownloader::new(test_config(temp_dir.path()))
        .await
        .expect("create downloader");
    (downloader, temp_dir)
}
