use crate::error::Result;
use crate::models::{MarginOption, OutputFormat, PageSize, ResizeOption, Settings};
use directories::{ProjectDirs, UserDirs};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{debug, warn};

const SETTINGS_FILE: &str = "settings.json";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "quickcompress")
}

fn fallback_dir() -> PathBuf {
    PathBuf::from(".quickcompress")
}

pub fn get_config_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(fallback_dir)
}

pub fn settings_path() -> PathBuf {
    get_config_dir().join(SETTINGS_FILE)
}

fn data_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(fallback_dir)
}

pub fn pdfs_dir() -> PathBuf {
    data_dir().join("PDFs")
}

pub fn compressed_images_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|d| d.picture_dir().map(|p| p.join("QuickCompress")))
        .unwrap_or_else(|| data_dir().join("Compressed"))
}

pub fn staging_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.cache_dir().to_path_buf())
        .unwrap_or_else(fallback_dir)
        .join("compressed_temp")
}

pub fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    Ok(dir.to_path_buf())
}

fn atomic_write(path: &Path, data: &str) -> io::Result<()> {
    let tmp_path = path.with_extension("tmp");

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(data.as_bytes())?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)?;

    Ok(())
}

pub fn load_settings() -> Settings {
    load_settings_from(&get_config_dir())
}

pub fn load_settings_from(dir: &Path) -> Settings {
    let path = dir.join(SETTINGS_FILE);
    let Ok(data) = fs::read_to_string(&path) else {
        return Settings::default();
    };

    match serde_json::from_str::<Settings>(&data) {
        Ok(loaded) => loaded.sanitized(),
        Err(e) => {
            warn!("Corrupted {}: {e}, salvaging what we can", path.display());
            salvage_settings(&data).sanitized()
        }
    }
}

/// Picks recognizable fields out of a settings file that no longer parses as a whole.
fn salvage_settings(data: &str) -> Settings {
    let mut settings = Settings::default();
    let Ok(value) = serde_json::from_str::<serde_json::Value>(data) else {
        return settings;
    };

    let field = |section: &str, key: &str| value.get(section).and_then(|s| s.get(key)).cloned();

    if let Some(q) = field("compression", "quality").and_then(|v| v.as_u64()) {
        settings.compression.quality = u8::try_from(q).unwrap_or(u8::MAX);
    }
    if let Some(r) = field("compression", "resize").and_then(|v| serde_json::from_value::<ResizeOption>(v).ok()) {
        settings.compression.resize = r;
    }
    if let Some(f) = field("compression", "format").and_then(|v| serde_json::from_value::<OutputFormat>(v).ok()) {
        settings.compression.format = f;
    }
    if let Some(p) = field("pdf", "page_size").and_then(|v| serde_json::from_value::<PageSize>(v).ok()) {
        settings.pdf.page_size = p;
    }
    if let Some(m) = field("pdf", "margins").and_then(|v| serde_json::from_value::<MarginOption>(v).ok()) {
        settings.pdf.margins = m;
    }
    if let Some(q) = field("pdf", "image_quality").and_then(|v| v.as_u64()) {
        settings.pdf.image_quality = u8::try_from(q).unwrap_or(u8::MAX);
    }
    settings
}

pub fn save_settings(settings: &Settings) -> Result<PathBuf> {
    save_settings_to(&get_config_dir(), settings)
}

pub fn save_settings_to(dir: &Path, settings: &Settings) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(SETTINGS_FILE);
    let data = serde_json::to_string_pretty(&settings.sanitized())?;
    atomic_write(&path, &data)?;
    debug!("Saved settings to {}", path.display());
    Ok(path)
}

pub fn reset_settings_in(dir: &Path) -> Result<()> {
    let path = dir.join(SETTINGS_FILE);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub fn now_millis() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

pub fn generate_unique_file_name(base: &str, millis: i128) -> String {
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => format!("{stem}_{millis}.{ext}"),
        _ => format!("{base}_{millis}"),
    }
}

pub fn with_extension(name: &str, extension: &str) -> String {
    let suffix = format!(".{extension}");
    if name.to_ascii_lowercase().ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

pub fn unique_path(dir: &Path, base: &str) -> PathBuf {
    let mut millis = now_millis();
    loop {
        let candidate = dir.join(generate_unique_file_name(base, millis));
        if !candidate.exists() {
            return candidate;
        }
        millis += 1;
    }
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
