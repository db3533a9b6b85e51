//! Output paths, file name sanitization and size parsing

use std::path::{Path, PathBuf};

use chrono::Local;

/// Characters stripped from file names used on disk
const INVALID_NAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replace characters that are invalid in file names with `_`
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if INVALID_NAME_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Timestamped folder name `YYYY-MM-DD_HH-MM-<stem>` for one posting run
pub fn timestamped_folder_name(file_name: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M");
    format!("{}-{}", timestamp, file_stem(file_name))
}

/// Unified output path: `<output_dir>/<timestamped folder>`
pub fn unified_output_path(output_dir: &Path, file_name: &str) -> PathBuf {
    output_dir.join(timestamped_folder_name(file_name))
}

/// File name without its final extension
fn file_stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// Parse a human file size ("750KB", "1.5GB", "4096") into bytes
pub fn parse_file_size(input: &str) -> Option<u64> {
    let input = input.trim().to_uppercase();
    if input.is_empty() {
        return None;
    }

    let digits_end = input
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(digits_end);
    let value: f64 = number.parse().ok()?;

    let multiplier: u64 = match unit.trim() {
        "" | "B" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        "T" | "TB" => 1024u64.pow(4),
        _ => return None,
    };

    Some((value * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("normal.bin"), "normal.bin");
        assert_eq!(sanitize_file_name("a<b>c:d\"e/f\\g|h?i*j"), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn test_timestamped_folder_shape() {
        let name = timestamped_folder_name("archive.rar");
        // YYYY-MM-DD_HH-MM-archive
        assert!(name.ends_with("-archive"));
        let timestamp = &name[..name.len() - "-archive".len()];
        assert_eq!(timestamp.len(), "2026-01-02_15-04".len());
        assert_eq!(&timestamp[4..5], "-");
        assert_eq!(&timestamp[10..11], "_");
    }

    #[test]
    fn test_timestamped_folder_keeps_extensionless_name() {
        let name = timestamped_folder_name("noext");
        assert!(name.ends_with("-noext"));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("a.tar.gz"), "a.tar");
        assert_eq!(file_stem("plain"), "plain");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }

    #[test]
    fn test_parse_file_size() {
        assert_eq!(parse_file_size("4096"), Some(4096));
        assert_eq!(parse_file_size("750KB"), Some(750 * 1024));
        assert_eq!(parse_file_size("750 KB"), Some(750 * 1024));
        assert_eq!(parse_file_size("1.5GB"), Some(1_610_612_736));
        assert_eq!(parse_file_size("2m"), Some(2 * 1024 * 1024));
        assert_eq!(parse_file_size("1T"), Some(1024u64.pow(4)));
        assert_eq!(parse_file_size(""), None);
        assert_eq!(parse_file_size("abc"), None);
        assert_eq!(parse_file_size("10XB"), None);
    }
}
