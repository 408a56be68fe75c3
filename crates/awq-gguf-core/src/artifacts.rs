//! Auxiliary artifacts carried alongside the weights.
//!
//! Config and tokenizer files are selected from an explicit allow-list of
//! well-known names. Files describing the quantized shards themselves
//! (`quant_config.json`, `*.safetensors.index.json`) are never copied, since
//! the FP16 writer produces its own index.

use std::path::Path;

use walkdir::WalkDir;

use crate::error::IoResultExt;
use crate::Result;

/// Auxiliary files matched by exact file name.
const AUXILIARY_FILE_NAMES: &[&str] = &[
    "config.json",
    "generation_config.json",
    "tokenizer.json",
    "tokenizer_config.json",
    "tokenizer.model",
    "special_tokens_map.json",
    "added_tokens.json",
    "vocab.json",
    "vocab.txt",
    "merges.txt",
    "chat_template.jinja",
    "preprocessor_config.json",
];

/// Auxiliary files matched by extension.
const AUXILIARY_EXTENSIONS: &[&str] = &["tiktoken"];

/// Whether a file name is a config/tokenizer artifact to carry forward.
pub fn is_auxiliary_artifact(file_name: &str) -> bool {
    if AUXILIARY_FILE_NAMES.contains(&file_name) {
        return true;
    }
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| AUXILIARY_EXTENSIONS.contains(&ext))
}

/// Copy every auxiliary artifact at the top level of `src` into `dest`.
///
/// Returns the copied file names, sorted.
pub fn copy_auxiliary_artifacts(src: &Path, dest: &Path) -> Result<Vec<String>> {
    std::fs::create_dir_all(dest).with_path(dest)?;

    let mut copied = Vec::new();
    for entry in std::fs::read_dir(src).with_path(src)? {
        let entry = entry.with_path(src)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_auxiliary_artifact(&name) {
            continue;
        }
        let target = dest.join(&name);
        std::fs::copy(&path, &target).with_path(&target)?;
        copied.push(name);
    }
    copied.sort();
    Ok(copied)
}

/// Number and total size of `.safetensors` shards under `dir`.
pub fn shard_summary(dir: &Path) -> (usize, u64) {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                == Some("safetensors")
        })
        .fold((0, 0), |(count, bytes), e| {
            let len = e.metadata().map(|m| m.len()).unwrap_or(0);
            (count + 1, bytes + len)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_allow_list() {
        for name in [
            "config.json",
            "tokenizer.json",
            "tokenizer_config.json",
            "tokenizer.model",
            "special_tokens_map.json",
            "generation_config.json",
            "merges.txt",
            "qwen.tiktoken",
        ] {
            assert!(is_auxiliary_artifact(name), "{name} should be copied");
        }
        for name in [
            "quant_config.json",
            "model.safetensors.index.json",
            "model-00001-of-00002.safetensors",
            "README.md",
            "tokenizer_backup.bin",
            ".gitattributes",
        ] {
            assert!(!is_auxiliary_artifact(name), "{name} should be skipped");
        }
    }

    #[test]
    fn test_copy_auxiliary_artifacts() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        std::fs::write(src.path().join("config.json"), "{}").unwrap();
        std::fs::write(src.path().join("tokenizer.json"), "{}").unwrap();
        std::fs::write(src.path().join("quant_config.json"), "{}").unwrap();
        std::fs::write(src.path().join("model.safetensors"), "w").unwrap();
        std::fs::create_dir_all(src.path().join("tokenizer.model")).unwrap();

        let out = dest.path().join("fp16");
        let copied = copy_auxiliary_artifacts(src.path(), &out).unwrap();

        assert_eq!(copied, vec!["config.json", "tokenizer.json"]);
        assert!(out.join("config.json").is_file());
        assert!(!out.join("quant_config.json").exists());
        assert!(!out.join("model.safetensors").exists());
        assert!(!out.join("tokenizer.model").exists());
    }

    #[test]
    fn test_shard_summary() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("model-00001-of-00002.safetensors"), [0u8; 10]).unwrap();
        std::fs::write(dir.path().join("model-00002-of-00002.safetensors"), [0u8; 5]).unwrap();
        std::fs::write(dir.path().join("config.json"), "{}").unwrap();

        assert_eq!(shard_summary(dir.path()), (2, 15));
    }
}
