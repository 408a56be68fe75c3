//! Repository and output naming helpers.

use std::path::{Path, PathBuf};

/// Whether a repo id looks like an AWQ checkpoint that is not already GGUF.
pub fn is_awq_repo(repo_id: &str) -> bool {
    let lower = repo_id.to_lowercase();
    lower.contains("awq") && !lower.contains("gguf")
}

/// Guess the id of a prebuilt GGUF sibling of an AWQ repo.
///
/// `org/Model-AWQ` becomes `org/Model-GGUF`; a name without an `-AWQ`
/// suffix gets `-GGUF` appended.
pub fn suggest_gguf_alternative(repo_id: &str) -> Option<String> {
    let (org, name) = repo_id.split_once('/')?;
    if org.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    if name.to_lowercase().contains("gguf") {
        return None;
    }

    let candidates = [
        name.replace("-AWQ", "-GGUF"),
        name.replace("-awq", "-GGUF"),
        format!("{}-GGUF", name.replace("-AWQ", "").replace("-awq", "")),
    ];
    candidates
        .into_iter()
        .find(|c| c != name && c.contains("GGUF"))
        .map(|c| format!("{org}/{c}"))
}

/// Where the internal fallback saves the FP16 checkpoint for `output`.
///
/// `/models/out.gguf` becomes `/models/out_fp16`; an output without a
/// `.gguf` suffix gets `_fp16` appended.
pub fn fallback_checkpoint_path(output: &Path) -> PathBuf {
    let file_name = output
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = if file_name.to_lowercase().ends_with(".gguf") {
        &file_name[..file_name.len() - ".gguf".len()]
    } else {
        file_name.as_str()
    };
    output.with_file_name(format!("{stem}_fp16"))
}
