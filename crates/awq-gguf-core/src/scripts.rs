//! Embedded Python helper scripts and deployment utilities.
//!
//! The tensor runtime, the AWQ loader and the model-hub client are only
//! reachable from Python, so the default collaborators drive them through
//! these scripts. Scripts are written to disk on first use or when the
//! embedded content changes (detected via hash comparison).

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::IoResultExt;
use crate::Result;

pub const HUB_SNAPSHOT_NAME: &str = "hub_snapshot.py";
pub const AWQ_DEQUANTIZE_NAME: &str = "awq_dequantize.py";
pub const FP16_EXPORT_NAME: &str = "fp16_export.py";

/// Download a full repository snapshot as plain files.
pub const HUB_SNAPSHOT_SCRIPT: &str = r#"#!/usr/bin/env python3
"""Download a model-hub snapshot into a directory without symlinks."""
import argparse
import json
import sys

def progress(stage, **kwargs):
    print(json.dumps({"stage": stage, **kwargs}), flush=True)

def main():
    parser = argparse.ArgumentParser()
    parser.add_argument("--repo-id", required=True)
    parser.add_argument("--dest", required=True)
    args = parser.parse_args()

    from huggingface_hub import snapshot_download

    progress("downloading", message=f"Fetching {args.repo_id}")
    path = snapshot_download(
        args.repo_id,
        local_dir=args.dest,
        local_dir_use_symlinks=False,
    )
    progress("downloaded", path=path)

if __name__ == "__main__":
    try:
        main()
    except Exception as e:
        print(str(e), file=sys.stderr, flush=True)
        sys.exit(1)
"#;

/// Load an AWQ checkpoint, force FP16 and write a sharded safetensors set.
pub const AWQ_DEQUANTIZE_SCRIPT: &str = r#"#!/usr/bin/env python3
"""Dequantize an AWQ checkpoint to an FP16 safetensors shard set."""
import argparse
import gc
import json
import sys

def progress(stage, **kwargs):
    print(json.dumps({"stage": stage, **kwargs}), flush=True)

def main():
    parser = argparse.ArgumentParser()
    parser.add_argument("--model-dir", required=True)
    parser.add_argument("--out-dir", required=True)
    parser.add_argument("--device", default="cpu")
    parser.add_argument("--max-shard-size", default="10GB")
    args = parser.parse_args()

    import torch
    from awq import AutoAWQForCausalLM
    from transformers import AutoConfig

    device = args.device
    model = AutoAWQForCausalLM.from_quantized(
        args.model_dir,
        fuse_layers=False,
        device_map=device if device == "cuda" else None,
    )
    progress("loaded", device=device)

    hf_model = model.model
    config = AutoConfig.from_pretrained(args.model_dir)
    config.save_pretrained(args.out_dir)

    hf_model.to(torch.float16)
    progress("saving", path=args.out_dir)
    hf_model.save_pretrained(
        args.out_dir,
        safe_serialization=True,
        max_shard_size=args.max_shard_size,
    )

    del model
    del hf_model
    gc.collect()
    if device == "cuda":
        torch.cuda.empty_cache()
    progress("released")

if __name__ == "__main__":
    try:
        main()
    except Exception as e:
        print(str(e), file=sys.stderr, flush=True)
        sys.exit(1)
"#;

/// Re-save an FP16 shard set as a standalone checkpoint.
pub const FP16_EXPORT_SCRIPT: &str = r#"#!/usr/bin/env python3
"""Save an FP16 model directory as a self-contained checkpoint."""
import argparse
import json
import sys

def progress(stage, **kwargs):
    print(json.dumps({"stage": stage, **kwargs}), flush=True)

def main():
    parser = argparse.ArgumentParser()
    parser.add_argument("--model-dir", required=True)
    parser.add_argument("--dest", required=True)
    args = parser.parse_args()

    from transformers import AutoModelForCausalLM

    model = AutoModelForCausalLM.from_pretrained(
        args.model_dir,
        torch_dtype="float16",
        device_map="cpu",
    )
    model.save_pretrained(args.dest, safe_serialization=True)
    progress("exported", path=args.dest)

if __name__ == "__main__":
    try:
        main()
    except Exception as e:
        print(str(e), file=sys.stderr, flush=True)
        sys.exit(1)
"#;

const ALL_SCRIPTS: &[(&str, &str)] = &[
    (HUB_SNAPSHOT_NAME, HUB_SNAPSHOT_SCRIPT),
    (AWQ_DEQUANTIZE_NAME, AWQ_DEQUANTIZE_SCRIPT),
    (FP16_EXPORT_NAME, FP16_EXPORT_SCRIPT),
];

/// Compute a short hash of a string for staleness checking.
fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..8])
}

/// Deploy embedded scripts to `dir` if missing or outdated.
///
/// Uses a `.hash` sidecar file per script to detect when the embedded
/// content has changed and needs to be rewritten.
pub fn ensure_scripts_deployed(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_path(dir)?;
    for (name, content) in ALL_SCRIPTS {
        deploy_script(dir, name, content)?;
    }
    debug!("Helper scripts deployed to {}", dir.display());
    Ok(())
}

/// Path of a deployed script.
pub fn script_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

fn deploy_script(dir: &Path, filename: &str, content: &str) -> Result<()> {
    let script_path = dir.join(filename);
    let hash_path = dir.join(format!("{filename}.hash"));
    let current_hash = content_hash(content);

    if script_path.exists() {
        if let Ok(stored_hash) = std::fs::read_to_string(&hash_path) {
            if stored_hash.trim() == current_hash {
                debug!("{} is up to date", filename);
                return Ok(());
            }
        }
    }

    std::fs::write(&script_path, content).with_path(&script_path)?;
    std::fs::write(&hash_path, &current_hash).with_path(&hash_path)?;
    Ok(())
}
