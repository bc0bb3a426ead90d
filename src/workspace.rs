//! # Channel Workspace
//!
//! Per-channel directory layout on disk, grounded in the original
//! `detection/manager.py`'s `create_workspace` (blocks/, frames/, crops/,
//! render-streams/, original-streams/, tests/, `bbox.json`). This crate
//! only owns creating and locating these paths — nothing in the pipeline
//! depends on what a supervisor does with them afterward.

use std::path::{Path, PathBuf};

use crate::error::{DetectError, DetectResult};

/// The directory layout rooted at `ChannelConfig::workspace_root`.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Creates every subdirectory this channel needs, idempotently.
    pub fn create(root: impl AsRef<Path>) -> DetectResult<Self> {
        let root = root.as_ref().to_path_buf();
        let workspace = Self { root };
        for dir in [
            workspace.blocks_dir(),
            workspace.frames_dir(),
            workspace.crops_dir(),
            workspace.render_streams_dir(),
            workspace.original_streams_dir(),
            workspace.tests_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| DetectError::io_at("create_workspace_dir", dir.display().to_string(), e))?;
        }
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn blocks_dir(&self) -> PathBuf {
        self.root.join("blocks")
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join("frames")
    }

    pub fn crops_dir(&self) -> PathBuf {
        self.root.join("crops")
    }

    pub fn render_streams_dir(&self) -> PathBuf {
        self.root.join("render-streams")
    }

    pub fn original_streams_dir(&self) -> PathBuf {
        self.root.join("original-streams")
    }

    pub fn tests_dir(&self) -> PathBuf {
        self.root.join("tests")
    }

    /// `save_box`'s running `{frame_name: [rects]}` ledger.
    pub fn bbox_json_path(&self) -> PathBuf {
        self.root.join("bbox.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_builds_every_subdirectory() {
        let tmp = std::env::temp_dir().join(format!("dolphin_watch_ws_test_{}", std::process::id()));
        let ws = Workspace::create(&tmp).unwrap();
        assert!(ws.blocks_dir().is_dir());
        assert!(ws.frames_dir().is_dir());
        assert!(ws.crops_dir().is_dir());
        assert!(ws.render_streams_dir().is_dir());
        assert!(ws.original_streams_dir().is_dir());
        assert!(ws.tests_dir().is_dir());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn bbox_json_path_is_under_root() {
        let ws = Workspace { root: PathBuf::from("/tmp/ch0") };
        assert_eq!(ws.bbox_json_path(), PathBuf::from("/tmp/ch0/bbox.json"));
    }
}
