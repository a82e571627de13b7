use std::{
    fs, io,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::{info, warn};
use thiserror::Error;

const BEGIN_MARKER: &str = "# >>> focusbuddy block >>>";
const END_MARKER: &str = "# <<< focusbuddy block <<<";
const REDIRECT_ADDR: &str = "127.0.0.1";

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("permission denied writing {path}")]
    PermissionDenied { path: PathBuf },
    #[error("failed to update {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BlockError {
    fn from_io(path: &std::path::Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        if source.kind() == io::ErrorKind::PermissionDenied {
            BlockError::PermissionDenied { path }
        } else {
            BlockError::Io { path, source }
        }
    }
}

/// System-level block list for distracting destinations. Both operations
/// must be safe to repeat.
pub trait SiteBlocker: Send + Sync {
    fn block(&self, sites: &[String]) -> Result<(), BlockError>;
    fn unblock(&self) -> Result<(), BlockError>;
}

/// Redirects sites to localhost through a marked section of the hosts file.
pub struct HostsFileBlocker {
    path: PathBuf,
}

impl HostsFileBlocker {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read(&self) -> Result<String, BlockError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(BlockError::from_io(&self.path, err)),
        }
    }

    fn write(&self, contents: &str) -> Result<(), BlockError> {
        fs::write(&self.path, contents).map_err(|err| BlockError::from_io(&self.path, err))
    }
}

/// Returns `contents` with any focusbuddy section removed.
fn strip_block(contents: &str) -> String {
    let mut kept = Vec::new();
    let mut inside = false;
    for line in contents.lines() {
        match line.trim() {
            BEGIN_MARKER => inside = true,
            END_MARKER => inside = false,
            _ if !inside => kept.push(line),
            _ => {}
        }
    }
    let mut out = kept.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn render_block(sites: &[String]) -> String {
    let mut block = format!("{BEGIN_MARKER}\n");
    for site in sites {
        let host = site.trim().trim_start_matches("www.");
        if host.is_empty() {
            continue;
        }
        block.push_str(&format!("{REDIRECT_ADDR} {host}\n"));
        block.push_str(&format!("{REDIRECT_ADDR} www.{host}\n"));
    }
    block.push_str(END_MARKER);
    block.push('\n');
    block
}

impl SiteBlocker for HostsFileBlocker {
    fn block(&self, sites: &[String]) -> Result<(), BlockError> {
        let current = self.read()?;
        let mut updated = strip_block(&current);
        updated.push_str(&render_block(sites));
        if updated != current {
            self.write(&updated)?;
            info!("blocked {} sites in {}", sites.len(), self.path.display());
        }
        Ok(())
    }

    fn unblock(&self) -> Result<(), BlockError> {
        let current = self.read()?;
        if !current.contains(BEGIN_MARKER) {
            return Ok(());
        }
        self.write(&strip_block(&current))?;
        info!("removed site block from {}", self.path.display());
        Ok(())
    }
}

/// Releases a site block exactly once: explicitly via [`BlockGuard::release`]
/// or implicitly when dropped.
pub struct BlockGuard {
    blocker: Arc<dyn SiteBlocker>,
    released: AtomicBool,
}

impl BlockGuard {
    /// Applies the block. The guard is returned only if blocking succeeded.
    pub fn acquire(blocker: Arc<dyn SiteBlocker>, sites: &[String]) -> Result<Self, BlockError> {
        if let Err(err) = blocker.block(sites) {
            // A partially written block must not outlive the failed attempt.
            let _ = blocker.unblock();
            return Err(err);
        }
        Ok(Self {
            blocker,
            released: AtomicBool::new(false),
        })
    }

    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.blocker.unblock() {
            warn!("failed to remove site block: {err}");
        }
    }
}

impl Drop for BlockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const BASE: &str = "127.0.0.1 localhost\n::1 localhost\n";

    fn hosts() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        fs::write(&path, BASE).unwrap();
        (dir, path)
    }

    fn sites() -> Vec<String> {
        vec!["youtube.com".into(), "www.reddit.com".into()]
    }

    #[test]
    fn block_adds_both_host_forms_and_unblock_restores() {
        let (_dir, path) = hosts();
        let blocker = HostsFileBlocker::new(path.clone());

        blocker.block(&sites()).unwrap();
        let blocked = fs::read_to_string(&path).unwrap();
        assert!(blocked.starts_with(BASE));
        assert!(blocked.contains("127.0.0.1 youtube.com\n"));
        assert!(blocked.contains("127.0.0.1 www.youtube.com\n"));
        assert!(blocked.contains("127.0.0.1 reddit.com\n"));
        assert!(!blocked.contains("www.www."));

        blocker.unblock().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), BASE);
    }

    #[test]
    fn block_and_unblock_are_idempotent() {
        let (_dir, path) = hosts();
        let blocker = HostsFileBlocker::new(path.clone());

        blocker.block(&sites()).unwrap();
        let once = fs::read_to_string(&path).unwrap();
        blocker.block(&sites()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), once);
        assert_eq!(once.matches(BEGIN_MARKER).count(), 1);

        blocker.unblock().unwrap();
        blocker.unblock().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), BASE);
    }

    #[test]
    fn unreadable_location_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = HostsFileBlocker::new(dir.path().join("missing").join("hosts"));

        assert!(blocker.unblock().is_ok());
        assert!(matches!(
            blocker.block(&sites()),
            Err(BlockError::Io { .. })
        ));
    }

    #[derive(Default)]
    struct CountingBlocker {
        unblocks: AtomicUsize,
    }

    impl SiteBlocker for CountingBlocker {
        fn block(&self, _sites: &[String]) -> Result<(), BlockError> {
            Ok(())
        }

        fn unblock(&self) -> Result<(), BlockError> {
            self.unblocks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn guard_releases_exactly_once() {
        let blocker = Arc::new(CountingBlocker::default());
        let guard = BlockGuard::acquire(blocker.clone(), &sites()).unwrap();

        guard.release();
        guard.release();
        drop(guard);

        assert_eq!(blocker.unblocks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_guard_releases() {
        let blocker = Arc::new(CountingBlocker::default());
        drop(BlockGuard::acquire(blocker.clone(), &sites()).unwrap());
        assert_eq!(blocker.unblocks.load(Ordering::SeqCst), 1);
    }
}
