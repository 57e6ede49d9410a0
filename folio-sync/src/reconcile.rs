//! Catch-up job that fingerprints catalog files the ledger has not seen yet.

use anyhow::Context;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::checksum::record_checksum;
use crate::ledger::ChecksumLedger;
use crate::types::{DocumentId, Format};

const BOOK_EXTENSIONS: &[&str] = &[
    "epub", "kepub", "pdf", "mobi", "azw", "azw3", "cbz", "cbr", "cb7", "fb2", "djvu", "txt",
    "rtf", "docx", "odt", "htmlz", "lit", "prc",
];

/// One stored file of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representation {
    pub document: DocumentId,
    pub format: Format,
    pub path: PathBuf,
}

/// Source of the files that should have checksums.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn representations(&self) -> anyhow::Result<Vec<Representation>>;
}

/// Treats every book file below a directory as one representation. The
/// document id is the relative path without its extension, so `a/b.epub` and
/// `a/b.pdf` are two formats of document `a/b`.
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Symlinks are not followed, so a link back into the tree cannot
    /// produce phantom documents. Unreadable entries are logged and skipped.
    fn scan(root: &Path) -> anyhow::Result<Vec<Representation>> {
        if !root.is_dir() {
            anyhow::bail!("Library root {} is not a directory", root.display());
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable library entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(representation) = Self::representation(root, entry.path()) {
                found.push(representation);
            }
        }

        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }

    fn representation(root: &Path, path: &Path) -> Option<Representation> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        if !BOOK_EXTENSIONS.contains(&extension.as_str()) {
            return None;
        }

        let relative = path.strip_prefix(root).ok()?.with_extension("");
        let document = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        Some(Representation {
            document: DocumentId::new(document).ok()?,
            format: Format::new(&extension).ok()?,
            path: path.to_path_buf(),
        })
    }
}

#[async_trait]
impl Catalog for DirectoryCatalog {
    async fn representations(&self) -> anyhow::Result<Vec<Representation>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || Self::scan(&root)).await?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileMode {
    /// Only pairs without any ledger record.
    #[default]
    Missing,
    /// Every pair, appending a fresh record even when one exists.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub appended: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Outcome {
    Appended,
    Skipped,
    Failed,
}

pub struct Reconciler {
    ledger: Arc<dyn ChecksumLedger>,
    catalog: Arc<dyn Catalog>,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(
        ledger: Arc<dyn ChecksumLedger>,
        catalog: Arc<dyn Catalog>,
        concurrency: usize,
    ) -> Self {
        Self {
            ledger,
            catalog,
            concurrency: concurrency.max(1),
        }
    }

    /// One pass over the catalog. A file that cannot be fingerprinted is
    /// counted as failed and does not stop the pass.
    pub async fn run(&self, mode: ReconcileMode) -> anyhow::Result<ReconcileReport> {
        let representations = self
            .catalog
            .representations()
            .await
            .context("Failed to list catalog representations")?;

        // The same pair listed twice in one pass is only recorded once.
        let mut seen = HashSet::new();
        let representations = representations
            .into_iter()
            .filter(|r| seen.insert((r.document.clone(), r.format.clone())))
            .collect::<Vec<_>>();

        let mut report = ReconcileReport {
            scanned: representations.len(),
            ..Default::default()
        };

        let outcomes = stream::iter(representations)
            .map(|representation| self.reconcile_one(representation, mode))
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        for outcome in outcomes {
            match outcome {
                Outcome::Appended => report.appended += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        info!(
            scanned = report.scanned,
            appended = report.appended,
            skipped = report.skipped,
            failed = report.failed,
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn reconcile_one(&self, representation: Representation, mode: ReconcileMode) -> Outcome {
        let Representation {
            document,
            format,
            path,
        } = representation;

        if mode == ReconcileMode::Missing {
            match self.ledger.latest(&document, &format).await {
                Ok(Some(_)) => {
                    debug!(%document, %format, "Already has a checksum");
                    return Outcome::Skipped;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(%document, %format, error = %e, "Failed to query ledger");
                    return Outcome::Failed;
                }
            }
        }

        match record_checksum(self.ledger.as_ref(), document, format, &path).await {
            Ok(_) => Outcome::Appended,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping file");
                Outcome::Failed
            }
        }
    }

    /// Run `Missing` passes forever, one every `interval`. The task stops when
    /// the returned handle is dropped.
    pub fn spawn_periodic(self, interval: Duration) -> ReconcileHandle {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = self.run(ReconcileMode::Missing).await {
                    error!("Periodic reconciliation failed: {:#}", e);
                }
            }
        });

        ReconcileHandle { task }
    }
}

/// Background reconciliation task, aborted on drop.
pub struct ReconcileHandle {
    task: JoinHandle<()>,
}

impl Drop for ReconcileHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
