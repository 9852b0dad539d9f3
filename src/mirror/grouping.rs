//! Grouping traversal.
//!
//! Things of a grouping are synced inline, one after another, in the order
//! the remote lists them.
//!
//! Quick mode assumes the listing is newest-first and stops at the first
//! thing that is already current. The order is not checked: an unordered or
//! oldest-first listing makes quick mode stop too early.

use super::Mirror;
use crate::error::Result;
use crate::remote::{Grouping, collect_references};
use crate::types::{Event, SyncOutcome};
use serde::Serialize;

/// Tally of one grouping traversal
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GroupingReport {
    /// Things listed by the remote
    pub total: usize,
    /// Things that got a new snapshot
    pub ok: usize,
    /// Things that were already current
    pub already_downloaded: usize,
    /// Things that failed
    pub failed: usize,
    /// Whether quick mode skipped the rest of the listing
    pub stopped_early: bool,
}

impl GroupingReport {
    fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Ok => self.ok += 1,
            SyncOutcome::AlreadyDownloaded => self.already_downloaded += 1,
            SyncOutcome::Failed => self.failed += 1,
        }
    }
}

impl Mirror {
    /// Sync every thing of `grouping` into its root directory
    ///
    /// # Errors
    ///
    /// Returns an error only if the grouping's root directory cannot be
    /// created; failures of single things are counted in the report.
    pub async fn sync_grouping(&self, grouping: &Grouping) -> Result<GroupingReport> {
        let label = grouping.label();
        let references = collect_references(self.catalog.as_ref(), grouping).await;

        let mut report = GroupingReport {
            total: references.len(),
            ..GroupingReport::default()
        };
        if references.is_empty() {
            tracing::warn!(grouping = %label, "no things found");
        }

        if grouping.root.is_dir() {
            tracing::info!(grouping = %label, root = ?grouping.root, "target directory exists, resuming");
        }
        tokio::fs::create_dir_all(&grouping.root).await?;

        self.emit_event(Event::GroupingStarted {
            name: label.clone(),
            total: report.total,
        });

        let quick = self.config.mirror.quick;
        for (index, reference) in references.into_iter().enumerate() {
            tracing::info!(
                grouping = %label,
                position = index + 1,
                total = report.total,
                artifact_id = %reference.id,
                name = %reference.display_name,
                "syncing thing"
            );
            let outcome = self.engine.sync(reference, &grouping.root).await;
            report.record(outcome);

            if quick && outcome == SyncOutcome::AlreadyDownloaded {
                report.stopped_early = index + 1 < report.total;
                if report.stopped_early {
                    tracing::info!(grouping = %label, "caught up, stopping early (quick mode)");
                }
                break;
            }
        }

        tracing::info!(
            grouping = %label,
            ok = report.ok,
            already_downloaded = report.already_downloaded,
            failed = report.failed,
            stopped_early = report.stopped_early,
            "grouping finished"
        );
        self.emit_event(Event::GroupingFinished {
            name: label,
            stopped_early: report.stopped_early,
        });
        Ok(report)
    }
}
