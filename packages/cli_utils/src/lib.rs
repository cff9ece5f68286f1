#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal output for the poke-etl binaries.
//!
//! [`BuildBar`] renders one table build (ids fetched, rows kept, ids
//! skipped) and [`EntitiesBar`] tracks a `sync-all` run across entities.
//! [`init_logger`] routes `log` output through `indicatif-log-bridge` so
//! log lines don't tear the bars.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use poke_etl_source::progress::{IdOutcome, ProgressCallback};
use poke_etl_source_models::IdRange;

pub use indicatif::MultiProgress;

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Progress for one entity table build.
///
/// Spins until [`ProgressCallback::begin`] supplies the id range, then shows
/// a bar over the range with the latest id and running row/skip counts.
pub struct BuildBar {
    bar: ProgressBar,
    last_id: AtomicU32,
    rows: AtomicU64,
    skipped: AtomicU64,
}

impl BuildBar {
    /// Adds a waiting spinner labelled `label` to `multi`.
    #[must_use]
    pub fn new(multi: &MultiProgress, label: &str) -> Arc<Self> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix(label.to_string());
        bar.set_message("waiting");

        Arc::new(Self {
            bar,
            last_id: AtomicU32::new(0),
            rows: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        })
    }

    fn counts(&self) -> String {
        format!(
            "{} rows, {} skipped",
            self.rows.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed)
        )
    }
}

impl ProgressCallback for BuildBar {
    fn begin(&self, entity: &str, range: IdRange) {
        self.last_id
            .store(range.end.saturating_sub(1), Ordering::Relaxed);
        self.bar.set_length(u64::from(range.len()));
        self.bar.set_position(0);
        self.bar.set_prefix(entity.to_string());
        self.bar.set_style(
            ProgressStyle::with_template(
                "  {prefix:.bold} {wide_bar:.cyan/dim} {pos}/{len} {msg} [{eta}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        self.bar.set_message(format!("ids {range}"));
    }

    fn settled(&self, id: u32, outcome: IdOutcome) {
        match outcome {
            IdOutcome::Row => self.rows.fetch_add(1, Ordering::Relaxed),
            IdOutcome::Skipped => self.skipped.fetch_add(1, Ordering::Relaxed),
        };
        self.bar.inc(1);
        self.bar.set_message(format!(
            "id {id}/{}, {}",
            self.last_id.load(Ordering::Relaxed),
            self.counts()
        ));
    }

    fn finish(&self, failed_at: Option<u32>) {
        match failed_at {
            None => self.bar.finish_with_message(self.counts()),
            Some(id) => self.bar.abandon_with_message(format!("aborted at id {id}")),
        }
    }
}

/// Progress across the entities of one `sync-all` run.
pub struct EntitiesBar {
    bar: ProgressBar,
}

impl EntitiesBar {
    /// Adds a bar over `total` entities to `multi`.
    #[must_use]
    pub fn new(multi: &MultiProgress, total: usize) -> Self {
        let bar = multi.add(ProgressBar::new(u64::try_from(total).unwrap_or(u64::MAX)));
        bar.set_style(
            ProgressStyle::with_template(
                "Entities {wide_bar:.green/dim} {pos}/{len} {msg} [{elapsed_precise}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        Self { bar }
    }

    /// Marks `entity` as done.
    pub fn synced(&self, entity: &str, ok: bool) {
        self.bar.inc(1);
        self.bar
            .set_message(format!("{entity} {}", if ok { "ok" } else { "failed" }));
    }

    /// Stops the bar, listing the entities that failed.
    pub fn finish(&self, failed: &[String]) {
        if failed.is_empty() {
            self.bar.finish_with_message("all synced");
        } else {
            self.bar
                .abandon_with_message(format!("failed: {}", failed.join(", ")));
        }
    }
}

/// Installs `pretty_env_logger` behind `indicatif-log-bridge`.
///
/// `RUST_LOG` wins over `default_filter`. Returns the [`MultiProgress`]
/// every bar must be added to.
#[must_use]
pub fn init_logger(default_filter: &str) -> MultiProgress {
    let multi = MultiProgress::new();
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());

    let logger = pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .build();
    let level = logger.filter();

    // A second call keeps the first logger.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();
    log::set_max_level(level);

    multi
}
