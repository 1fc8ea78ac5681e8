//! Background reconciliation of recharges the payer never returned from.
//!
//! A recharge stays `pending` when the payer abandons the hosted page or the
//! gateway callback is lost. Each cycle picks pending records older than
//! `min_age` but younger than `window` and settles them against the gateway
//! status, through the same path as a client verify.

use crate::config::MonitorConfig;
use crate::services::{ReconcileReport, RechargeService};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct RechargeMonitorWorker {
    service: Arc<RechargeService>,
    config: MonitorConfig,
}

impl RechargeMonitorWorker {
    pub fn new(service: Arc<RechargeService>, config: MonitorConfig) -> Self {
        Self { service, config }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            min_age_secs = self.config.min_age.as_secs(),
            window_secs = self.config.window.as_secs(),
            batch_size = self.config.batch_size,
            "recharge monitor worker started"
        );

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("recharge monitor worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.run_cycle().await;
                }
            }
        }

        info!("recharge monitor worker stopped");
    }

    /// One reconciliation pass; failures are logged, never propagated
    pub async fn run_cycle(&self) -> Option<ReconcileReport> {
        match self
            .service
            .reconcile_pending(self.config.min_age, self.config.window, self.config.batch_size)
            .await
        {
            Ok(report) if report.examined == 0 => {
                debug!("no stale pending recharges");
                Some(report)
            }
            Ok(report) => {
                info!(
                    examined = report.examined,
                    completed = report.completed,
                    failed = report.failed,
                    still_pending = report.still_pending,
                    errors = report.errors,
                    "recharge reconciliation cycle finished"
                );
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, "recharge reconciliation cycle failed");
                None
            }
        }
    }
}
