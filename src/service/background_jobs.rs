// service/background_jobs.rs
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration};

use crate::AppState;

const RECONCILE_BATCH: i64 = 100;
const REMINDER_BATCH: i64 = 200;

/// Replays escrow release for completed gigs that never got paid out, e.g.
/// after a crash between commit and release.
pub async fn start_escrow_reconciliation_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(app_state.env.escrow_reconcile_interval_secs));

    loop {
        interval.tick().await;

        tracing::debug!("Running escrow reconciliation job at {}", Utc::now());

        match app_state
            .completion_service
            .reconcile_escrow_releases(RECONCILE_BATCH)
            .await
        {
            Ok(0) => {}
            Ok(settled) => tracing::info!("Escrow reconciliation settled {} gig(s)", settled),
            Err(e) => tracing::error!("Escrow reconciliation job failed: {}", e),
        }
    }
}

/// Reminds parties of gigs stuck waiting on their confirmation. Runs hourly.
pub async fn start_confirmation_reminder_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(3600));
    let threshold = chrono::Duration::hours(app_state.env.confirmation_reminder_hours);

    loop {
        interval.tick().await;

        tracing::info!("Running confirmation reminder job at {}", Utc::now());

        match app_state
            .completion_service
            .send_confirmation_reminders(threshold, REMINDER_BATCH)
            .await
        {
            Ok(sent) => tracing::info!("Confirmation reminder job completed: {} reminder(s) sent", sent),
            Err(e) => tracing::error!("Confirmation reminder job failed: {}", e),
        }
    }
}
