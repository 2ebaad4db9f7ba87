//! Reminder delivery loop. Polls for due reminders and delivers each at
//! most once: the sent flag is claimed with a compare-and-set before the
//! channel call, so a crash or send failure drops the reminder rather than
//! duplicating it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use agendai_channel::ChannelApi;
use agendai_core::clock::Clock;
use agendai_db::repositories::{AccountRepository, ReminderRepository};

use crate::replies;

pub struct ReminderDispatcher {
    reminders: Arc<dyn ReminderRepository>,
    accounts: Arc<dyn AccountRepository>,
    channel: Arc<dyn ChannelApi>,
    clock: Arc<dyn Clock>,
    poll_secs: u64,
}

impl ReminderDispatcher {
    pub fn new(
        reminders: Arc<dyn ReminderRepository>,
        accounts: Arc<dyn AccountRepository>,
        channel: Arc<dyn ChannelApi>,
        clock: Arc<dyn Clock>,
        poll_secs: u64,
    ) -> Self {
        Self { reminders, accounts, channel, clock, poll_secs }
    }

    pub async fn run(self: Arc<Self>) {
        info!(event_name = "dispatcher.started", poll_secs = self.poll_secs);
        let mut ticker = tokio::time::interval(Duration::from_secs(self.poll_secs));
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    /// One poll. Per-reminder failures are contained: a bad account lookup
    /// or failed send never blocks the rest of the batch.
    pub async fn run_cycle(&self) {
        let now = self.clock.now();
        let due = match self.reminders.list_due(now).await {
            Ok(due) => due,
            Err(reason) => {
                error!(event_name = "dispatcher.query_failed", error = %reason);
                return;
            }
        };

        for reminder in due {
            match self.reminders.mark_sent(&reminder.id).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        event_name = "dispatcher.already_claimed",
                        reminder_id = %reminder.id,
                        "another cycle delivered this reminder"
                    );
                    continue;
                }
                Err(reason) => {
                    error!(
                        event_name = "dispatcher.claim_failed",
                        reminder_id = %reminder.id,
                        error = %reason,
                    );
                    continue;
                }
            }

            let account = match self.accounts.find_by_id(&reminder.user_id).await {
                Ok(Some(account)) => account,
                Ok(None) => {
                    warn!(
                        event_name = "dispatcher.orphan_reminder",
                        reminder_id = %reminder.id,
                        "reminder has no account; dropping"
                    );
                    continue;
                }
                Err(reason) => {
                    error!(
                        event_name = "dispatcher.account_lookup_failed",
                        reminder_id = %reminder.id,
                        error = %reason,
                    );
                    continue;
                }
            };

            let body = replies::reminder_text(&reminder.title, reminder.event_at, account.timezone);
            match self.channel.send_text(&account.sender_id, &body).await {
                Ok(()) => {
                    info!(
                        event_name = "dispatcher.delivered",
                        reminder_id = %reminder.id,
                        sender_id = %account.sender_id,
                    );
                }
                Err(reason) => {
                    // Claimed but undelivered: the no-duplicate guarantee
                    // wins over redelivery, so this one is lost.
                    warn!(
                        event_name = "dispatcher.delivery_failed",
                        reminder_id = %reminder.id,
                        error = %reason,
                    );
                }
            }
        }
    }
}
