//! Conversation flows. One inbound message produces at most one flow run
//! and exactly one user-facing outcome; collaborator failures are caught
//! here and turned into a reply, never propagated to the webhook.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use secrecy::SecretString;
use tracing::{debug, info, warn};

use agendai_agent::{ClassifierService, Extraction, ExtractorService, ResolverService, TranscriptionService};
use agendai_channel::{ChannelApi, ReplyButton};
use agendai_connect::{CalendarConnector, CalendarError, KnowledgeConnector};
use agendai_core::clock::Clock;
use agendai_core::domain::account::UserAccount;
use agendai_core::domain::event::{EventDraft, EventLogRecord, LogStatus};
use agendai_core::domain::intent::{Classification, Intent};
use agendai_core::domain::message::{InboundMessage, MessageKind};
use agendai_core::domain::reminder::ReminderRecord;
use agendai_core::errors::UpstreamError;
use agendai_core::resolver::{local_day_bounds, parse_fragments, recompose_instant, EventCandidate};
use agendai_db::repositories::{
    AccountRepository, EventLogRepository, InboxRepository, ReminderRepository,
};

use crate::replies;

/// Upcoming-event window offered to the resolver for disambiguation.
/// Day-scoped flows list the whole day instead of reusing this cap.
const CANDIDATE_LIMIT: usize = 10;

/// Reply-button cap and per-button title cap imposed by the channel.
const BUTTON_CHOICES_MAX: usize = 3;
const BUTTON_TITLE_CHARS: usize = 20;

const PROCESSING_EMOJI: &str = "⏳";

/// Everything the flows talk to, behind trait objects so tests swap in
/// doubles wholesale.
pub struct Services {
    pub accounts: Arc<dyn AccountRepository>,
    pub event_log: Arc<dyn EventLogRepository>,
    pub reminders: Arc<dyn ReminderRepository>,
    pub inbox: Arc<dyn InboxRepository>,
    pub channel: Arc<dyn ChannelApi>,
    pub transcription: Arc<dyn TranscriptionService>,
    pub classifier: Arc<dyn ClassifierService>,
    pub extractor: Arc<dyn ExtractorService>,
    pub resolver: Arc<dyn ResolverService>,
    pub calendar: Arc<dyn CalendarConnector>,
    pub knowledge: Option<Arc<dyn KnowledgeConnector>>,
    pub clock: Arc<dyn Clock>,
}

pub struct Orchestrator {
    services: Services,
    reminder_lead_minutes: i64,
}

impl Orchestrator {
    pub fn new(services: Services, reminder_lead_minutes: i64) -> Self {
        Self { services, reminder_lead_minutes }
    }

    /// Entry point for one inbound message. Infallible by design: every
    /// failure path ends in a reply attempt, and the reply attempt itself
    /// failing is only logged.
    pub async fn handle_message(&self, message: InboundMessage) {
        let now = self.services.clock.now();

        match self.services.inbox.insert_if_absent(&message.message_id, now).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    event_name = "flow.duplicate_skipped",
                    message_id = %message.message_id,
                    "channel redelivered an already-processed message"
                );
                return;
            }
            Err(error) => {
                warn!(
                    event_name = "flow.inbox_check_failed",
                    message_id = %message.message_id,
                    error = %error,
                    "processing without idempotency guarantee"
                );
            }
        }

        if let Err(error) = self.services.channel.mark_read(&message.message_id).await {
            debug!(event_name = "flow.mark_read_failed", error = %error);
        }

        if let Err(error) = self.run_flow(&message).await {
            warn!(
                event_name = "flow.failed",
                sender_id = %message.sender_id,
                error = %error,
                "flow ended in an upstream failure"
            );
            if let Err(send_error) =
                self.services.channel.send_text(&message.sender_id, error.user_reply()).await
            {
                warn!(event_name = "flow.apology_failed", error = %send_error);
            }
        }
    }

    async fn run_flow(&self, message: &InboundMessage) -> Result<(), UpstreamError> {
        let now = self.services.clock.now();
        let account = self.account_for(message, now).await?;
        let tz = account.timezone;
        let today = now.with_timezone(&tz).date_naive();

        let text = match &message.kind {
            MessageKind::Text { body } => body.clone(),
            MessageKind::Audio { media_id, mime_hint } => {
                let audio = self
                    .services
                    .channel
                    .download_media(media_id)
                    .await
                    .map_err(|error| UpstreamError::Transcription(error.to_string()))?;
                let transcript =
                    self.services.transcription.transcribe(&audio, mime_hint.as_deref()).await?;
                info!(event_name = "flow.audio_transcribed", sender_id = %message.sender_id);
                transcript
            }
            MessageKind::Unsupported { kind } => {
                return self.reply(&account, &replies::unsupported_kind(kind)).await;
            }
        };

        // Credential linking is a fixed command, handled before any model
        // call so it works even when the provider stack is down.
        if text.trim().to_lowercase().starts_with("conectar") {
            return self.link_credentials(&account, &text).await;
        }

        let classification = match self.services.classifier.classify(&text, tz, today).await {
            Ok(classification) => classification,
            Err(error) => {
                // An unreachable or incoherent classifier must not lose a
                // scheduling request. Assume the most common intent and let
                // extraction sort out the rest.
                warn!(
                    event_name = "flow.classifier_fallback",
                    error = %error,
                    "classification failed; assuming schedule intent"
                );
                Classification { intent: Intent::Schedule, target_date: None }
            }
        };
        info!(
            event_name = "flow.classified",
            sender_id = %message.sender_id,
            intent = classification.intent.as_str(),
        );

        if classification.intent.is_credential_independent() {
            return match classification.intent {
                Intent::Help => self.reply(&account, replies::HELP).await,
                Intent::Greeting => {
                    self.reply(&account, &replies::greeting(account.display_name.as_deref())).await
                }
                _ => self.reply(&account, replies::OUT_OF_SCOPE).await,
            };
        }

        let Some(credentials) = account.calendar_credentials.clone() else {
            return self.reply(&account, replies::SETUP_PROMPT).await;
        };
        // Model and provider round trips follow; the reaction tells the
        // sender the request was picked up.
        if let Err(error) = self
            .services
            .channel
            .react(&message.sender_id, &message.message_id, PROCESSING_EMOJI)
            .await
        {
            debug!(event_name = "flow.react_failed", error = %error);
        }
        match classification.intent {
            Intent::ViewAgenda => {
                self.view_agenda(&account, &credentials, classification.target_date, now).await
            }
            Intent::Schedule => {
                self.schedule(&account, &credentials, &text, message.is_audio(), now).await
            }
            Intent::Alter => self.alter(&account, &credentials, &text, today, now).await,
            _ => {
                self.cancel(&account, &credentials, &text, classification.target_date, today, now)
                    .await
            }
        }
    }

    async fn account_for(
        &self,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<UserAccount, UpstreamError> {
        let existing = self
            .services
            .accounts
            .find_by_sender(&message.sender_id)
            .await
            .map_err(storage)?;
        if let Some(account) = existing {
            return Ok(account);
        }

        let account =
            UserAccount::first_contact(&message.sender_id, message.sender_name.as_deref(), now);
        self.services.accounts.create(account.clone()).await.map_err(storage)?;
        info!(event_name = "flow.account_created", sender_id = %message.sender_id);
        Ok(account)
    }

    /// `conectar <calendar-token> [<knowledge-token:database>]`.
    async fn link_credentials(
        &self,
        account: &UserAccount,
        text: &str,
    ) -> Result<(), UpstreamError> {
        let mut tokens = text.split_whitespace().skip(1);
        let Some(calendar_token) = tokens.next() else {
            return self.reply(account, replies::CONNECT_USAGE).await;
        };
        let knowledge_token = tokens.next();

        self.services
            .accounts
            .update_credentials(
                &account.id,
                Some(SecretString::from(calendar_token.to_owned())),
                knowledge_token.map(|token| SecretString::from(token.to_owned())),
            )
            .await
            .map_err(storage)?;
        self.services.accounts.mark_onboarded(&account.id).await.map_err(storage)?;

        info!(
            event_name = "flow.credentials_linked",
            sender_id = %account.sender_id,
            knowledge = knowledge_token.is_some(),
        );
        self.reply(account, replies::CONNECTED).await
    }

    async fn view_agenda(
        &self,
        account: &UserAccount,
        credentials: &SecretString,
        day: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<(), UpstreamError> {
        let shown = match day {
            Some(day) => self.list_remaining_day(account, credentials, day, now).await?,
            None => self
                .services
                .calendar
                .list_upcoming(credentials, now, CANDIDATE_LIMIT)
                .await
                .map_err(UpstreamError::from)?,
        };

        self.reply(account, &replies::agenda(&shown, account.timezone, day)).await
    }

    async fn schedule(
        &self,
        account: &UserAccount,
        credentials: &SecretString,
        text: &str,
        was_audio: bool,
        now: DateTime<Utc>,
    ) -> Result<(), UpstreamError> {
        let draft = match self.services.extractor.extract(text, account.timezone).await? {
            Extraction::Draft(draft) => draft,
            Extraction::NoDateFound => {
                return self.reply(account, replies::NO_DATE_PROMPT).await;
            }
        };

        let (external_ref, status, error_detail) =
            match self.services.calendar.create_event(credentials, &draft).await {
                Ok(external_ref) => (Some(external_ref), LogStatus::Synced, None),
                // Expired credentials are the one calendar failure the user
                // can actually fix. Keep the extracted draft in the local log
                // so the request survives the re-link round trip.
                Err(CalendarError::CredentialExpired) => {
                    let record = EventLogRecord::from_draft(
                        &account.id,
                        &draft,
                        text,
                        was_audio,
                        None,
                        LogStatus::Created,
                        Some("calendar credentials expired".to_owned()),
                        now,
                    );
                    self.services.event_log.append(record).await.map_err(storage)?;
                    return Err(UpstreamError::CredentialExpired);
                }
                Err(error) => {
                    warn!(event_name = "flow.calendar_create_failed", error = %error);
                    (None, LogStatus::Error, Some(error.to_string()))
                }
            };

        let record = EventLogRecord::from_draft(
            &account.id,
            &draft,
            text,
            was_audio,
            external_ref.clone(),
            status,
            error_detail,
            now,
        );
        let log_id = record.id.clone();
        self.services.event_log.append(record).await.map_err(storage)?;

        let reminder_set = self
            .ensure_reminder(account, &draft, log_id, external_ref.as_deref(), now)
            .await?;
        self.record_in_knowledge(account, &draft).await;

        let reply = if status == LogStatus::Synced {
            replies::scheduled(&draft.title, draft.start, account.timezone, draft.all_day, reminder_set)
        } else {
            replies::scheduled_locally_only(&draft.title, draft.start, account.timezone, draft.all_day)
        };
        self.reply(account, &reply).await
    }

    /// All-day events, events whose lead window already passed, and events
    /// that already carry an unsent reminder get none.
    async fn ensure_reminder(
        &self,
        account: &UserAccount,
        draft: &EventDraft,
        log_id: String,
        external_ref: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, UpstreamError> {
        if draft.all_day {
            return Ok(false);
        }
        let fire_at = draft.start - Duration::minutes(self.reminder_lead_minutes);
        if fire_at <= now {
            return Ok(false);
        }
        if let Some(external_ref) = external_ref {
            let existing = self
                .services
                .reminders
                .find_unsent_by_ref(external_ref)
                .await
                .map_err(storage)?;
            if existing.is_some() {
                return Ok(false);
            }
        }

        let reminder = ReminderRecord::for_event(
            &account.id,
            &draft.title,
            draft.start,
            self.reminder_lead_minutes,
            Some(log_id),
            external_ref.map(str::to_owned),
            now,
        );
        self.services.reminders.create(reminder).await.map_err(storage)?;
        Ok(true)
    }

    async fn record_in_knowledge(&self, account: &UserAccount, draft: &EventDraft) {
        let (Some(connector), Some(credentials)) =
            (&self.services.knowledge, &account.knowledge_credentials)
        else {
            return;
        };
        if let Err(error) = connector.record_event(credentials, draft).await {
            warn!(
                event_name = "flow.knowledge_record_failed",
                error = %error,
                "knowledge base entry skipped"
            );
        }
    }

    async fn alter(
        &self,
        account: &UserAccount,
        credentials: &SecretString,
        text: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<(), UpstreamError> {
        let candidates = self
            .services
            .calendar
            .list_upcoming(credentials, now, CANDIDATE_LIMIT)
            .await
            .map_err(UpstreamError::from)?;
        if candidates.is_empty() {
            return self.reply(account, replies::NO_UPCOMING_TO_TOUCH).await;
        }

        let resolution = self
            .services
            .resolver
            .resolve(text, &candidates, account.timezone, today)
            .await?;
        if !resolution.is_actionable() {
            return self.ask_which_event(account, &candidates).await;
        }

        let matched_ref = resolution.matched_ref.as_deref().unwrap_or_default();
        let Some(candidate) = candidates.iter().find(|c| c.external_ref == matched_ref) else {
            return Err(UpstreamError::MalformedModelOutput(
                "resolver selected an unknown event reference".to_owned(),
            ));
        };

        let Some(new_start) = recompose_instant(
            candidate.start,
            account.timezone,
            resolution.new_date,
            resolution.new_time,
        ) else {
            return self.reply(account, replies::ASK_NEW_TIME).await;
        };
        let all_day = candidate.all_day && resolution.new_time.is_none();

        self.services
            .calendar
            .move_event(credentials, &candidate.external_ref, new_start, all_day)
            .await
            .map_err(UpstreamError::from)?;
        info!(
            event_name = "flow.event_moved",
            external_ref = %candidate.external_ref,
            new_start = %new_start,
        );

        self.move_reminder(&candidate.external_ref, new_start, all_day, now).await?;
        self.reply(
            account,
            &replies::rescheduled(&candidate.title, new_start, account.timezone, all_day),
        )
        .await
    }

    async fn move_reminder(
        &self,
        external_ref: &str,
        new_start: DateTime<Utc>,
        all_day: bool,
        now: DateTime<Utc>,
    ) -> Result<(), UpstreamError> {
        let Some(reminder) = self
            .services
            .reminders
            .find_unsent_by_ref(external_ref)
            .await
            .map_err(storage)?
        else {
            return Ok(());
        };

        let fire_at = new_start - Duration::minutes(self.reminder_lead_minutes);
        if all_day || fire_at <= now {
            self.services.reminders.delete_by_ref(external_ref).await.map_err(storage)?;
        } else {
            self.services
                .reminders
                .reschedule(&reminder.id, new_start, fire_at)
                .await
                .map_err(storage)?;
        }
        Ok(())
    }

    async fn cancel(
        &self,
        account: &UserAccount,
        credentials: &SecretString,
        text: &str,
        target_date: Option<NaiveDate>,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<(), UpstreamError> {
        if let Some(day) = bulk_cancel_day(text, target_date, today) {
            return self.cancel_day(account, credentials, day, now).await;
        }

        let candidates = self
            .services
            .calendar
            .list_upcoming(credentials, now, CANDIDATE_LIMIT)
            .await
            .map_err(UpstreamError::from)?;
        if candidates.is_empty() {
            return self.reply(account, replies::NO_UPCOMING_TO_TOUCH).await;
        }

        let resolution = self
            .services
            .resolver
            .resolve(text, &candidates, account.timezone, today)
            .await?;
        if !resolution.is_actionable() {
            return self.ask_which_event(account, &candidates).await;
        }

        let matched_ref = resolution.matched_ref.as_deref().unwrap_or_default();
        let Some(candidate) = candidates.iter().find(|c| c.external_ref == matched_ref) else {
            return Err(UpstreamError::MalformedModelOutput(
                "resolver selected an unknown event reference".to_owned(),
            ));
        };

        self.services
            .calendar
            .delete_event(credentials, &candidate.external_ref)
            .await
            .map_err(UpstreamError::from)?;
        self.services
            .reminders
            .delete_by_ref(&candidate.external_ref)
            .await
            .map_err(storage)?;
        info!(event_name = "flow.event_cancelled", external_ref = %candidate.external_ref);

        self.reply(account, &replies::cancelled(&candidate.title)).await
    }

    /// Deletes every event on the resolved local day, one provider call per
    /// event so a single failure never aborts the batch.
    async fn cancel_day(
        &self,
        account: &UserAccount,
        credentials: &SecretString,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<(), UpstreamError> {
        let matching = self.list_remaining_day(account, credentials, day, now).await?;
        if matching.is_empty() {
            return self.reply(account, &replies::nothing_on_day(day)).await;
        }

        let mut cancelled = Vec::new();
        let mut failed = 0usize;
        for candidate in matching {
            match self.services.calendar.delete_event(credentials, &candidate.external_ref).await {
                Ok(()) => {
                    self.services
                        .reminders
                        .delete_by_ref(&candidate.external_ref)
                        .await
                        .map_err(storage)?;
                    cancelled.push(candidate.title);
                }
                Err(error) => {
                    warn!(
                        event_name = "flow.bulk_cancel_item_failed",
                        external_ref = %candidate.external_ref,
                        error = %error,
                    );
                    failed += 1;
                }
            }
        }
        info!(
            event_name = "flow.bulk_cancelled",
            day = %day,
            cancelled = cancelled.len(),
            failed,
        );

        self.reply(account, &replies::bulk_cancelled(&cancelled, failed, day)).await
    }

    /// Every not-yet-started event of the local day. Exhaustive on purpose:
    /// day-scoped flows must never act on a truncated listing.
    async fn list_remaining_day(
        &self,
        account: &UserAccount,
        credentials: &SecretString,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<EventCandidate>, UpstreamError> {
        let (from, to) = local_day_bounds(day, account.timezone);
        self.services
            .calendar
            .list_window(credentials, from.max(now), to)
            .await
            .map_err(UpstreamError::from)
    }

    /// Up to three choices fit the channel's reply-button cap; longer lists
    /// fall back to a numbered text listing, as does a failed button send.
    async fn ask_which_event(
        &self,
        account: &UserAccount,
        candidates: &[EventCandidate],
    ) -> Result<(), UpstreamError> {
        if candidates.len() <= BUTTON_CHOICES_MAX {
            let buttons: Vec<ReplyButton> = candidates
                .iter()
                .map(|candidate| ReplyButton {
                    id: candidate.external_ref.clone(),
                    title: candidate.title.chars().take(BUTTON_TITLE_CHARS).collect(),
                })
                .collect();
            match self
                .services
                .channel
                .send_buttons(&account.sender_id, replies::ASK_WHICH_EVENT, &buttons)
                .await
            {
                Ok(()) => return Ok(()),
                Err(error) => {
                    debug!(event_name = "flow.button_prompt_failed", error = %error);
                }
            }
        }
        self.reply(account, &replies::candidate_listing(candidates, account.timezone)).await
    }

    async fn reply(&self, account: &UserAccount, body: &str) -> Result<(), UpstreamError> {
        self.services
            .channel
            .send_text(&account.sender_id, body)
            .await
            .map_err(|error| UpstreamError::Channel(error.to_string()))
    }
}

/// A cancel message naming "everything" plus a resolvable day is a bulk
/// cancel; anything else goes through single-event resolution.
fn bulk_cancel_day(
    text: &str,
    target_date: Option<NaiveDate>,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let normalized = text.to_lowercase();
    let all_of = ["tudo", "todos", "todas"]
        .iter()
        .any(|word| normalized.split(|c: char| !c.is_alphanumeric()).any(|w| w == *word));
    if !all_of {
        return None;
    }
    target_date.or_else(|| parse_fragments(text, today).0)
}

fn storage(error: agendai_db::repositories::RepositoryError) -> UpstreamError {
    UpstreamError::Storage(error.to_string())
}
