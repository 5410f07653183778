//! In-memory calendar provider.
//!
//! The reference `CalendarProvider` used by tests and single-process
//! deployments without an external calendar account. Events live in
//! per-user, per-calendar maps behind an `RwLock`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use dl_domain::clock::{IdProvider, UuidIds};
use dl_domain::error::{Error, Result};
use dl_domain::model::{CalendarEvent, CalendarInfo, EventDraft, EventPatch, EventSource};

use crate::traits::{CalendarProvider, UserCtx};

type CalendarKey = (String, String); // (user_id, calendar_id)

pub struct InMemoryCalendarProvider {
    events: RwLock<HashMap<CalendarKey, Vec<CalendarEvent>>>,
    ids: Arc<dyn IdProvider>,
}

impl Default for InMemoryCalendarProvider {
    fn default() -> Self {
        Self::new(Arc::new(UuidIds))
    }
}

impl InMemoryCalendarProvider {
    pub fn new(ids: Arc<dyn IdProvider>) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            ids,
        }
    }

    /// Seed an event directly, bypassing draft validation. Test setup only.
    pub fn seed(&self, calendar_id: &str, event: CalendarEvent) {
        let key = (event.user_id.clone(), calendar_id.to_owned());
        self.events.write().entry(key).or_default().push(event);
    }

    fn key(ctx: &UserCtx, calendar_id: &str) -> CalendarKey {
        (ctx.user_id.clone(), calendar_id.to_owned())
    }
}

#[async_trait]
impl CalendarProvider for InMemoryCalendarProvider {
    async fn list_events(
        &self,
        ctx: &UserCtx,
        calendar_id: &str,
        range: (DateTime<Utc>, DateTime<Utc>),
        max: usize,
    ) -> Result<Vec<CalendarEvent>> {
        let events = self.events.read();
        let mut matched: Vec<CalendarEvent> = events
            .get(&Self::key(ctx, calendar_id))
            .map(|list| {
                list.iter()
                    .filter(|e| e.start_time < range.1 && e.end_time > range.0)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matched.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        matched.truncate(max);
        Ok(matched)
    }

    async fn create_event(
        &self,
        ctx: &UserCtx,
        calendar_id: &str,
        draft: EventDraft,
    ) -> Result<CalendarEvent> {
        let event = CalendarEvent {
            id: self.ids.new_id(),
            user_id: ctx.user_id.clone(),
            title: draft.title,
            start_time: draft.start_time,
            end_time: draft.end_time,
            is_all_day: draft.is_all_day,
            source: EventSource::Managed,
            external_id: None,
            // Orchestrator-produced events may be re-planned later.
            is_moveable: true,
            recurrence_rule: draft.recurrence_rule,
            priority: draft.priority,
            description: draft.description,
            timezone: draft.timezone,
        };
        event.validate()?;
        self.events
            .write()
            .entry(Self::key(ctx, calendar_id))
            .or_default()
            .push(event.clone());
        Ok(event)
    }

    async fn update_event(
        &self,
        ctx: &UserCtx,
        calendar_id: &str,
        event_id: &str,
        patch: EventPatch,
    ) -> Result<CalendarEvent> {
        let mut events = self.events.write();
        let list = events
            .get_mut(&Self::key(ctx, calendar_id))
            .ok_or_else(|| Error::NotFound(format!("calendar '{calendar_id}'")))?;
        let event = list
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| Error::NotFound(format!("event '{event_id}'")))?;

        let mut updated = event.clone();
        if let Some(title) = patch.title {
            updated.title = title;
        }
        if let Some(start) = patch.start_time {
            updated.start_time = start;
        }
        if let Some(end) = patch.end_time {
            updated.end_time = end;
        }
        if let Some(description) = patch.description {
            updated.description = Some(description);
        }
        if let Some(priority) = patch.priority {
            updated.priority = Some(priority);
        }
        updated.validate()?;
        *event = updated.clone();
        Ok(updated)
    }

    async fn delete_event(&self, ctx: &UserCtx, calendar_id: &str, event_id: &str) -> Result<()> {
        let mut events = self.events.write();
        let list = events
            .get_mut(&Self::key(ctx, calendar_id))
            .ok_or_else(|| Error::NotFound(format!("calendar '{calendar_id}'")))?;
        let before = list.len();
        list.retain(|e| e.id != event_id);
        if list.len() == before {
            return Err(Error::NotFound(format!("event '{event_id}'")));
        }
        Ok(())
    }

    async fn list_calendars(&self, ctx: &UserCtx) -> Result<Vec<CalendarInfo>> {
        let events = self.events.read();
        let mut calendars: Vec<CalendarInfo> = events
            .keys()
            .filter(|(user_id, _)| user_id == &ctx.user_id)
            .map(|(_, calendar_id)| CalendarInfo {
                id: calendar_id.clone(),
                name: calendar_id.clone(),
                primary: calendar_id == "primary",
            })
            .collect();
        calendars.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(calendars)
    }

    async fn validate_credentials(&self, _ctx: &UserCtx) -> Result<bool> {
        Ok(true)
    }
}
