// Local (on-device) alarms for native shells, kept in step with reminders.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::{broadcast::{self, error::RecvError}, RwLock};

use crate::error::ClientError;
use crate::events::ReminderEvent;
use crate::models::Reminder;
use crate::push::PermissionStatus;
use crate::types::{AlarmMap, ClockTime};

/// Alarm ids are `reminder_id * SLOTS_PER_REMINDER + slot`.
const SLOTS_PER_REMINDER: i64 = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAlarm {
    pub id: i32,
    pub reminder_id: i64,
    pub title: String,
    pub body: String,
    pub at: ClockTime,
    pub repeats_daily: bool,
}

/// Native local notification scheduler.
#[async_trait]
pub trait LocalScheduler: Send + Sync {
    async fn request_permission(&self) -> PermissionStatus;
    async fn schedule(&self, alarms: Vec<PendingAlarm>) -> Result<(), ClientError>;
    async fn cancel(&self, ids: &[i32]) -> Result<(), ClientError>;
    async fn pending(&self) -> Result<Vec<PendingAlarm>, ClientError>;
}

pub fn alarm_id(reminder_id: i64, slot: usize) -> Result<i32, ClientError> {
    let slot = slot as i64;
    if slot >= SLOTS_PER_REMINDER {
        return Err(ClientError::validation("times", "Too many reminder times for one medication."));
    }
    reminder_id
        .checked_mul(SLOTS_PER_REMINDER)
        .and_then(|base| base.checked_add(slot))
        .and_then(|id| i32::try_from(id).ok())
        .ok_or_else(|| ClientError::validation("reminder_id", format!("reminder {reminder_id} has no local alarm id")))
}

pub async fn cancel_reminder_alarms(scheduler: &dyn LocalScheduler, reminder_id: i64) -> Result<usize, ClientError> {
    let ids: Vec<i32> = scheduler
        .pending()
        .await?
        .into_iter()
        .filter(|alarm| alarm.reminder_id == reminder_id)
        .map(|alarm| alarm.id)
        .collect();
    if !ids.is_empty() {
        scheduler.cancel(&ids).await?;
        debug!("alarms:: cancelled {} alarms for reminder {}", ids.len(), reminder_id);
    }
    Ok(ids.len())
}

/// Replaces the alarms of one reminder. Disabled reminders only get cancelled.
pub async fn schedule_reminder_alarms(
    scheduler: &dyn LocalScheduler,
    reminder: &Reminder,
    medication_name: &str,
) -> Result<Vec<i32>, ClientError> {
    cancel_reminder_alarms(scheduler, reminder.id).await?;
    if !reminder.enabled {
        return Ok(Vec::new());
    }
    if scheduler.request_permission().await != PermissionStatus::Granted {
        return Err(ClientError::PermissionDenied);
    }

    let alarms = reminder
        .times
        .iter()
        .enumerate()
        .map(|(slot, at)| {
            Ok(PendingAlarm {
                id: alarm_id(reminder.id, slot)?,
                reminder_id: reminder.id,
                title: medication_name.to_string(),
                body: format!("Time to take {medication_name} ({at})"),
                at: *at,
                repeats_daily: true,
            })
        })
        .collect::<Result<Vec<_>, ClientError>>()?;

    let ids = alarms.iter().map(|a| a.id).collect();
    scheduler.schedule(alarms).await?;
    info!("alarms:: scheduled reminder {} at {:?}", reminder.id, reminder.times.iter().map(ToString::to_string).collect::<Vec<_>>());
    Ok(ids)
}

/// Scheduler that keeps alarms in memory. Used headless and in tests.
pub struct InMemoryScheduler {
    permission: PermissionStatus,
    alarms: RwLock<AlarmMap>,
}

impl InMemoryScheduler {
    pub fn new(permission: PermissionStatus) -> InMemoryScheduler {
        InMemoryScheduler {
            permission,
            alarms: RwLock::new(AlarmMap::new()),
        }
    }
}

#[async_trait]
impl LocalScheduler for InMemoryScheduler {
    async fn request_permission(&self) -> PermissionStatus {
        match self.permission {
            PermissionStatus::Prompt => PermissionStatus::Granted,
            other => other,
        }
    }

    async fn schedule(&self, alarms: Vec<PendingAlarm>) -> Result<(), ClientError> {
        let mut map = self.alarms.write().await;
        for alarm in alarms {
            map.insert(alarm.id, alarm);
        }
        Ok(())
    }

    async fn cancel(&self, ids: &[i32]) -> Result<(), ClientError> {
        let mut map = self.alarms.write().await;
        for id in ids {
            map.remove(id);
        }
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<PendingAlarm>, ClientError> {
        let mut alarms: Vec<PendingAlarm> = self.alarms.read().await.values().cloned().collect();
        alarms.sort_by_key(|a| a.id);
        Ok(alarms)
    }
}

/// Follows reminder events and keeps the local alarms in step.
pub struct AlarmSync {
    scheduler: Arc<dyn LocalScheduler>,
    reminders: HashMap<i64, Reminder>,
    medication_names: HashMap<i64, String>,
}

impl AlarmSync {
    pub fn new(scheduler: Arc<dyn LocalScheduler>, medication_names: HashMap<i64, String>) -> AlarmSync {
        AlarmSync {
            scheduler,
            reminders: HashMap::new(),
            medication_names,
        }
    }

    fn name_for(&self, medication_id: i64) -> String {
        self.medication_names
            .get(&medication_id)
            .cloned()
            .unwrap_or_else(|| "your medication".to_string())
    }

    async fn upsert(&mut self, reminder: Reminder) -> Result<(), ClientError> {
        let name = self.name_for(reminder.medication_id);
        schedule_reminder_alarms(self.scheduler.as_ref(), &reminder, &name).await?;
        self.reminders.insert(reminder.id, reminder);
        Ok(())
    }

    pub async fn apply(&mut self, event: ReminderEvent) -> Result<(), ClientError> {
        match event {
            ReminderEvent::Created(reminder) | ReminderEvent::Updated(reminder) => self.upsert(reminder).await,
            ReminderEvent::Toggled { reminder_id, enabled } => match self.reminders.get(&reminder_id).cloned() {
                Some(mut reminder) => {
                    reminder.enabled = enabled;
                    self.upsert(reminder).await
                }
                None if !enabled => cancel_reminder_alarms(self.scheduler.as_ref(), reminder_id).await.map(|_| ()),
                None => {
                    warn!("alarms:: reminder {reminder_id} enabled but its times are unknown here");
                    Ok(())
                }
            },
            ReminderEvent::Deleted { reminder_id } => {
                self.reminders.remove(&reminder_id);
                cancel_reminder_alarms(self.scheduler.as_ref(), reminder_id).await.map(|_| ())
            }
            ReminderEvent::MedicationDeleted { medication_id } => {
                let ids: Vec<i64> = self
                    .reminders
                    .values()
                    .filter(|r| r.medication_id == medication_id)
                    .map(|r| r.id)
                    .collect();
                for id in ids {
                    self.reminders.remove(&id);
                    cancel_reminder_alarms(self.scheduler.as_ref(), id).await?;
                }
                self.medication_names.remove(&medication_id);
                Ok(())
            }
        }
    }

    /// Runs until the event channel closes.
    pub async fn run(mut self, mut events: broadcast::Receiver<ReminderEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = self.apply(event).await {
                        warn!("alarms:: failed to sync alarms: {e}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("alarms:: missed {skipped} reminder events"),
                Err(RecvError::Closed) => break,
            }
        }
    }
}
