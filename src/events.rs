use log::debug;
use tokio::sync::broadcast;

use crate::models::Reminder;

const EVENT_CAPACITY: usize = 64;

/// Reminder changes that other views need to react to.
#[derive(Clone, Debug, PartialEq)]
pub enum ReminderEvent {
    Created(Reminder),
    Updated(Reminder),
    Toggled { reminder_id: i64, enabled: bool },
    Deleted { reminder_id: i64 },
    /// The backend removed the medication's reminders along with it.
    MedicationDeleted { medication_id: i64 },
}

#[derive(Clone)]
pub struct ReminderEvents {
    sender: broadcast::Sender<ReminderEvent>,
}

impl ReminderEvents {
    pub fn new() -> ReminderEvents {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        ReminderEvents { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReminderEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ReminderEvent) {
        // Err only means nobody is listening.
        if self.sender.send(event).is_err() {
            debug!("events:: no subscribers");
        }
    }
}

impl Default for ReminderEvents {
    fn default() -> Self {
        ReminderEvents::new()
    }
}
