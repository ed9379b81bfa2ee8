// ✉️ Parent notifications
//
// No real mail is sent. The outbox keeps every message so the CLI and tests
// can show what would have gone out.

use crate::error::{ServiceError, ServiceResult};
use crate::validation::is_valid_email;
use serde::Serialize;
use std::sync::{Arc, Mutex};

pub const ABSENCE_SUBJECT: &str = "Absence notification";
pub const NOTE_SUBJECT: &str = "Note notification";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn new(to: &str, subject: &str, body: String) -> Self {
        Email {
            to: to.to_string(),
            subject: subject.to_string(),
            body,
        }
    }
}

pub trait Notifier: Send {
    fn send(&self, email: Email) -> ServiceResult<()>;
}

/// In-memory notifier. Clones share the same outbox.
#[derive(Clone, Default)]
pub struct Outbox {
    sent: Arc<Mutex<Vec<Email>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Email> {
        match self.sent.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self) -> usize {
        self.sent().len()
    }
}

impl Notifier for Outbox {
    fn send(&self, email: Email) -> ServiceResult<()> {
        if !is_valid_email(&email.to) {
            return Err(ServiceError::InvalidState(format!(
                "Cannot notify '{}': not a valid e-mail address",
                email.to
            )));
        }

        tracing::info!(to = %email.to, subject = %email.subject, "notification sent");
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| ServiceError::Storage("outbox lock poisoned".to_string()))?;
        sent.push(email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbox_collects_mail() {
        let outbox = Outbox::new();
        let notifier: Box<dyn Notifier> = Box::new(outbox.clone());

        notifier
            .send(Email::new(
                "parent@example.com",
                ABSENCE_SUBJECT,
                "John Smith was absent on 2024-03-14".to_string(),
            ))
            .unwrap();

        assert_eq!(outbox.count(), 1);
        assert_eq!(outbox.sent()[0].subject, "Absence notification");
    }

    #[test]
    fn test_invalid_recipient_rejected() {
        let outbox = Outbox::new();
        let err = outbox
            .send(Email::new("nobody", NOTE_SUBJECT, String::new()))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
        assert_eq!(outbox.count(), 0);
    }
}
