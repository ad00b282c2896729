use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE}, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use crate::error::ClientError;
use crate::events::{ReminderEvent, ReminderEvents};
use crate::models::{
    AdherenceStats, AuthResponse, ContactMessage, Credentials, Dosage, Medication, NewMedication, NewReminder,
    RegisterTokenRequest, Reminder,
};
use crate::push::TokenRegistry;
use crate::schedule::derive_reminder_times;
use crate::session::Session;
use crate::types::{ClockTime, DeviceType};
use crate::util::get_short_token;

/// REST client for the medication backend. Authenticated calls read the
/// bearer token from the injected session on every request.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Session,
    events: ReminderEvents,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: Session, events: ReminderEvents) -> ApiClient {
        ApiClient::with_http_client(reqwest::Client::new(), base_url, session, events)
    }

    pub fn with_http_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        session: Session,
        events: ReminderEvents,
    ) -> ApiClient {
        ApiClient {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            events,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn events(&self) -> &ReminderEvents {
        &self.events
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn headers(&self) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let language = self.session.language().await;
        if let Ok(value) = HeaderValue::from_str(&language) {
            headers.insert("accept-language", value);
        }
        if let Some(token) = self.session.auth_token().await {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ClientError::Storage("stored auth token is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        debug!("api:: {} {}", method, path);
        Ok(self.http.request(method, self.url(path)).headers(self.headers().await?))
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = check_status(builder.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), ClientError> {
        check_status(builder.send().await?).await?;
        Ok(())
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        let builder = self.request(Method::POST, path).await?.json(body);
        self.send_json(builder).await
    }

    // Auth

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ClientError> {
        validate_credentials(credentials)?;
        let auth: AuthResponse = self.post_json("/api/auth/login", credentials).await?;
        self.session.set_auth_token(&auth.token).await?;
        info!("api:: logged in as user {}", auth.user.id);
        Ok(auth)
    }

    pub async fn register(&self, credentials: &Credentials, name: Option<&str>) -> Result<AuthResponse, ClientError> {
        validate_credentials(credentials)?;
        let body = json!({
            "phone": credentials.phone,
            "password": credentials.password,
            "name": name,
        });
        let auth: AuthResponse = self.post_json("/api/auth/register", &body).await?;
        self.session.set_auth_token(&auth.token).await?;
        info!("api:: registered user {}", auth.user.id);
        Ok(auth)
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.session.clear_auth_token().await
    }

    // Medications

    pub async fn list_medications(&self) -> Result<Vec<Medication>, ClientError> {
        let builder = self.request(Method::GET, "/api/user-medications").await?;
        self.send_json(builder).await
    }

    pub async fn get_medication(&self, id: i64) -> Result<Medication, ClientError> {
        let builder = self.request(Method::GET, &format!("/api/user-medications/{id}")).await?;
        self.send_json(builder).await
    }

    pub async fn create_medication(&self, medication: &NewMedication) -> Result<Medication, ClientError> {
        medication.validate()?;
        self.post_json("/api/user-medications", medication).await
    }

    /// Records the user-confirmed dosage. The UI treats it as immutable afterwards.
    pub async fn confirm_dosage(&self, medication_id: i64, dosage: &Dosage) -> Result<Medication, ClientError> {
        dosage.validate()?;
        let builder = self
            .request(Method::PUT, &format!("/api/user-medications/{medication_id}/dosage"))
            .await?
            .json(dosage);
        self.send_json(builder).await
    }

    /// Deletes a medication. The backend cascades to its reminders.
    pub async fn delete_medication(&self, medication_id: i64) -> Result<(), ClientError> {
        let builder = self
            .request(Method::DELETE, &format!("/api/user-medications/{medication_id}"))
            .await?;
        self.send_empty(builder).await?;
        self.events.publish(ReminderEvent::MedicationDeleted { medication_id });
        Ok(())
    }

    // Reminders

    pub async fn list_reminders(&self) -> Result<Vec<Reminder>, ClientError> {
        let builder = self.request(Method::GET, "/api/reminders").await?;
        self.send_json(builder).await
    }

    pub async fn create_reminder(&self, reminder: &NewReminder) -> Result<Reminder, ClientError> {
        reminder.validate()?;
        let builder = self.request(Method::POST, "/api/reminders").await?.json(reminder);
        let created: Reminder = match self.send_json(builder).await {
            Err(ClientError::BackendRejection { status: 403, .. }) => return Err(ClientError::QuotaExceeded),
            other => other?,
        };
        self.events.publish(ReminderEvent::Created(created.clone()));
        Ok(created)
    }

    /// Creates a reminder with the default slots for `times_per_day`, falling
    /// back to the medication's confirmed frequency.
    pub async fn create_auto_reminder(&self, medication: &Medication, times_per_day: Option<u32>) -> Result<Reminder, ClientError> {
        let n = times_per_day
            .or_else(|| medication.times_per_day())
            .ok_or_else(|| ClientError::validation("times_per_day", "Confirm how many times a day you take this medication."))?;
        let reminder = NewReminder {
            medication_id: medication.id,
            times: derive_reminder_times(n)?,
            enabled: true,
        };
        self.create_reminder(&reminder).await
    }

    pub async fn update_reminder_times(&self, reminder_id: i64, times: &[ClockTime]) -> Result<Reminder, ClientError> {
        if times.is_empty() {
            return Err(ClientError::validation("times", "Pick at least one reminder time."));
        }
        let builder = self
            .request(Method::PUT, &format!("/api/reminders/{reminder_id}"))
            .await?
            .json(&json!({ "times": times }));
        let updated: Reminder = self.send_json(builder).await?;
        self.events.publish(ReminderEvent::Updated(updated.clone()));
        Ok(updated)
    }

    pub async fn toggle_reminder(&self, reminder_id: i64) -> Result<Reminder, ClientError> {
        let builder = self
            .request(Method::PATCH, &format!("/api/reminders/{reminder_id}/toggle"))
            .await?;
        let toggled: Reminder = self.send_json(builder).await?;
        self.events.publish(ReminderEvent::Toggled {
            reminder_id: toggled.id,
            enabled: toggled.enabled,
        });
        Ok(toggled)
    }

    pub async fn delete_reminder(&self, reminder_id: i64) -> Result<(), ClientError> {
        let builder = self
            .request(Method::DELETE, &format!("/api/reminders/{reminder_id}"))
            .await?;
        self.send_empty(builder).await?;
        self.events.publish(ReminderEvent::Deleted { reminder_id });
        Ok(())
    }

    pub async fn adherence(&self, reminder_id: i64, days: u32) -> Result<AdherenceStats, ClientError> {
        if days == 0 {
            return Err(ClientError::validation("days", "The adherence window must be at least one day."));
        }
        let builder = self
            .request(Method::GET, &format!("/api/reminders/{reminder_id}/adherence"))
            .await?
            .query(&[("days", days)]);
        self.send_json(builder).await
    }

    // Contact

    pub async fn send_contact_message(&self, message: &ContactMessage) -> Result<(), ClientError> {
        message.validate()?;
        let builder = self.request(Method::POST, "/api/contact").await?.json(message);
        self.send_empty(builder).await
    }
}

#[async_trait]
impl TokenRegistry for ApiClient {
    async fn register_token(&self, token: &str, device_type: DeviceType) -> Result<(), ClientError> {
        let body = RegisterTokenRequest {
            token: token.to_string(),
            device_type,
        };
        let builder = self.request(Method::POST, "/api/fcm/register-token").await?.json(&body);
        self.send_empty(builder).await?;
        debug!("api:: registered push token ...{}", get_short_token(token));
        Ok(())
    }

    async fn remove_token(&self, token: &str) -> Result<(), ClientError> {
        let builder = self
            .request(Method::DELETE, "/api/fcm/remove-token")
            .await?
            .query(&[("token", token)]);
        self.send_empty(builder).await
    }

    async fn send_test_notification(&self, token: &str) -> Result<(), ClientError> {
        let builder = self
            .request(Method::POST, "/api/fcm/test-notification")
            .await?
            .json(&json!({ "token": token }));
        self.send_empty(builder).await
    }
}

fn validate_credentials(credentials: &Credentials) -> Result<(), ClientError> {
    let digits = credentials.phone.trim().trim_start_matches('+');
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ClientError::validation("phone", "Enter a valid phone number."));
    }
    if credentials.password.is_empty() {
        return Err(ClientError::validation("password", "Enter your password."));
    }
    Ok(())
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body);
    warn!("api:: backend responded {}: {}", status, message.as_deref().unwrap_or("<no detail>"));
    Err(rejection(status, message))
}

fn rejection(status: StatusCode, message: Option<String>) -> ClientError {
    ClientError::BackendRejection {
        status: status.as_u16(),
        message,
    }
}

/// Pulls a human readable message out of an error body, if the backend sent one.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "detail", "error"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(|v| v.as_str().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string))
}
