// Push notification token lifecycle.
//
// Unregistered -> PermissionRequested -> PermissionGranted | PermissionDenied
//  -> TokenObtained -> RegisteredWithBackend -> (Stale -> Refreshing -> RegisteredWithBackend)
//  -> Revoked -> Unregistered
//
// The locally cached token is only ever written after the backend has
// acknowledged it.

use std::sync::Arc;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use log::{debug, info, warn};

use crate::error::ClientError;
use crate::session::Session;
use crate::types::DeviceType;
use crate::util::get_short_token;

/// Uncompressed P-256 public key: 0x04 || X || Y.
const VAPID_KEY_LEN: usize = 65;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// Not decided yet; asking will show the platform prompt.
    Prompt,
}

/// Messaging platform SDK (web push or native shell).
#[async_trait]
pub trait MessagingPlatform: Send + Sync {
    /// Notification and service worker support.
    fn is_supported(&self) -> bool;
    async fn permission_status(&self) -> PermissionStatus;
    async fn request_permission(&self) -> PermissionStatus;
    /// `Ok(None)` when the platform hands out no token.
    async fn get_token(&self, vapid_key: Option<&str>) -> Result<Option<String>, ClientError>;
    async fn delete_token(&self) -> Result<(), ClientError>;
}

/// Backend side of push token registration.
#[async_trait]
pub trait TokenRegistry: Send + Sync {
    async fn register_token(&self, token: &str, device_type: DeviceType) -> Result<(), ClientError>;
    async fn remove_token(&self, token: &str) -> Result<(), ClientError>;
    async fn send_test_notification(&self, token: &str) -> Result<(), ClientError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenState {
    Unregistered,
    PermissionRequested,
    PermissionGranted,
    PermissionDenied,
    TokenObtained(String),
    RegisteredWithBackend(String),
    Stale(String),
    Refreshing,
    Revoked,
}

impl TokenState {
    pub fn name(&self) -> &'static str {
        match self {
            TokenState::Unregistered => "unregistered",
            TokenState::PermissionRequested => "permission_requested",
            TokenState::PermissionGranted => "permission_granted",
            TokenState::PermissionDenied => "permission_denied",
            TokenState::TokenObtained(_) => "token_obtained",
            TokenState::RegisteredWithBackend(_) => "registered",
            TokenState::Stale(_) => "stale",
            TokenState::Refreshing => "refreshing",
            TokenState::Revoked => "revoked",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Nothing cached, nothing to check.
    NotRegistered,
    /// Permission was revoked while in the background; cache purged.
    Disabled,
    Unchanged,
    Refreshed(String),
}

/// A failed send may trigger one refresh; after that failures surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RetryBudget {
    Available,
    Spent,
}

pub struct PushTokenManager {
    platform: Arc<dyn MessagingPlatform>,
    registry: Arc<dyn TokenRegistry>,
    session: Session,
    vapid_key: Option<String>,
    device_type: DeviceType,
    state: TokenState,
}

impl PushTokenManager {
    pub fn new(
        platform: Arc<dyn MessagingPlatform>,
        registry: Arc<dyn TokenRegistry>,
        session: Session,
        vapid_key: Option<String>,
        device_type: DeviceType,
    ) -> PushTokenManager {
        PushTokenManager {
            platform,
            registry,
            session,
            vapid_key,
            device_type,
            state: TokenState::Unregistered,
        }
    }

    pub fn state(&self) -> &TokenState {
        &self.state
    }

    fn transition(&mut self, next: TokenState) {
        debug!("push:: {} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    /// Explicit user action: ask for permission, obtain a token and register it.
    pub async fn enable(&mut self) -> Result<String, ClientError> {
        if !self.platform.is_supported() {
            self.transition(TokenState::Unregistered);
            return Err(ClientError::UnsupportedPlatform(
                "notifications or service workers are not available".to_string(),
            ));
        }

        self.transition(TokenState::PermissionRequested);
        let permission = match self.platform.permission_status().await {
            PermissionStatus::Denied => PermissionStatus::Denied,
            _ => self.platform.request_permission().await,
        };
        if permission != PermissionStatus::Granted {
            self.transition(TokenState::PermissionDenied);
            return Err(ClientError::PermissionDenied);
        }
        self.transition(TokenState::PermissionGranted);

        let token = match self.acquire_token().await {
            Ok(token) => token,
            Err(e) => {
                self.transition(TokenState::Unregistered);
                return Err(e);
            }
        };
        self.transition(TokenState::TokenObtained(token.clone()));

        if let Err(e) = self.registry.register_token(&token, self.device_type).await {
            warn!("push:: backend rejected token ...{}: {}", get_short_token(&token), e);
            if let Err(purge) = self.session.clear_push_token().await {
                warn!("push:: failed to purge cached token: {purge}");
            }
            self.transition(TokenState::Unregistered);
            return Err(e);
        }

        if let Err(e) = self.session.set_push_token(&token, self.device_type).await {
            warn!("push:: could not cache token ...{}, unregistering: {}", get_short_token(&token), e);
            if let Err(remove) = self.registry.remove_token(&token).await {
                warn!("push:: backend token removal failed: {remove}");
            }
            if let Err(purge) = self.session.clear_push_token().await {
                warn!("push:: failed to purge cached token: {purge}");
            }
            self.transition(TokenState::Unregistered);
            return Err(e);
        }
        info!("push:: notifications enabled with token ...{}", get_short_token(&token));
        self.transition(TokenState::RegisteredWithBackend(token.clone()));
        Ok(token)
    }

    /// Notifications count as enabled only with both a cached token and a
    /// granted permission. A half-enabled setup is cleaned up here.
    pub async fn check_status(&mut self) -> Result<bool, ClientError> {
        let cached = self.session.push_token().await;
        let granted = self.platform.permission_status().await == PermissionStatus::Granted;

        match cached {
            Some(token) if granted => {
                if !matches!(&self.state, TokenState::RegisteredWithBackend(t) if *t == token) {
                    self.transition(TokenState::RegisteredWithBackend(token));
                }
                Ok(true)
            }
            Some(token) => {
                info!("push:: permission revoked, purging cached token ...{}", get_short_token(&token));
                self.session.clear_push_token().await?;
                self.transition(TokenState::Unregistered);
                Ok(false)
            }
            None => {
                if matches!(self.state, TokenState::RegisteredWithBackend(_)) {
                    self.transition(TokenState::Unregistered);
                }
                Ok(false)
            }
        }
    }

    /// Called when the app comes back to the foreground.
    pub async fn on_foreground_resume(&mut self) -> Result<ResumeOutcome, ClientError> {
        let cached = match self.session.push_token().await {
            Some(token) => token,
            None => return Ok(ResumeOutcome::NotRegistered),
        };
        if !self.check_status().await? {
            return Ok(ResumeOutcome::Disabled);
        }

        let current = match self.platform.get_token(self.vapid_key.as_deref()).await {
            Ok(token) => token,
            Err(e) => {
                warn!("push:: token check failed, treating as stale: {e}");
                None
            }
        };
        if current.as_deref() == Some(cached.as_str()) {
            debug!("push:: token ...{} still valid", get_short_token(&cached));
            return Ok(ResumeOutcome::Unchanged);
        }

        let fresh = self.refresh(&cached).await?;
        Ok(ResumeOutcome::Refreshed(fresh))
    }

    /// Sends a test notification, refreshing the token at most once if the
    /// backend says it does not know it.
    pub async fn send_test_notification(&mut self) -> Result<(), ClientError> {
        let mut token = self
            .session
            .push_token()
            .await
            .ok_or_else(|| ClientError::TokenAcquisition("notifications are not enabled".to_string()))?;
        let mut budget = RetryBudget::Available;

        loop {
            let err = match self.registry.send_test_notification(&token).await {
                Ok(()) => return Ok(()),
                Err(e) if e.indicates_stale_token() => e,
                Err(e) => return Err(e),
            };

            match budget {
                RetryBudget::Available => {
                    info!("push:: send failed with stale token ...{}, refreshing once", get_short_token(&token));
                    budget = RetryBudget::Spent;
                    token = self.refresh(&token).await?;
                }
                RetryBudget::Spent => {
                    warn!("push:: send failed again after refresh: {err}");
                    return Err(ClientError::TokenStale(err.to_string()));
                }
            }
        }
    }

    /// Explicit user action. Always ends `Unregistered` locally, even when
    /// the backend or the platform calls fail.
    pub async fn disable(&mut self) -> Result<(), ClientError> {
        if let Some(token) = self.session.push_token().await {
            if let Err(e) = self.registry.remove_token(&token).await {
                warn!("push:: backend token removal failed, clearing locally anyway: {e}");
            }
        }
        if let Err(e) = self.platform.delete_token().await {
            warn!("push:: platform token deletion failed: {e}");
        }
        self.transition(TokenState::Revoked);
        let cleared = self.session.clear_push_token().await;
        self.transition(TokenState::Unregistered);
        info!("push:: notifications disabled");
        cleared
    }

    async fn acquire_token(&self) -> Result<String, ClientError> {
        if self.device_type == DeviceType::Web {
            let key = self
                .vapid_key
                .as_deref()
                .ok_or_else(|| ClientError::TokenAcquisition("no VAPID key configured".to_string()))?;
            validate_vapid_key(key)?;
        }
        match self.platform.get_token(self.vapid_key.as_deref()).await? {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(ClientError::TokenAcquisition("platform returned no token".to_string())),
        }
    }

    /// Stale -> Refreshing -> RegisteredWithBackend. The cache keeps the old
    /// value until the backend acknowledges the new one.
    async fn refresh(&mut self, stale: &str) -> Result<String, ClientError> {
        self.transition(TokenState::Stale(stale.to_string()));
        self.transition(TokenState::Refreshing);

        if let Err(e) = self.platform.delete_token().await {
            warn!("push:: failed to invalidate stale token ...{}: {}", get_short_token(stale), e);
        }

        let fresh = match self.acquire_token().await {
            Ok(token) => token,
            Err(e) => {
                self.transition(TokenState::Stale(stale.to_string()));
                return Err(e);
            }
        };

        if let Err(e) = self.registry.register_token(&fresh, self.device_type).await {
            self.transition(TokenState::Stale(stale.to_string()));
            return Err(e);
        }

        self.session.set_push_token(&fresh, self.device_type).await?;
        info!("push:: token refreshed ...{} -> ...{}", get_short_token(stale), get_short_token(&fresh));
        self.transition(TokenState::RegisteredWithBackend(fresh.clone()));
        Ok(fresh)
    }
}

/// Platform for a host without a messaging SDK, such as the command line.
/// The device token is handed in from outside and permission is implied by
/// the explicit user action.
pub struct ProvidedTokenPlatform {
    token: Option<String>,
}

impl ProvidedTokenPlatform {
    pub fn new(token: Option<String>) -> ProvidedTokenPlatform {
        ProvidedTokenPlatform {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

#[async_trait]
impl MessagingPlatform for ProvidedTokenPlatform {
    fn is_supported(&self) -> bool {
        true
    }

    async fn permission_status(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn request_permission(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn get_token(&self, _vapid_key: Option<&str>) -> Result<Option<String>, ClientError> {
        Ok(self.token.clone())
    }

    async fn delete_token(&self) -> Result<(), ClientError> {
        debug!("push:: provided token is owned by the host, nothing to delete");
        Ok(())
    }
}

/// Web push application server key: base64url of an uncompressed P-256 point.
pub fn validate_vapid_key(key: &str) -> Result<(), ClientError> {
    let trimmed = key.trim().trim_end_matches('=');
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(trimmed))
        .map_err(|e| ClientError::TokenAcquisition(format!("VAPID key is not valid base64: {e}")))?;
    if bytes.len() != VAPID_KEY_LEN || bytes[0] != 0x04 {
        return Err(ClientError::TokenAcquisition(format!(
            "VAPID key must be a {VAPID_KEY_LEN}-byte uncompressed P-256 point, got {} bytes",
            bytes.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FileStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn vapid() -> String {
        let mut key = [7u8; VAPID_KEY_LEN];
        key[0] = 0x04;
        general_purpose::URL_SAFE_NO_PAD.encode(key)
    }

    struct FakePlatform {
        supported: bool,
        permission: Mutex<PermissionStatus>,
        grant_on_request: bool,
        tokens: Mutex<VecDeque<Option<String>>>,
        deletes: Mutex<u32>,
    }

    impl FakePlatform {
        fn new(permission: PermissionStatus, tokens: &[Option<&str>]) -> Arc<FakePlatform> {
            Arc::new(FakePlatform {
                supported: true,
                permission: Mutex::new(permission),
                grant_on_request: true,
                tokens: Mutex::new(tokens.iter().map(|t| t.map(str::to_string)).collect()),
                deletes: Mutex::new(0),
            })
        }

        fn deletes(&self) -> u32 {
            *self.deletes.lock().unwrap()
        }
    }

    #[async_trait]
    impl MessagingPlatform for FakePlatform {
        fn is_supported(&self) -> bool {
            self.supported
        }

        async fn permission_status(&self) -> PermissionStatus {
            *self.permission.lock().unwrap()
        }

        async fn request_permission(&self) -> PermissionStatus {
            let mut permission = self.permission.lock().unwrap();
            if *permission == PermissionStatus::Prompt {
                *permission = if self.grant_on_request { PermissionStatus::Granted } else { PermissionStatus::Denied };
            }
            *permission
        }

        async fn get_token(&self, _vapid_key: Option<&str>) -> Result<Option<String>, ClientError> {
            Ok(self.tokens.lock().unwrap().pop_front().flatten())
        }

        async fn delete_token(&self) -> Result<(), ClientError> {
            *self.deletes.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeRegistry {
        registered: Mutex<Vec<String>>,
        removed: Mutex<Vec<String>>,
        reject_register: bool,
        fail_remove: bool,
        send_results: Mutex<VecDeque<Result<(), String>>>,
        sends: Mutex<Vec<String>>,
    }

    impl FakeRegistry {
        fn with_sends(results: Vec<Result<(), &str>>) -> Arc<FakeRegistry> {
            Arc::new(FakeRegistry {
                send_results: Mutex::new(results.into_iter().map(|r| r.map_err(str::to_string)).collect()),
                ..FakeRegistry::default()
            })
        }
    }

    #[async_trait]
    impl TokenRegistry for FakeRegistry {
        async fn register_token(&self, token: &str, _device_type: DeviceType) -> Result<(), ClientError> {
            if self.reject_register {
                return Err(ClientError::BackendRejection { status: 400, message: Some("rejected".to_string()) });
            }
            self.registered.lock().unwrap().push(token.to_string());
            Ok(())
        }

        async fn remove_token(&self, token: &str) -> Result<(), ClientError> {
            self.removed.lock().unwrap().push(token.to_string());
            if self.fail_remove {
                return Err(ClientError::BackendRejection { status: 500, message: None });
            }
            Ok(())
        }

        async fn send_test_notification(&self, token: &str) -> Result<(), ClientError> {
            self.sends.lock().unwrap().push(token.to_string());
            match self.send_results.lock().unwrap().pop_front() {
                Some(Err(message)) => Err(ClientError::BackendRejection { status: 400, message: Some(message) }),
                _ => Ok(()),
            }
        }
    }

    fn manager(platform: Arc<FakePlatform>, registry: Arc<FakeRegistry>, session: Session) -> PushTokenManager {
        PushTokenManager::new(platform, registry, session, Some(vapid()), DeviceType::Web)
    }

    #[tokio::test]
    async fn enable_registers_and_caches_token() {
        let platform = FakePlatform::new(PermissionStatus::Prompt, &[Some("tok-1")]);
        let registry = Arc::new(FakeRegistry::default());
        let session = Session::in_memory();
        let mut push = manager(platform, registry.clone(), session.clone());

        assert_eq!(push.enable().await.unwrap(), "tok-1");
        assert_eq!(push.state(), &TokenState::RegisteredWithBackend("tok-1".to_string()));
        assert_eq!(session.push_token().await.as_deref(), Some("tok-1"));
        assert_eq!(session.device_type().await, Some(DeviceType::Web));
        assert_eq!(*registry.registered.lock().unwrap(), vec!["tok-1".to_string()]);
        assert!(push.check_status().await.unwrap());
    }

    #[tokio::test]
    async fn enable_fails_when_permission_denied() {
        let platform = FakePlatform::new(PermissionStatus::Denied, &[Some("tok-1")]);
        let mut push = manager(platform, Arc::new(FakeRegistry::default()), Session::in_memory());
        assert!(matches!(push.enable().await, Err(ClientError::PermissionDenied)));
        assert_eq!(push.state(), &TokenState::PermissionDenied);
    }

    #[tokio::test]
    async fn enable_fails_when_prompt_is_refused() {
        let platform = Arc::new(FakePlatform {
            supported: true,
            permission: Mutex::new(PermissionStatus::Prompt),
            grant_on_request: false,
            tokens: Mutex::new(VecDeque::from([Some("tok-1".to_string())])),
            deletes: Mutex::new(0),
        });
        let registry = Arc::new(FakeRegistry::default());
        let session = Session::in_memory();
        let mut push = manager(platform, registry.clone(), session.clone());

        assert!(matches!(push.enable().await, Err(ClientError::PermissionDenied)));
        assert_eq!(push.state(), &TokenState::PermissionDenied);
        assert!(registry.registered.lock().unwrap().is_empty());
        assert_eq!(session.push_token().await, None);
    }

    #[tokio::test]
    async fn enable_fails_on_unsupported_platform() {
        let platform = Arc::new(FakePlatform {
            supported: false,
            permission: Mutex::new(PermissionStatus::Prompt),
            grant_on_request: true,
            tokens: Mutex::new(VecDeque::new()),
            deletes: Mutex::new(0),
        });
        let mut push = manager(platform, Arc::new(FakeRegistry::default()), Session::in_memory());
        assert!(matches!(push.enable().await, Err(ClientError::UnsupportedPlatform(_))));
    }

    #[tokio::test]
    async fn enable_fails_without_token() {
        let platform = FakePlatform::new(PermissionStatus::Granted, &[None]);
        let mut push = manager(platform, Arc::new(FakeRegistry::default()), Session::in_memory());
        assert!(matches!(push.enable().await, Err(ClientError::TokenAcquisition(_))));
        assert_eq!(push.state(), &TokenState::Unregistered);
    }

    #[tokio::test]
    async fn enable_rejects_malformed_vapid_key() {
        let platform = FakePlatform::new(PermissionStatus::Granted, &[Some("tok-1")]);
        let mut push = PushTokenManager::new(
            platform,
            Arc::new(FakeRegistry::default()),
            Session::in_memory(),
            Some("not-a-key".to_string()),
            DeviceType::Web,
        );
        assert!(matches!(push.enable().await, Err(ClientError::TokenAcquisition(_))));
    }

    #[tokio::test]
    async fn backend_rejection_leaves_no_cached_token() {
        let platform = FakePlatform::new(PermissionStatus::Granted, &[Some("tok-1")]);
        let registry = Arc::new(FakeRegistry { reject_register: true, ..FakeRegistry::default() });
        let session = Session::in_memory();
        session.set_push_token("old", DeviceType::Web).await.unwrap();
        let mut push = manager(platform, registry, session.clone());

        assert!(matches!(push.enable().await, Err(ClientError::BackendRejection { .. })));
        assert_eq!(push.state(), &TokenState::Unregistered);
        assert_eq!(session.push_token().await, None);
    }

    #[tokio::test]
    async fn cache_write_failure_unregisters_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("session.json");
        let session = Session::new(Arc::new(FileStore::open(&path).await.unwrap()));
        let platform = FakePlatform::new(PermissionStatus::Granted, &[Some("tok-1")]);
        let registry = Arc::new(FakeRegistry::default());
        let mut push = manager(platform, registry.clone(), session.clone());

        assert!(matches!(push.enable().await, Err(ClientError::Storage(_))));
        assert_eq!(push.state(), &TokenState::Unregistered);
        assert_eq!(*registry.removed.lock().unwrap(), vec!["tok-1".to_string()]);
        assert_eq!(session.push_token().await, None);
        assert!(!push.check_status().await.unwrap());
    }

    #[tokio::test]
    async fn cached_token_without_permission_is_purged() {
        let platform = FakePlatform::new(PermissionStatus::Denied, &[]);
        let session = Session::in_memory();
        session.set_push_token("tok-1", DeviceType::Web).await.unwrap();
        let mut push = manager(platform, Arc::new(FakeRegistry::default()), session.clone());

        assert!(!push.check_status().await.unwrap());
        assert_eq!(session.push_token().await, None);
        assert_eq!(push.state(), &TokenState::Unregistered);
    }

    #[tokio::test]
    async fn resume_with_same_token_does_nothing() {
        let platform = FakePlatform::new(PermissionStatus::Granted, &[Some("tok-1")]);
        let registry = Arc::new(FakeRegistry::default());
        let session = Session::in_memory();
        session.set_push_token("tok-1", DeviceType::Web).await.unwrap();
        let mut push = manager(platform.clone(), registry.clone(), session);

        assert_eq!(push.on_foreground_resume().await.unwrap(), ResumeOutcome::Unchanged);
        assert_eq!(platform.deletes(), 0);
        assert!(registry.registered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resume_after_permission_revoked_disables() {
        let platform = FakePlatform::new(PermissionStatus::Denied, &[Some("tok-1")]);
        let registry = Arc::new(FakeRegistry::default());
        let session = Session::in_memory();
        session.set_push_token("tok-1", DeviceType::Web).await.unwrap();
        let mut push = manager(platform.clone(), registry.clone(), session.clone());

        assert_eq!(push.on_foreground_resume().await.unwrap(), ResumeOutcome::Disabled);
        assert_eq!(session.push_token().await, None);
        assert_eq!(session.device_type().await, None);
        assert_eq!(push.state(), &TokenState::Unregistered);
        assert_eq!(platform.deletes(), 0);
        assert!(registry.registered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resume_with_changed_token_refreshes() {
        let platform = FakePlatform::new(PermissionStatus::Granted, &[Some("tok-2"), Some("tok-3")]);
        let registry = Arc::new(FakeRegistry::default());
        let session = Session::in_memory();
        session.set_push_token("tok-1", DeviceType::Web).await.unwrap();
        let mut push = manager(platform.clone(), registry.clone(), session.clone());

        assert_eq!(
            push.on_foreground_resume().await.unwrap(),
            ResumeOutcome::Refreshed("tok-3".to_string())
        );
        assert_eq!(platform.deletes(), 1);
        assert_eq!(*registry.registered.lock().unwrap(), vec!["tok-3".to_string()]);
        assert_eq!(session.push_token().await.as_deref(), Some("tok-3"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_old_cache() {
        let platform = FakePlatform::new(PermissionStatus::Granted, &[None, Some("tok-2")]);
        let registry = Arc::new(FakeRegistry { reject_register: true, ..FakeRegistry::default() });
        let session = Session::in_memory();
        session.set_push_token("tok-1", DeviceType::Web).await.unwrap();
        let mut push = manager(platform, registry, session.clone());

        assert!(push.on_foreground_resume().await.is_err());
        assert_eq!(session.push_token().await.as_deref(), Some("tok-1"));
        assert_eq!(push.state(), &TokenState::Stale("tok-1".to_string()));
    }

    #[tokio::test]
    async fn stale_send_is_retried_once() {
        let platform = FakePlatform::new(PermissionStatus::Granted, &[Some("tok-2")]);
        let registry = FakeRegistry::with_sends(vec![Err("Invalid registration token"), Ok(())]);
        let session = Session::in_memory();
        session.set_push_token("tok-1", DeviceType::Web).await.unwrap();
        let mut push = manager(platform, registry.clone(), session.clone());

        push.send_test_notification().await.unwrap();
        assert_eq!(*registry.sends.lock().unwrap(), vec!["tok-1".to_string(), "tok-2".to_string()]);
        assert_eq!(*registry.registered.lock().unwrap(), vec!["tok-2".to_string()]);
        assert_eq!(session.push_token().await.as_deref(), Some("tok-2"));
    }

    #[tokio::test]
    async fn second_stale_failure_surfaces_without_another_retry() {
        let platform = FakePlatform::new(PermissionStatus::Granted, &[Some("tok-2"), Some("tok-3")]);
        let registry = FakeRegistry::with_sends(vec![Err("invalid token"), Err("invalid token"), Ok(())]);
        let session = Session::in_memory();
        session.set_push_token("tok-1", DeviceType::Web).await.unwrap();
        let mut push = manager(platform.clone(), registry.clone(), session);

        let err = push.send_test_notification().await.unwrap_err();
        assert!(matches!(err, ClientError::TokenStale(_)));
        assert_eq!(registry.sends.lock().unwrap().len(), 2);
        assert_eq!(registry.registered.lock().unwrap().len(), 1);
        assert_eq!(platform.deletes(), 1);
    }

    #[tokio::test]
    async fn other_send_failures_are_not_retried() {
        let platform = FakePlatform::new(PermissionStatus::Granted, &[Some("tok-2")]);
        let registry = FakeRegistry::with_sends(vec![Err("quota exhausted")]);
        let session = Session::in_memory();
        session.set_push_token("tok-1", DeviceType::Web).await.unwrap();
        let mut push = manager(platform, registry.clone(), session);

        assert!(matches!(push.send_test_notification().await, Err(ClientError::BackendRejection { .. })));
        assert_eq!(registry.sends.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn disable_clears_locally_even_if_backend_fails() {
        let platform = FakePlatform::new(PermissionStatus::Granted, &[]);
        let registry = Arc::new(FakeRegistry { fail_remove: true, ..FakeRegistry::default() });
        let session = Session::in_memory();
        session.set_push_token("tok-1", DeviceType::Web).await.unwrap();
        let mut push = manager(platform.clone(), registry.clone(), session.clone());

        push.disable().await.unwrap();
        assert_eq!(*registry.removed.lock().unwrap(), vec!["tok-1".to_string()]);
        assert_eq!(session.push_token().await, None);
        assert_eq!(platform.deletes(), 1);
        assert_eq!(push.state(), &TokenState::Unregistered);
        assert!(!push.check_status().await.unwrap());
    }

    #[tokio::test]
    async fn provided_token_platform_enables_native_device() {
        let registry = Arc::new(FakeRegistry::default());
        let session = Session::in_memory();
        let mut push = PushTokenManager::new(
            Arc::new(ProvidedTokenPlatform::new(Some("device-tok".to_string()))),
            registry.clone(),
            session.clone(),
            None,
            DeviceType::Android,
        );

        assert_eq!(push.enable().await.unwrap(), "device-tok");
        assert_eq!(session.device_type().await, Some(DeviceType::Android));
        assert!(push.check_status().await.unwrap());

        let mut empty = PushTokenManager::new(
            Arc::new(ProvidedTokenPlatform::new(Some(" ".to_string()))),
            registry,
            Session::in_memory(),
            None,
            DeviceType::Android,
        );
        assert!(matches!(empty.enable().await, Err(ClientError::TokenAcquisition(_))));
    }

    #[test]
    fn vapid_key_validation() {
        assert!(validate_vapid_key(&vapid()).is_ok());
        assert!(validate_vapid_key(&general_purpose::URL_SAFE_NO_PAD.encode([4u8; 32])).is_err());
        let mut wrong_prefix = [7u8; VAPID_KEY_LEN];
        wrong_prefix[0] = 0x02;
        assert!(validate_vapid_key(&general_purpose::URL_SAFE_NO_PAD.encode(wrong_prefix)).is_err());
        assert!(validate_vapid_key("***").is_err());
    }
}
