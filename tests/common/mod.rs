//! Programmable in-memory collaborator for flow tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use secrecy::SecretString;

use moyo_auth::api::{
    AuthApi, BackupCodes, OAuthConnection, OtpSetup, PassVerification, Provider, RawLoginOutcome,
    TokenPair, UserProfile,
};
use moyo_auth::error::{AuthError, Result};
use moyo_auth::{Role, SessionStore};

pub const ACCESS_TOKEN: &str = "access-token-1";

/// What `backup_issue` should do on the next call.
pub enum IssueBehavior {
    Codes(Vec<String>),
    Empty,
    AlreadyIssued,
    Reject(String),
}

pub struct MockApi {
    pub profile: Mutex<UserProfile>,
    pub login_reject: Mutex<Option<String>>,
    pub me_unauthorized: Mutex<bool>,
    pub me_reject: Mutex<Option<String>>,
    pub transfer_reject: Mutex<Option<String>>,
    pub connect_reject: Mutex<Option<String>>,
    pub otp_reject: Mutex<Option<String>>,
    pub issue_behavior: Mutex<IssueBehavior>,
    pub backup_list_value: Mutex<BackupCodes>,

    pub login_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
    pub transfer_calls: AtomicUsize,
    pub connect_calls: AtomicUsize,
    pub release_calls: AtomicUsize,
    pub otp_setup_calls: AtomicUsize,
    pub otp_verify_calls: AtomicUsize,
    pub otp_disable_calls: AtomicUsize,
    pub issue_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub pass_verify_calls: AtomicUsize,

    pub last_transfer: Mutex<Option<(Provider, String, String)>>,
    pub last_connect: Mutex<Option<(Provider, String)>>,
}

/// Installs a test subscriber once so `RUST_LOG` works for flow tests.
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

impl Default for MockApi {
    fn default() -> Self {
        init_tracing();
        Self {
            profile: Mutex::new(profile()),
            login_reject: Mutex::new(None),
            me_unauthorized: Mutex::new(false),
            me_reject: Mutex::new(None),
            transfer_reject: Mutex::new(None),
            connect_reject: Mutex::new(None),
            otp_reject: Mutex::new(None),
            issue_behavior: Mutex::new(IssueBehavior::Codes(codes())),
            backup_list_value: Mutex::new(BackupCodes {
                issued: true,
                codes: codes(),
            }),
            login_calls: AtomicUsize::new(0),
            me_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
            connect_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
            otp_setup_calls: AtomicUsize::new(0),
            otp_verify_calls: AtomicUsize::new(0),
            otp_disable_calls: AtomicUsize::new(0),
            issue_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            pass_verify_calls: AtomicUsize::new(0),
            last_transfer: Mutex::new(None),
            last_connect: Mutex::new(None),
        }
    }
}

pub fn tokens() -> TokenPair {
    TokenPair {
        access_token: ACCESS_TOKEN.to_string(),
        refresh_token: "refresh-token-1".to_string(),
        access_token_expires_in: 1800,
    }
}

pub fn profile() -> UserProfile {
    UserProfile {
        id: 42,
        email: "jiwoo@moyo.app".to_string(),
        nickname: "지우".to_string(),
        role: Role::User,
        otp_enabled: false,
        oauth_connections: vec![],
    }
}

pub fn connection(provider: Provider, oauth_id: i64, released: bool) -> OAuthConnection {
    OAuthConnection {
        provider,
        oauth_id,
        provider_user_id: format!("{}-{oauth_id}", provider.as_str()),
        release_date: released.then(|| "2026-01-01T00:00:00Z".to_string()),
    }
}

pub fn codes() -> Vec<String> {
    vec![
        "AAAA-1111".to_string(),
        "BBBB-2222".to_string(),
        "CCCC-3333".to_string(),
    ]
}

/// A logged-in store backed by `MockApi` tokens.
pub fn authenticated_store(api: &MockApi) -> SessionStore {
    let store = SessionStore::new();
    store.set_tokens(&tokens());
    store.set_user(api.profile.lock().unwrap().clone());
    store
}

#[async_trait]
impl AuthApi for MockApi {
    async fn login(&self, _: &str, _: &SecretString, _: bool) -> Result<TokenPair> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.login_reject.lock().unwrap().clone() {
            return Err(AuthError::Rejected(message));
        }
        Ok(tokens())
    }

    async fn exchange_oauth_code(&self, _: Provider, _: &str) -> Result<RawLoginOutcome> {
        Ok(RawLoginOutcome::default())
    }

    async fn transfer_oauth(
        &self,
        _: &str,
        provider: Provider,
        provider_user_id: &str,
        from_user_id: &str,
    ) -> Result<()> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_transfer.lock().unwrap() = Some((
            provider,
            provider_user_id.to_string(),
            from_user_id.to_string(),
        ));
        if let Some(message) = self.transfer_reject.lock().unwrap().clone() {
            return Err(AuthError::Rejected(message));
        }
        Ok(())
    }

    async fn connect_oauth(
        &self,
        _: &str,
        provider: Provider,
        provider_user_id: &str,
    ) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_connect.lock().unwrap() = Some((provider, provider_user_id.to_string()));
        if let Some(message) = self.connect_reject.lock().unwrap().clone() {
            return Err(AuthError::Rejected(message));
        }
        Ok(())
    }

    async fn release_oauth(&self, _: &str, _: i64) -> Result<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn me(&self, _: &str) -> Result<UserProfile> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        if *self.me_unauthorized.lock().unwrap() {
            return Err(AuthError::SessionInvalid);
        }
        if let Some(message) = self.me_reject.lock().unwrap().clone() {
            return Err(AuthError::Rejected(message));
        }
        Ok(self.profile.lock().unwrap().clone())
    }

    async fn otp_setup(&self, _: &str) -> Result<OtpSetup> {
        self.otp_setup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(OtpSetup {
            otp_auth_url: "otpauth://totp/Moyo:jiwoo?secret=JBSWY3DP".to_string(),
            secret: "JBSWY3DP".to_string(),
            enabled: false,
        })
    }

    async fn otp_verify(&self, _: &str, _: &str) -> Result<()> {
        self.otp_verify_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.otp_reject.lock().unwrap().clone() {
            return Err(AuthError::Rejected(message));
        }
        self.profile.lock().unwrap().otp_enabled = true;
        Ok(())
    }

    async fn otp_disable_verify(&self, _: &str, _: &str) -> Result<()> {
        self.otp_disable_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.otp_reject.lock().unwrap().clone() {
            return Err(AuthError::Rejected(message));
        }
        self.profile.lock().unwrap().otp_enabled = false;
        Ok(())
    }

    async fn backup_list(&self, _: &str) -> Result<BackupCodes> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.backup_list_value.lock().unwrap().clone())
    }

    async fn backup_issue(&self, _: &str) -> Result<Vec<String>> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.issue_behavior.lock().unwrap() {
            IssueBehavior::Codes(codes) => Ok(codes.clone()),
            IssueBehavior::Empty => Ok(vec![]),
            IssueBehavior::AlreadyIssued => Err(AuthError::AlreadyIssued),
            IssueBehavior::Reject(message) => Err(AuthError::Rejected(message.clone())),
        }
    }

    async fn pass_verify(&self, imp_uid: &str) -> Result<PassVerification> {
        self.pass_verify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PassVerification {
            phone: "01012345678".to_string(),
            ci: format!("ci-{imp_uid}"),
            di: format!("di-{imp_uid}"),
        })
    }
}
