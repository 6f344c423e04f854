//! Shared application state for the HTTP layer.
//!
//! `CoreState` is built once at startup and shared behind an `Arc`. It holds
//! no connection: every request opens its own via `open_db`, so handlers
//! never contend on a lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::crypto::{Claims, CryptoError, PasswordHasher, TokenKind, TokenSigner};
use crate::db::{self, repository};
use crate::mailer::{LogMailer, MailError, Mailer, SmtpMailer};
use crate::models::User;

/// Password reset links live for one hour.
pub const PASSWORD_RESET_TOKEN_MINUTES: i64 = 60;
/// Email verification links live for a day.
pub const EMAIL_VERIFICATION_TOKEN_HOURS: i64 = 24;
/// Video room join tokens.
pub const VIDEO_ROOM_TOKEN_HOURS: i64 = 2;

pub struct CoreState {
    pub config: AppConfig,
    tokens: TokenSigner,
    passwords: PasswordHasher,
    mailer: Arc<dyn Mailer>,
}

impl std::fmt::Debug for CoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreState")
            .field("db_path", &self.config.db_path)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl CoreState {
    /// Prepare the database (directories, migrations, seed data) and build
    /// state that relays mail over SMTP, or logs it when no relay is set.
    pub fn open(config: AppConfig) -> Result<Self, CoreError> {
        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => {
                tracing::info!(server = %smtp.server, port = smtp.port, "Relaying mail over SMTP");
                Arc::new(SmtpMailer::new(smtp, &config.mail_from)?)
            }
            None => {
                tracing::warn!("KIANGOMBE_MAIL_SERVER not set; outgoing mail is only logged");
                Arc::new(LogMailer::new(config.mail_from.clone()))
            }
        };
        Self::open_with_mailer(config, mailer)
    }

    pub fn open_with_mailer(config: AppConfig, mailer: Arc<dyn Mailer>) -> Result<Self, CoreError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CoreError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let conn = db::open_database(&config.db_path)?;
        let seeded = repository::seed_default_staff_roles(&conn)?;
        if seeded > 0 {
            tracing::info!(count = seeded, "Seeded default staff roles");
        }

        let tokens = TokenSigner::new(config.jwt_secret.as_bytes())?;
        let passwords = PasswordHasher::new(config.password_iterations);
        Ok(Self {
            config,
            tokens,
            passwords,
            mailer,
        })
    }

    /// Open a database connection for one request.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::connect(&self.config.db_path).map_err(CoreError::Database)
    }

    pub fn db_path(&self) -> &Path {
        &self.config.db_path
    }

    pub fn tokens(&self) -> &TokenSigner {
        &self.tokens
    }

    pub fn passwords(&self) -> &PasswordHasher {
        &self.passwords
    }

    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }

    pub fn frontend_url(&self) -> &str {
        &self.config.frontend_url
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => Duration::minutes(self.config.access_token_minutes),
            TokenKind::Refresh => Duration::days(self.config.refresh_token_days),
            TokenKind::PasswordReset => Duration::minutes(PASSWORD_RESET_TOKEN_MINUTES),
            TokenKind::EmailVerification => Duration::hours(EMAIL_VERIFICATION_TOKEN_HOURS),
            TokenKind::VideoRoom => Duration::hours(VIDEO_ROOM_TOKEN_HOURS),
        }
    }

    /// Claims for `user` with the configured lifetime for `kind`.
    pub fn claims_for(&self, user: &User, kind: TokenKind) -> Claims {
        Claims::new(user.id, &user.email, user.role, kind, self.ttl(kind))
    }

    pub fn issue_token(&self, user: &User, kind: TokenKind) -> Result<String, CoreError> {
        Ok(self.tokens.sign(&self.claims_for(user, kind))?)
    }

    pub fn access_token_seconds(&self) -> i64 {
        self.ttl(TokenKind::Access).num_seconds()
    }

    /// Load a user, `NotFound` when absent.
    pub fn require_user(
        conn: &rusqlite::Connection,
        id: &Uuid,
    ) -> Result<User, CoreError> {
        repository::get_user(conn, id)?
            .ok_or_else(|| CoreError::Database(db::DatabaseError::not_found("user", id)))
    }
}

/// Errors from CoreState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("Mail setup error: {0}")]
    Mail(#[from] MailError),
    #[error("Cannot create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::OutboxMailer;
    use crate::models::Role;

    fn state(dir: &tempfile::TempDir) -> CoreState {
        let config = AppConfig::for_tests(dir.path().join("nested").join("clinic.db"));
        CoreState::open_with_mailer(config, Arc::new(OutboxMailer::new())).unwrap()
    }

    #[test]
    fn open_creates_directories_and_seeds_roles() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        assert!(state.db_path().exists());
        let conn = state.open_db().unwrap();
        assert_eq!(repository::list_staff_roles(&conn, false).unwrap().len(), 5);
    }

    #[test]
    fn open_builds_smtp_mailer_when_relay_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::for_tests(dir.path().join("clinic.db"));
        config.smtp = Some(crate::config::SmtpConfig {
            server: "127.0.0.1".into(),
            port: 2525,
            username: None,
            password: None,
            starttls: false,
        });
        assert!(CoreState::open(config.clone()).is_ok());

        config.mail_from = "not an address".into();
        let err = CoreState::open(config).unwrap_err();
        assert!(matches!(err, CoreError::Mail(_)));
    }

    #[test]
    fn reopening_does_not_reseed() {
        let dir = tempfile::tempdir().unwrap();
        drop(state(&dir));
        let state = state(&dir);
        let conn = state.open_db().unwrap();
        assert_eq!(repository::list_staff_roles(&conn, false).unwrap().len(), 5);
    }

    #[test]
    fn issued_tokens_verify_with_configured_lifetime() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        let conn = state.open_db().unwrap();
        let user = repository::fixtures::make_user(&conn, "nurse@kiangombe.test", Role::Nurse);

        let token = state.issue_token(&user, TokenKind::Access).unwrap();
        let claims = state.tokens().verify(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, Role::Nurse);
        assert_eq!(claims.expires_in(), state.access_token_seconds());

        let room_claims = state.claims_for(&user, TokenKind::VideoRoom).with_room("room-1");
        let room = state.tokens().sign(&room_claims).unwrap();
        let claims = state.tokens().verify(&room, TokenKind::VideoRoom).unwrap();
        assert_eq!(claims.room.as_deref(), Some("room-1"));
    }

    #[test]
    fn require_user_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        let conn = state.open_db().unwrap();
        let err = CoreState::require_user(&conn, &Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, CoreError::Database(db::DatabaseError::NotFound { .. })));
    }
}
