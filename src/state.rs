use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::config::AppConfig;
use crate::mailer::{Mailer, SmtpMailer};
use crate::store::{PgUserStore, UserStore};

/// Shared application state: immutable config plus the two injected
/// collaborators, both behind trait objects so tests can swap them out.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            tracing::warn!(error = %e, "migration failed; continuing");
        }

        let store = Arc::new(PgUserStore::new(db)) as Arc<dyn UserStore>;
        let mailer = Arc::new(SmtpMailer::new(&config.mail)) as Arc<dyn Mailer>;

        Ok(Self {
            store,
            mailer,
            config,
        })
    }

    pub fn from_parts(
        store: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            mailer,
            config,
        }
    }

    /// State backed by the in-memory store and capture mailer; no database
    /// or SMTP server is contacted.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::with_config(AppConfig::for_tests())
    }

    #[cfg(test)]
    pub fn with_config(config: AppConfig) -> Self {
        use crate::mailer::CaptureMailer;
        use crate::store::InMemoryUserStore;

        Self::from_parts(
            Arc::new(InMemoryUserStore::new()),
            Arc::new(CaptureMailer::new()),
            Arc::new(config),
        )
    }
}
