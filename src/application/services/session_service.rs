use crate::application::ports::KeyValueStore;
use crate::domain::value_objects::{Identity, UserId};
use crate::shared::error::AppError;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub type SharedIdentity = Arc<RwLock<Identity>>;

pub const AUTH_USER_KEY: &str = "auth-user-id";
pub const PRIVACY_KEY: &str = "privacy-mode";
pub const VISIT_USER_ID_KEY: &str = "visit-user-id";
pub const VISIT_NAME_KEY: &str = "visit-name";
pub const VISIT_EMAIL_KEY: &str = "visit-email";
pub const VISITOR_KEYS: [&str; 3] = [VISIT_USER_ID_KEY, VISIT_NAME_KEY, VISIT_EMAIL_KEY];
const MIGRATION_MARKER_PREFIX: &str = "responses-migrated:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorProfile {
    pub user_id: UserId,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// 現在の識別子と、その永続化（durable / session ストア）を管理する
pub struct SessionService {
    durable: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
    identity: SharedIdentity,
}

impl SessionService {
    pub fn new(durable: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
        Self {
            durable,
            session,
            identity: Arc::new(RwLock::new(Identity::Anonymous(UserId::generate_visitor()))),
        }
    }

    /// 以降のミューテーションが参照する共有ハンドル
    pub fn identity_handle(&self) -> SharedIdentity {
        Arc::clone(&self.identity)
    }

    pub async fn current(&self) -> Identity {
        self.identity.read().await.clone()
    }

    /// 起動時に保存済みの識別子を復元する
    pub async fn restore(&self) -> Result<Identity, AppError> {
        let identity = if let Some(user_id) = self.read_id(&*self.durable, AUTH_USER_KEY).await? {
            Identity::Authenticated(user_id)
        } else if let Some(user_id) = self.read_id(&*self.session, VISIT_USER_ID_KEY).await? {
            Identity::Anonymous(user_id)
        } else {
            let user_id = UserId::generate_visitor();
            self.session
                .set(VISIT_USER_ID_KEY, user_id.as_str())
                .await?;
            Identity::Anonymous(user_id)
        };

        debug!("restored identity {identity}");
        *self.identity.write().await = identity.clone();
        Ok(identity)
    }

    pub async fn begin_visit(
        &self,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<VisitorProfile, AppError> {
        let user_id = match self.current().await {
            Identity::Anonymous(user_id) => user_id,
            Identity::Authenticated(user_id) => {
                return Err(AppError::InvalidInput(format!(
                    "{user_id} is already authenticated"
                )));
            }
        };

        self.session.set(VISIT_USER_ID_KEY, user_id.as_str()).await?;
        if let Some(name) = name {
            self.session.set(VISIT_NAME_KEY, name).await?;
        }
        if let Some(email) = email {
            self.session.set(VISIT_EMAIL_KEY, email).await?;
        }

        Ok(VisitorProfile {
            user_id,
            name: name.map(str::to_string),
            email: email.map(str::to_string),
        })
    }

    pub async fn visitor_profile(&self) -> Result<Option<VisitorProfile>, AppError> {
        let Some(user_id) = self.read_id(&*self.session, VISIT_USER_ID_KEY).await? else {
            return Ok(None);
        };
        Ok(Some(VisitorProfile {
            user_id,
            name: self.session.get(VISIT_NAME_KEY).await?,
            email: self.session.get(VISIT_EMAIL_KEY).await?,
        }))
    }

    /// 匿名訪問者のセッションキーをまとめて削除
    pub async fn clear_visitor(&self) -> Result<(), AppError> {
        for key in VISITOR_KEYS {
            self.session.remove(key).await?;
        }
        Ok(())
    }

    pub async fn authenticate(&self, user_id: UserId) -> Result<(), AppError> {
        self.durable.set(AUTH_USER_KEY, user_id.as_str()).await?;
        info!("authenticated as {user_id}");
        *self.identity.write().await = Identity::Authenticated(user_id);
        Ok(())
    }

    pub async fn logout(&self) -> Result<Identity, AppError> {
        self.durable.remove(AUTH_USER_KEY).await?;
        self.clear_visitor().await?;
        let user_id = UserId::generate_visitor();
        self.session.set(VISIT_USER_ID_KEY, user_id.as_str()).await?;

        let identity = Identity::Anonymous(user_id);
        *self.identity.write().await = identity.clone();
        Ok(identity)
    }

    pub async fn set_privacy(&self, enabled: bool) -> Result<(), AppError> {
        self.durable
            .set(PRIVACY_KEY, if enabled { "true" } else { "false" })
            .await
    }

    pub async fn privacy(&self) -> Result<bool, AppError> {
        Ok(self
            .durable
            .get(PRIVACY_KEY)
            .await?
            .is_some_and(|value| value == "true"))
    }

    /// 移行済みなら移行先のユーザー ID
    pub async fn migration_target(&self, source: &UserId) -> Result<Option<UserId>, AppError> {
        self.read_id(&*self.durable, &migration_marker(source)).await
    }

    pub async fn mark_migrated(&self, source: &UserId, target: &UserId) -> Result<(), AppError> {
        self.durable
            .set(&migration_marker(source), target.as_str())
            .await
    }

    async fn read_id(
        &self,
        store: &dyn KeyValueStore,
        key: &str,
    ) -> Result<Option<UserId>, AppError> {
        match store.get(key).await? {
            Some(value) => UserId::new(value)
                .map(Some)
                .map_err(AppError::ValidationError),
            None => Ok(None),
        }
    }
}

fn migration_marker(source: &UserId) -> String {
    format!("{MIGRATION_MARKER_PREFIX}{source}")
}
