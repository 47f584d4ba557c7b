use super::identifiers::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 現在のユーザー識別。匿名訪問者か認証済みユーザーかを型で区別する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Identity {
    Anonymous(UserId),
    Authenticated(UserId),
}

impl Identity {
    pub fn user_id(&self) -> &UserId {
        match self {
            Identity::Anonymous(id) | Identity::Authenticated(id) => id,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Anonymous(id) => write!(f, "anonymous:{id}"),
            Identity::Authenticated(id) => write!(f, "authenticated:{id}"),
        }
    }
}
