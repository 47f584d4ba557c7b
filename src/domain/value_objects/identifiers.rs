use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// 空文字を許さない文字列 ID を定義する
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: String) -> Result<Self, String> {
                Self::validate(&value)?;
                Ok(Self(value))
            }

            pub fn parse(value: &str) -> Result<Self, String> {
                Self::validate(value)?;
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            fn validate(value: &str) -> Result<(), String> {
                if value.trim().is_empty() {
                    return Err(concat!($label, " cannot be empty").to_string());
                }
                Ok(())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

string_id!(UserId, "User ID");
string_id!(EventId, "Event ID");
string_id!(RelationId, "Relation ID");
string_id!(
    /// 応答履歴レコードの ID。楽観的レコードは `local-` で始まる。
    RecordId,
    "Record ID"
);
string_id!(
    /// キュー投入ごとに一意なアクション ID
    ActionId,
    "Action ID"
);

const LOCAL_RECORD_PREFIX: &str = "local-";

impl RecordId {
    /// クライアント側で採番する楽観的レコード ID
    pub fn local() -> Self {
        Self(format!("{LOCAL_RECORD_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_RECORD_PREFIX)
    }
}

impl ActionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl UserId {
    /// 匿名訪問者向けの新しい ID
    pub fn generate_visitor() -> Self {
        Self(format!("visit-{}", Uuid::new_v4()))
    }
}
