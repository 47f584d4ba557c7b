use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// ユーザーがイベントに対して選んだ応答
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseValue {
    Going,
    Interested,
    NotInterested,
    Maybe,
    NotThere,
    Participating,
    Cleared,
    Seen,
}

impl ResponseValue {
    pub const ALL: [ResponseValue; 8] = [
        ResponseValue::Going,
        ResponseValue::Interested,
        ResponseValue::NotInterested,
        ResponseValue::Maybe,
        ResponseValue::NotThere,
        ResponseValue::Participating,
        ResponseValue::Cleared,
        ResponseValue::Seen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseValue::Going => "going",
            ResponseValue::Interested => "interested",
            ResponseValue::NotInterested => "not_interested",
            ResponseValue::Maybe => "maybe",
            ResponseValue::NotThere => "not_there",
            ResponseValue::Participating => "participating",
            ResponseValue::Cleared => "cleared",
            ResponseValue::Seen => "seen",
        }
    }
}

impl fmt::Display for ResponseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResponseValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|value| value.as_str() == normalized)
            .ok_or_else(|| format!("Unknown response value: {s}"))
    }
}

/// 初回応答がどこから来たか（共有リンク経由・招待経由）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Linked,
    Invited,
}

/// レコード作成時点で観測された値
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitialResponse {
    Provenance(Provenance),
    Prior(ResponseValue),
}

impl InitialResponse {
    /// サーバー表記から読む。"none" と未知の値は「観測なし」として扱う。
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "null" => None,
            "linked" => Some(InitialResponse::Provenance(Provenance::Linked)),
            "invited" => Some(InitialResponse::Provenance(Provenance::Invited)),
            other => other.parse::<ResponseValue>().ok().map(InitialResponse::Prior),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InitialResponse::Provenance(Provenance::Linked) => "linked",
            InitialResponse::Provenance(Provenance::Invited) => "invited",
            InitialResponse::Prior(value) => value.as_str(),
        }
    }
}

impl From<ResponseValue> for InitialResponse {
    fn from(value: ResponseValue) -> Self {
        InitialResponse::Prior(value)
    }
}

impl From<Provenance> for InitialResponse {
    fn from(value: Provenance) -> Self {
        InitialResponse::Provenance(value)
    }
}
