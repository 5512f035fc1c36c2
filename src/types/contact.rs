use serde::{Deserialize, Serialize};

/// Gender flag as carried by the gateway. The wire value is a bare number
/// (sometimes a numeric string); anything unrecognized maps to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gender {
    #[default]
    Unknown,
    Male,
    Female,
}

impl Gender {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Gender::Male,
            2 => Gender::Female,
            _ => Gender::Unknown,
        }
    }
}

/// A contact record as the bridge stores it.
///
/// Keyed by `account_alias` (the stable alias id); `account` is the primary
/// account id and may coincide with the alias. Upserts for the same alias
/// overwrite, never duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPayload {
    pub account: String,
    pub account_alias: String,
    pub name: String,
    /// Remark/alias name the logged-in user assigned to this contact.
    pub remark: String,
    pub avatar: String,
    pub gender: Gender,
    pub province: String,
    pub city: String,
    /// Free-text self description ("signature").
    pub signature: String,
    /// Friendship-verification token, empty for strangers.
    pub verify_token: String,
}

impl ContactPayload {
    /// Minimal record for an account we only know by id and display name,
    /// e.g. a room member seen before any contact sync.
    pub fn stub(account: impl Into<String>, name: impl Into<String>) -> Self {
        let account = account.into();
        Self {
            account_alias: account.clone(),
            account,
            name: name.into(),
            remark: String::new(),
            avatar: String::new(),
            gender: Gender::Unknown,
            province: String::new(),
            city: String::new(),
            signature: String::new(),
            verify_token: String::new(),
        }
    }
}

/// Room ids carry a `@chatroom` suffix on this protocol; everything else is
/// a contact id.
pub fn is_contact_id(id: &str) -> bool {
    !id.ends_with("@chatroom")
}

pub fn is_room_id(id: &str) -> bool {
    id.ends_with("@chatroom")
}

/// One entry of a paged contact-list push.
#[derive(Debug, Clone, Deserialize)]
pub struct WireContact {
    pub account: String,
    #[serde(default)]
    pub account_alias: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub form_name: String,
    #[serde(default)]
    pub thumb: String,
    #[serde(default)]
    pub sex: String,
    /// `province_city` in one field.
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub v1: String,
}

impl WireContact {
    pub fn into_payload(self) -> ContactPayload {
        let (province, city) = split_area(&self.area);
        let account_alias = if self.account_alias.is_empty() {
            self.account.clone()
        } else {
            self.account_alias.clone()
        };
        ContactPayload {
            account: self.account,
            account_alias,
            name: self.name,
            remark: self.form_name,
            avatar: self.thumb,
            gender: Gender::from_code(self.sex.parse().unwrap_or(0)),
            province,
            city,
            signature: self.description,
            verify_token: self.v1,
        }
    }
}

fn split_area(area: &str) -> (String, String) {
    match area.split_once('_') {
        Some((province, city)) => (province.to_string(), city.to_string()),
        None => (area.to_string(), String::new()),
    }
}

/// Paged `contact-list` push payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WireContactList {
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub total: u32,
    pub info: Vec<WireContact>,
}

/// `contact-info` push payload: the answer to a single-contact sync request.
#[derive(Debug, Clone, Deserialize)]
pub struct WireContactInfo {
    pub username: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub headurl: String,
}

impl WireContactInfo {
    pub fn into_payload(self) -> ContactPayload {
        let account_alias = if self.username.is_empty() {
            self.alias.clone()
        } else {
            self.username.clone()
        };
        ContactPayload {
            account: self.alias,
            account_alias,
            name: self.nickname,
            remark: String::new(),
            avatar: self.headurl,
            gender: Gender::Unknown,
            province: String::new(),
            city: String::new(),
            signature: self.signature,
            verify_token: String::new(),
        }
    }
}

/// `contact-remark` push payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WireContactRemark {
    pub to_account_alias: String,
    #[serde(default)]
    pub remark: String,
}

/// `login` push payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WireLoginInfo {
    pub account: String,
    #[serde(default)]
    pub account_alias: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub thumb: String,
    #[serde(default)]
    pub task_id: String,
}
