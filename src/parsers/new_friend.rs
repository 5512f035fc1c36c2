use crate::types::{ContactPayload, Gender};
use serde::Deserialize;

/// A `message` push without a content type is not a message: it announces a
/// freshly established contact.
#[derive(Debug, Deserialize)]
struct WireNewFriend {
    #[serde(default)]
    account: String,
    #[serde(default)]
    account_alias: String,
    #[serde(default, alias = "nickname")]
    name: String,
    #[serde(default)]
    thumb: String,
}

/// Parses the new-contact notification into a contact upsert.
pub fn parse(raw: &str) -> Option<ContactPayload> {
    let wire: WireNewFriend = serde_json::from_str(raw).ok()?;
    if wire.account.is_empty() {
        return None;
    }
    let account_alias = if wire.account_alias.is_empty() {
        wire.account.clone()
    } else {
        wire.account_alias
    };
    Some(ContactPayload {
        account: wire.account,
        account_alias,
        name: wire.name,
        remark: String::new(),
        avatar: wire.thumb,
        gender: Gender::Unknown,
        province: String::new(),
        city: String::new(),
        signature: String::new(),
        verify_token: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_friend_notification_becomes_a_contact() {
        let contact = parse(r#"{"account":"wx-new","nickname":"Newcomer","thumb":"t.png"}"#).unwrap();
        assert_eq!(contact.account_alias, "wx-new");
        assert_eq!(contact.name, "Newcomer");
    }

    #[test]
    fn missing_account_is_rejected() {
        assert!(parse(r#"{"nickname":"ghost"}"#).is_none());
        assert!(parse("not json").is_none());
    }
}
