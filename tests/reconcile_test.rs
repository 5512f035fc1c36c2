//! Cache-miss reconciliation: lookups suspend, issue throttled syncs and
//! resolve when the matching push event arrives.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wechat_bridge::gateway::{GatewayEvent, api};
use wechat_bridge::test_utils::{MockGateway, connect_and_login, create_test_client};

/// Polls until `check` passes or the deadline expires.
async fn wait_until<F: Fn() -> bool>(check: F, what: &str) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

fn contact_info_payload(id: &str, name: &str) -> String {
    json!({
        "username": id,
        "alias": "",
        "nickname": name,
        "signature": "",
        "headurl": "https://example.com/a.png",
    })
    .to_string()
}

fn room_member_payload(room_id: &str, members: &[(&str, &str)]) -> String {
    let list: Vec<_> = members
        .iter()
        .map(|(account, name)| {
            json!({
                "userName": account,
                "nickName": name,
                "displayName": "",
                "bigHeadImgUrl": "",
                "number": room_id,
            })
        })
        .collect();
    json!({ "memberList": list }).to_string()
}

#[tokio::test(start_paused = true)]
async fn contact_lookup_miss_suspends_and_resolves_on_push() {
    let (client, factory) = create_test_client();
    let gateway = connect_and_login(&client, &factory).await;

    let lookup = {
        let client = client.clone();
        tokio::spawn(async move { client.contact_payload("U1").await })
    };

    // The miss must go through the throttled contact queue as a sync
    // request for exactly that id.
    {
        let gateway = gateway.clone();
        wait_until(
            || !gateway.requests_for(api::CONTACT_INFO).is_empty(),
            "contact sync request",
        )
        .await;
    }
    let request = &gateway.requests_for(api::CONTACT_INFO)[0];
    assert_eq!(request["account"], "U1");

    gateway
        .push(GatewayEvent::ContactInfo(contact_info_payload("U1", "Uno")))
        .await;

    let contact = lookup.await.unwrap().unwrap();
    assert_eq!(contact.account_alias, "U1");
    assert_eq!(contact.name, "Uno");

    // Second read is a pure cache hit: no further sync requests.
    let before = gateway.requests_for(api::CONTACT_INFO).len();
    let again = client.contact_payload("U1").await.unwrap();
    assert_eq!(again.name, "Uno");
    assert_eq!(gateway.requests_for(api::CONTACT_INFO).len(), before);
}

#[tokio::test(start_paused = true)]
async fn unanswered_lookup_reissues_the_sync_request() {
    let (client, factory) = create_test_client();
    let gateway = connect_and_login(&client, &factory).await;

    let lookup = {
        let client = client.clone();
        tokio::spawn(async move { client.contact_payload("U2").await })
    };

    // Let two reply timeouts elapse with no answer.
    {
        let gateway = gateway.clone();
        wait_until(
            || gateway.requests_for(api::CONTACT_INFO).len() >= 3,
            "re-issued contact sync requests",
        )
        .await;
    }

    gateway
        .push(GatewayEvent::ContactInfo(contact_info_payload("U2", "Dos")))
        .await;
    assert_eq!(lookup.await.unwrap().unwrap().name, "Dos");
}

async fn complete_room_sync(gateway: &Arc<MockGateway>, room_id: &str, name: &str) {
    // Answer the detail request, which in turn pulls the member list.
    gateway
        .push(GatewayEvent::RoomInfo(
            json!({
                "number": room_id,
                "name": name,
                "thumb": "",
                "author": "wx-owner",
                "disturb": 0,
            })
            .to_string(),
        ))
        .await;
    {
        let gateway = gateway.clone();
        let wanted = room_id.to_string();
        wait_until(
            move || {
                gateway
                    .requests_for(api::ROOM_MEMBER)
                    .iter()
                    .any(|req| req["account"] == wanted.as_str())
            },
            "member list request",
        )
        .await;
    }
    gateway
        .push(GatewayEvent::RoomMember(room_member_payload(
            room_id,
            &[("wx-owner", "Owner"), ("wx-bob", "Bob")],
        )))
        .await;
}

#[tokio::test(start_paused = true)]
async fn incomplete_room_always_resyncs_on_read() {
    let (client, factory) = create_test_client();
    let gateway = connect_and_login(&client, &factory).await;

    // A room-list push only yields a stub: no members, no owner.
    gateway
        .push(GatewayEvent::RoomList(
            json!({
                "info": json!([{ "number": "9@chatroom", "name": "dev", "thumb": "" }]).to_string(),
                "my_account": "user-self",
            })
            .to_string(),
        ))
        .await;
    let mut stored = false;
    for _ in 0..100 {
        if client
            .room_list()
            .await
            .unwrap_or_default()
            .contains(&"9@chatroom".to_string())
        {
            stored = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(stored, "room list push was not stored");

    // Reading the incomplete room must not return the stub as-is.
    let read = {
        let client = client.clone();
        tokio::spawn(async move { client.room_payload("9@chatroom").await })
    };
    {
        let gateway = gateway.clone();
        wait_until(
            || !gateway.requests_for(api::ROOM_DETAIL).is_empty(),
            "room detail request",
        )
        .await;
    }
    complete_room_sync(&gateway, "9@chatroom", "dev").await;

    let room = read.await.unwrap().unwrap();
    assert!(room.is_complete());
    assert_eq!(room.owner, "wx-owner");
    assert_eq!(room.members.len(), 2);

    // Complete and clean: the next read stays local.
    let before = gateway.requests_for(api::ROOM_DETAIL).len();
    let cached = client.room_payload("9@chatroom").await.unwrap();
    assert_eq!(cached.name, "dev");
    assert_eq!(gateway.requests_for(api::ROOM_DETAIL).len(), before);
}

#[tokio::test(start_paused = true)]
async fn member_list_fans_out_to_all_waiters() {
    let (client, factory) = create_test_client();
    let gateway = connect_and_login(&client, &factory).await;

    let reader1 = {
        let client = client.clone();
        tokio::spawn(async move { client.room_member_list("5@chatroom").await })
    };
    let reader2 = {
        let client = client.clone();
        tokio::spawn(async move { client.room_member_list("5@chatroom").await })
    };

    // Both readers register and submit before the single answer arrives.
    {
        let gateway = gateway.clone();
        wait_until(
            || gateway.requests_for(api::ROOM_MEMBER).len() >= 2,
            "member list requests from both readers",
        )
        .await;
    }
    gateway
        .push(GatewayEvent::RoomMember(room_member_payload(
            "5@chatroom",
            &[("wx-a", "Ada"), ("wx-b", "Bob")],
        )))
        .await;

    let mut ids1 = reader1.await.unwrap().unwrap();
    let mut ids2 = reader2.await.unwrap().unwrap();
    ids1.sort();
    ids2.sort();
    assert_eq!(ids1, vec!["wx-a", "wx-b"]);
    assert_eq!(ids2, vec!["wx-a", "wx-b"]);

    // Members observed through a sync become known contacts.
    let contact = client.contact_payload("wx-a").await.unwrap();
    assert_eq!(contact.name, "Ada");
}
