//! Event classification scenarios: speculative parsers, their second-pass
//! side effects and the always-emitted generic message event.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wechat_bridge::gateway::{GatewayEvent, api};
use wechat_bridge::test_utils::{MockGateway, connect_and_login, create_test_client};
use wechat_bridge::types::FriendshipKind;

async fn wait_until<F: Fn() -> bool>(check: F, what: &str) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

fn text_message(msgid: u64, from: &str, content: &str) -> String {
    json!({
        "msgid": msgid,
        "content_type": 1,
        "content": content,
        "from_account": from,
        "to_account": "wx-self",
        "send_time": 1_700_000_000,
    })
    .to_string()
}

fn system_message(msgid: u64, room_id: &str, content: &str) -> String {
    json!({
        "msgid": msgid,
        "content_type": 13,
        "content": content,
        "from_account": room_id,
        "to_account": "wx-self",
        "g_number": room_id,
        "send_time": 1_700_000_000,
    })
    .to_string()
}

fn member_push(room_id: &str, members: &[(&str, &str)]) -> String {
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

/// Seeds a complete room record (detail + members) through push events and
/// waits until it has been stored.
async fn seed_room(
    client: &Arc<wechat_bridge::Client>,
    gateway: &Arc<MockGateway>,
    room_id: &str,
    name: &str,
    members: &[(&str, &str)],
) {
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
        .push(GatewayEvent::RoomMember(member_push(room_id, members)))
        .await;

    let mut stored = false;
    for _ in 0..500 {
        if client
            .room_list()
            .await
            .unwrap_or_default()
            .contains(&room_id.to_string())
        {
            stored = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(stored, "seeded room was never stored");
}

#[tokio::test(start_paused = true)]
async fn plain_text_emits_exactly_one_message_and_no_friendship() {
    let (client, factory) = create_test_client();
    let gateway = connect_and_login(&client, &factory).await;

    let mut messages = client.event_bus.message.subscribe();
    let mut friendships = client.event_bus.friendship.subscribe();

    gateway
        .push(GatewayEvent::Message(text_message(100, "wx-peer", "lunch?")))
        .await;

    let event = messages.recv().await.unwrap();
    assert_eq!(event.message_id, "100");

    // Give any stray second emission a chance to land, then check nothing
    // else arrived on either channel.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(messages.try_recv().is_err());
    assert!(friendships.try_recv().is_err());

    // The payload is dereferenceable from the ephemeral store.
    let payload = client.message_payload("100").await.unwrap();
    assert_eq!(payload.content, "lunch?");
}

#[tokio::test(start_paused = true)]
async fn friendship_confirm_text_emits_friendship_and_message() {
    let (client, factory) = create_test_client();
    let gateway = connect_and_login(&client, &factory).await;

    let mut messages = client.event_bus.message.subscribe();
    let mut friendships = client.event_bus.friendship.subscribe();

    gateway
        .push(GatewayEvent::Message(text_message(
            101,
            "wx-peer",
            "I've accepted your friend request. Now let's chat!",
        )))
        .await;

    let friendship = friendships.recv().await.unwrap();
    assert_eq!(friendship.friendship_id, "101");
    let record = client.friendship_payload("101").await.unwrap();
    assert_eq!(record.contact_id, "wx-peer");
    assert_eq!(record.kind, FriendshipKind::Confirm);

    // The generic message event still fires.
    assert_eq!(messages.recv().await.unwrap().message_id, "101");
}

#[tokio::test(start_paused = true)]
async fn room_topic_change_renames_marks_dirty_and_emits_both_events() {
    let (client, factory) = create_test_client();
    let gateway = connect_and_login(&client, &factory).await;

    seed_room(
        &client,
        &gateway,
        "R1@chatroom",
        "T1",
        &[("wx-alice", "Alice"), ("wx-bob", "Bob")],
    )
    .await;

    let mut topics = client.event_bus.room_topic.subscribe();
    let mut messages = client.event_bus.message.subscribe();

    gateway
        .push(GatewayEvent::Message(system_message(
            200,
            "R1@chatroom",
            r#""Alice"修改群名为“T2”"#,
        )))
        .await;

    let topic = topics.recv().await.unwrap();
    assert_eq!(topic.room_id, "R1@chatroom");
    assert_eq!(topic.old_topic, "T1");
    assert_eq!(topic.new_topic, "T2");
    assert_eq!(topic.changer_id, "wx-alice");

    // A generic message event is emitted regardless of the specific match.
    assert_eq!(messages.recv().await.unwrap().message_id, "200");

    // The room is dirty now: the next read re-syncs instead of trusting
    // the cache, and the renamed record survives the merge.
    let before = gateway.requests_for(api::ROOM_DETAIL).len();
    let read = {
        let client = client.clone();
        tokio::spawn(async move { client.room_payload("R1@chatroom").await })
    };
    {
        let gateway = gateway.clone();
        wait_until(
            move || gateway.requests_for(api::ROOM_DETAIL).len() > before,
            "re-sync after dirty mark",
        )
        .await;
    }
    // Detail push without a name: the cached rename must persist.
    let members_before = gateway.requests_for(api::ROOM_MEMBER).len();
    gateway
        .push(GatewayEvent::RoomInfo(
            json!({
                "number": "R1@chatroom",
                "name": "",
                "thumb": "",
                "author": "wx-owner",
                "disturb": 0,
            })
            .to_string(),
        ))
        .await;
    {
        let gateway = gateway.clone();
        wait_until(
            move || gateway.requests_for(api::ROOM_MEMBER).len() > members_before,
            "member pull of the re-sync",
        )
        .await;
    }
    gateway
        .push(GatewayEvent::RoomMember(member_push(
            "R1@chatroom",
            &[("wx-alice", "Alice"), ("wx-bob", "Bob")],
        )))
        .await;
    let room = read.await.unwrap().unwrap();
    assert_eq!(room.name, "T2");
}

#[tokio::test(start_paused = true)]
async fn room_join_system_message_resolves_names_against_membership() {
    let (client, factory) = create_test_client();
    let gateway = connect_and_login(&client, &factory).await;

    seed_room(
        &client,
        &gateway,
        "R2@chatroom",
        "dev",
        &[("wx-alice", "Alice"), ("wx-bob", "Bob")],
    )
    .await;

    let mut joins = client.event_bus.room_join.subscribe();
    gateway
        .push(GatewayEvent::Message(system_message(
            300,
            "R2@chatroom",
            r#""Alice"邀请"Bob"加入了群聊"#,
        )))
        .await;

    let join = joins.recv().await.unwrap();
    assert_eq!(join.room_id, "R2@chatroom");
    assert_eq!(join.inviter_id, "wx-alice");
    assert_eq!(join.invitee_ids, vec!["wx-bob"]);
}

#[tokio::test(start_paused = true)]
async fn url_invitation_emits_room_invite_instead_of_message() {
    let (client, factory) = create_test_client();
    let gateway = connect_and_login(&client, &factory).await;

    let mut invites = client.event_bus.room_invite.subscribe();
    let mut messages = client.event_bus.message.subscribe();

    let content = json!({
        "url": "https://support.weixin.qq.com/invite/xyz",
        "title": "邀请你加入群聊",
        "des": "\"Alice\"邀请你加入群聊“dev team”，进入可查看详情。",
    })
    .to_string();
    gateway
        .push(GatewayEvent::Message(
            json!({
                "msgid": 400,
                "content_type": 5,
                "content": content,
                "from_account": "wx-alice",
                "to_account": "wx-self",
                "send_time": 1_700_000_000,
            })
            .to_string(),
        ))
        .await;

    let invite = invites.recv().await.unwrap();
    assert_eq!(invite.room_invitation_id, "400");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(messages.try_recv().is_err());

    let record = client.room_invitation_payload("400").await.unwrap();
    assert_eq!(record.room_name, "dev team");

    // Accepting dereferences the stored token URL.
    client.room_invitation_accept("400").await.unwrap();
    let detail = gateway.requests_for(api::ROOM_INVITATION_DETAIL);
    assert_eq!(detail.len(), 1);
    assert_eq!(detail[0]["url"], "https://support.weixin.qq.com/invite/xyz");
}

#[tokio::test(start_paused = true)]
async fn plain_url_message_falls_back_to_message_event() {
    let (client, factory) = create_test_client();
    let gateway = connect_and_login(&client, &factory).await;

    let mut invites = client.event_bus.room_invite.subscribe();
    let mut messages = client.event_bus.message.subscribe();

    gateway
        .push(GatewayEvent::Message(
            json!({
                "msgid": 401,
                "content_type": 5,
                "content": json!({
                    "url": "https://example.com/article",
                    "title": "Weekly digest",
                }).to_string(),
                "from_account": "wx-alice",
                "to_account": "wx-self",
                "send_time": 1_700_000_000,
            })
            .to_string(),
        ))
        .await;

    assert_eq!(messages.recv().await.unwrap().message_id, "401");
    assert!(invites.try_recv().is_err());

    // The link payload is recoverable from the cached message.
    let link = client.message_url("401").await.unwrap();
    assert_eq!(link.title, "Weekly digest");
}
