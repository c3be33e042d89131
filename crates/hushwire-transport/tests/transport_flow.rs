//! End-to-end transport flows over the in-process relay network

use std::sync::Arc;
use std::time::Duration;

use hushwire_core::memory::{MailServerReply, MemoryFilterRegistry, MemoryRelay};
use hushwire_core::{
    BloomFilter, Cursor, EnvelopeEvent, EnvelopeEventKind, FilterSelector, Hash, IdentityKey,
    KeyHandle, MemoryProcessedCache, OutboundMessage, PeerId, Recipient,
};
use hushwire_transport::prelude::*;

struct Node {
    identity: IdentityKey,
    cache: Arc<MemoryProcessedCache>,
    transport: Arc<Transport>,
}

fn node(relay: &Arc<MemoryRelay>, config: TransportConfig) -> Node {
    let identity = IdentityKey::generate();
    let registry = Arc::new(MemoryFilterRegistry::new(relay.clone(), identity.clone()));
    let cache = Arc::new(MemoryProcessedCache::new());
    let transport = TransportBuilder::new(relay.clone(), registry, cache.clone(), identity.clone())
        .config(config)
        .build()
        .unwrap();
    Node {
        identity,
        cache,
        transport: Arc::new(transport),
    }
}

fn mailserver() -> PeerId {
    PeerId::new(vec![0x01, 0x02, 0x03, 0x04])
}

fn with_mailserver() -> TransportConfig {
    TransportConfig::with_mailservers(vec![mailserver()])
}

#[tokio::test]
async fn test_public_chat_roundtrip_and_dedup() {
    let relay = Arc::new(MemoryRelay::new());
    let alice = node(&relay, TransportConfig::default());
    let bob = node(&relay, TransportConfig::default());

    bob.transport.join_public("status").await.unwrap();

    let first = alice
        .transport
        .send_public(OutboundMessage::new(b"one".to_vec()), "status")
        .await
        .unwrap();
    alice
        .transport
        .send_public(OutboundMessage::new(b"two".to_vec()), "status")
        .await
        .unwrap();

    let unseen = bob.transport.collect_unseen().await.unwrap();
    assert_eq!(unseen.len(), 1);
    let (filter, messages) = unseen.into_iter().next().unwrap();
    assert_eq!(filter.chat_id, "status");
    let payloads: Vec<&[u8]> = messages.iter().map(|m| m.payload.as_slice()).collect();
    assert_eq!(payloads, vec![&b"one"[..], &b"two"[..]]);

    let ids: Vec<String> = messages.iter().map(|m| m.id()).collect();
    bob.transport
        .confirm_messages_processed(&ids, 1_000)
        .await
        .unwrap();
    assert_eq!(bob.cache.len(), 2);

    // The relay hands the envelope over again
    relay.redeliver(&first).unwrap();
    assert!(bob.transport.collect_unseen().await.unwrap().is_empty());

    // Evicting older records makes redelivered envelopes visible again
    bob.transport.clean_messages_processed(1_001).await.unwrap();
    relay.redeliver(&first).unwrap();
    let unseen = bob.transport.collect_unseen().await.unwrap();
    assert_eq!(unseen.values().map(Vec::len).sum::<usize>(), 1);
}

#[tokio::test]
async fn test_clean_keeps_newer_records() {
    let relay = Arc::new(MemoryRelay::new());
    let bob = node(&relay, TransportConfig::default());
    let filter = bob.transport.join_public("status").await.unwrap();

    let alice = node(&relay, TransportConfig::default());
    let old = alice
        .transport
        .send_public(OutboundMessage::new(b"old".to_vec()), "status")
        .await
        .unwrap();
    let new = alice
        .transport
        .send_public(OutboundMessage::new(b"new".to_vec()), "status")
        .await
        .unwrap();
    bob.transport.collect_unseen().await.unwrap();

    bob.transport
        .confirm_messages_processed(&[old.to_hex()], 10)
        .await
        .unwrap();
    bob.transport
        .confirm_messages_processed(&[new.to_hex()], 20)
        .await
        .unwrap();
    bob.transport.clean_messages_processed(20).await.unwrap();

    relay.redeliver(&old).unwrap();
    relay.redeliver(&new).unwrap();
    let unseen = bob.transport.collect_unseen().await.unwrap();
    let hashes: Vec<Hash> = unseen[&filter].iter().map(|m| m.hash).collect();
    assert_eq!(hashes, vec![old]);
}

#[tokio::test]
async fn test_failed_filter_does_not_abort_collection() {
    let relay = Arc::new(MemoryRelay::new());
    let alice = node(&relay, TransportConfig::default());
    let bob = node(&relay, TransportConfig::default());

    let broken = bob.transport.join_public("broken").await.unwrap();
    let healthy = bob.transport.join_public("healthy").await.unwrap();

    for chat in ["broken", "healthy"] {
        alice
            .transport
            .send_public(OutboundMessage::new(chat.as_bytes().to_vec()), chat)
            .await
            .unwrap();
    }
    relay.fail_fetches(&broken.filter_id, true);

    let unseen = bob.transport.collect_unseen().await.unwrap();
    assert!(!unseen.contains_key(&broken));
    assert_eq!(unseen[&healthy][0].payload, b"healthy".to_vec());

    // Nothing was lost on the broken filter
    relay.fail_fetches(&broken.filter_id, false);
    let unseen = bob.transport.collect_unseen().await.unwrap();
    assert_eq!(unseen[&broken][0].payload, b"broken".to_vec());
}

#[tokio::test]
async fn test_public_topic_is_deterministic() {
    let relay = Arc::new(MemoryRelay::new());
    let alice = node(&relay, TransportConfig::default());

    alice
        .transport
        .send_public(OutboundMessage::new(b"a".to_vec()), "status")
        .await
        .unwrap();
    let filter = alice.transport.filter_by_chat_id("status").unwrap();
    alice
        .transport
        .send_public(OutboundMessage::new(b"b".to_vec()), "status")
        .await
        .unwrap();

    assert_eq!(alice.transport.filter_by_chat_id("status"), Some(filter));
    let published = relay.published();
    assert_eq!(published[0].topic, published[1].topic);
    assert_eq!(published[0].recipient, published[1].recipient);
    assert_eq!(published[0].sig_id, published[1].sig_id);
}

#[tokio::test]
async fn test_key_material_is_mutually_exclusive() {
    let relay = Arc::new(MemoryRelay::new());
    let alice = node(&relay, TransportConfig::default());
    let bob = IdentityKey::generate().public_key();

    alice
        .transport
        .send_private_with_shared_secret(OutboundMessage::new(b"secret".to_vec()), &bob, &[7; 32])
        .await
        .unwrap();
    alice
        .transport
        .send_private_with_partitioned(OutboundMessage::new(b"hello".to_vec()), &bob)
        .await
        .unwrap();
    alice
        .transport
        .send_private_on_personal_topic(OutboundMessage::new(b"hi".to_vec()), &bob)
        .await
        .unwrap();

    let published = relay.published();
    assert!(matches!(published[0].recipient, Some(Recipient::SymKey(_))));
    assert!(published[0].public_key().is_none());
    for message in &published[1..] {
        assert_eq!(message.recipient, Some(Recipient::PublicKey(bob)));
        assert!(message.sym_key_id().is_none());
    }
}

#[tokio::test]
async fn test_partitioned_message_reaches_peer() {
    let relay = Arc::new(MemoryRelay::new());
    let alice = node(&relay, TransportConfig::default());
    let bob = node(&relay, TransportConfig::default());

    bob.transport.init_filters(&[], &[]).await.unwrap();
    alice
        .transport
        .send_private_with_partitioned(
            OutboundMessage::new(b"hi bob".to_vec()),
            &bob.identity.public_key(),
        )
        .await
        .unwrap();

    let unseen = bob.transport.collect_unseen().await.unwrap();
    let (filter, messages) = unseen.into_iter().next().unwrap();
    assert!(filter.discovery);
    assert_eq!(messages[0].dst, Some(bob.identity.public_key()));

    // The sender keeps no listening filter for it
    assert!(alice.transport.collect_unseen().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_janitor_removes_publish_only_filters() {
    let relay = Arc::new(MemoryRelay::new());
    let alice = node(&relay, TransportConfig::default());
    let bob = IdentityKey::generate().public_key();

    alice.transport.start();
    tokio::task::yield_now().await;
    alice.transport.join_public("status").await.unwrap();

    for _ in 0..3 {
        alice
            .transport
            .send_private_on_personal_topic(OutboundMessage::new(b"hi".to_vec()), &bob)
            .await
            .unwrap();
    }
    let held: Vec<_> = alice
        .transport
        .filters()
        .into_iter()
        .filter(|f| !f.listen)
        .collect();
    assert_eq!(held.len(), 1);
    assert!(relay.is_installed(&held[0].filter_id));

    tokio::time::advance(Duration::from_secs(300)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    let remaining = alice.transport.filters();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].chat_id, "status");
    assert!(!relay.is_installed(&held[0].filter_id));

    // Listening filters outlive any number of sweeps
    tokio::time::advance(Duration::from_secs(900)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert!(alice.transport.filter_by_chat_id("status").is_some());

    alice.transport.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_dropped_transport_stops_sweeping() {
    let relay = Arc::new(MemoryRelay::new());
    let identity = IdentityKey::generate();
    let registry = Arc::new(MemoryFilterRegistry::new(relay.clone(), identity.clone()));
    let transport = TransportBuilder::new(
        relay.clone(),
        registry.clone(),
        Arc::new(MemoryProcessedCache::new()),
        identity.clone(),
    )
    .build()
    .unwrap();

    transport.start();
    tokio::task::yield_now().await;
    drop(transport);

    // The registry outlives the transport and is still shared
    let peer = IdentityKey::generate().public_key();
    let held = registry
        .resolve_personal(&peer, &identity, false)
        .await
        .unwrap();
    assert!(!held.listen);

    tokio::time::advance(Duration::from_secs(300)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    assert!(registry.filter_by_chat_id(&held.chat_id).is_some());
    assert!(relay.is_installed(&held.filter_id));
}

#[tokio::test]
async fn test_community_channel_roundtrip() {
    let relay = Arc::new(MemoryRelay::new());
    let alice = node(&relay, TransportConfig::default());
    let bob = node(&relay, TransportConfig::default());
    let community = IdentityKey::generate();

    let filters = bob
        .transport
        .init_community_filters(std::slice::from_ref(&community))
        .await
        .unwrap();
    assert!(matches!(filters[0].key, KeyHandle::Asymmetric(_)));

    alice
        .transport
        .send_community_message(
            OutboundMessage::new(b"welcome".to_vec()),
            &community.public_key(),
        )
        .await
        .unwrap();

    let unseen = bob.transport.collect_unseen().await.unwrap();
    let messages = unseen.get(&filters[0]).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].payload, b"welcome");
    assert_eq!(messages[0].dst, Some(community.public_key()));
}

#[tokio::test]
async fn test_load_filters_restores_listening() {
    let relay = Arc::new(MemoryRelay::new());
    let before = node(&relay, TransportConfig::default());
    before.transport.join_public("status").await.unwrap();
    let persisted = before.transport.filters();
    drop(before);

    let alice = node(&relay, TransportConfig::default());
    let after = node(&relay, TransportConfig::default());
    let restored = after.transport.load_filters(&persisted).await.unwrap();
    assert!(restored.iter().any(|f| f.chat_id == "status"));

    alice
        .transport
        .send_public(OutboundMessage::new(b"back".to_vec()), "status")
        .await
        .unwrap();

    let unseen = after.transport.collect_unseen().await.unwrap();
    let status = after.transport.filter_by_chat_id("status").unwrap();
    assert_eq!(unseen.get(&status).map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_history_without_waiting() {
    let relay = Arc::new(MemoryRelay::new());
    relay.set_mail_server_reply(MailServerReply::Silent);
    let bob = node(&relay, with_mailserver());

    let status = bob.transport.join_public("status").await.unwrap();
    let cursor = bob
        .transport
        .request_history_for_filter(
            HistoryQuery::new(mailserver()),
            &status,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(cursor.is_empty());
    assert_eq!(relay.subscriber_count(), 0);
    let (peer, request) = relay.requests().remove(0);
    assert_eq!(peer, mailserver());
    assert_eq!(request.bloom, BloomFilter::from_topics([&status.topic]));
    assert!(request.bloom.matches(&status.topic));
}

#[tokio::test]
async fn test_history_pages_with_cursor() {
    let relay = Arc::new(MemoryRelay::new());
    relay.set_mail_server_reply(MailServerReply::Complete(Cursor::new(vec![0xca, 0xfe])));
    let bob = node(&relay, with_mailserver());
    bob.transport.join_public("status").await.unwrap();

    let cancel = CancellationToken::new();
    let next = bob
        .transport
        .request_history_from_default(100, 200, Cursor::default(), true, &cancel)
        .await
        .unwrap();
    assert_eq!(next, Cursor::new(vec![0xca, 0xfe]));

    relay.set_mail_server_reply(MailServerReply::Complete(Cursor::default()));
    let last = bob
        .transport
        .request_history_from_default(100, 200, next.clone(), true, &cancel)
        .await
        .unwrap();
    assert!(last.is_empty());

    let requests = relay.requests();
    assert_eq!(requests[1].1.cursor, next);
    assert_ne!(requests[0].1.id, requests[1].1.id);
    assert_eq!(relay.subscriber_count(), 0);
}

#[tokio::test]
async fn test_history_error_from_mail_server() {
    let relay = Arc::new(MemoryRelay::new());
    relay.set_mail_server_reply(MailServerReply::Fail("rate limited".into()));
    let bob = node(&relay, with_mailserver());

    let err = bob
        .transport
        .request_history_for_all(
            HistoryQuery::new(mailserver()).wait_for_response(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::MailServer(_)));
    assert_eq!(relay.subscriber_count(), 0);
}

#[tokio::test]
async fn test_history_cancelled_while_waiting() {
    let relay = Arc::new(MemoryRelay::new());
    relay.set_mail_server_reply(MailServerReply::Silent);
    let bob = node(&relay, with_mailserver());
    let cancel = CancellationToken::new();

    let pending = {
        let transport = bob.transport.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            transport
                .request_history_for_all(HistoryQuery::new(mailserver()).wait_for_response(), &cancel)
                .await
        })
    };

    while relay.subscriber_count() == 0 {
        tokio::task::yield_now().await;
    }
    for seed in 0..5 {
        relay.emit(EnvelopeEvent {
            hash: Hash::new([seed; 32]),
            peer: Some(mailserver()),
            kind: EnvelopeEventKind::MailServerRequestExpired,
        });
    }
    cancel.cancel();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, TransportError::Cancelled));
    assert!(err.is_cancellation());
    assert_eq!(relay.subscriber_count(), 0);
}

#[tokio::test]
async fn test_concurrent_history_requests_do_not_interfere() {
    let relay = Arc::new(MemoryRelay::new());
    relay.set_mail_server_reply(MailServerReply::Silent);
    let bob = node(&relay, with_mailserver());
    let cancel = CancellationToken::new();

    let spawn = |transport: Arc<Transport>, cancel: CancellationToken| {
        tokio::spawn(async move {
            transport
                .request_history_for_all(HistoryQuery::new(mailserver()).wait_for_response(), &cancel)
                .await
        })
    };
    let first = spawn(bob.transport.clone(), cancel.clone());
    let second = spawn(bob.transport.clone(), cancel.clone());

    while relay.requests().len() < 2 {
        tokio::task::yield_now().await;
    }

    let requests = relay.requests();
    let cursors = [Cursor::new(vec![1]), Cursor::new(vec![2])];
    for ((_, request), cursor) in requests.iter().zip(&cursors).rev() {
        relay.emit(EnvelopeEvent::request_completed(
            request.id.to_hash(),
            hushwire_core::MailServerResponse {
                cursor: cursor.clone(),
                ..Default::default()
            },
        ));
    }

    let mut results = vec![
        first.await.unwrap().unwrap(),
        second.await.unwrap().unwrap(),
    ];
    results.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
    assert_eq!(results, cursors.to_vec());
    assert_eq!(relay.subscriber_count(), 0);
}

#[tokio::test]
async fn test_no_mailservers_configured() {
    let relay = Arc::new(MemoryRelay::new());
    let bob = node(&relay, TransportConfig::default());

    let err = bob
        .transport
        .request_history_from_default(0, 0, Cursor::default(), true, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::NoMailservers));
    assert!(relay.requests().is_empty());
    assert_eq!(relay.subscriber_count(), 0);
}

#[tokio::test]
async fn test_send_failure_is_surfaced() {
    let relay = Arc::new(MemoryRelay::new());
    let alice = node(&relay, TransportConfig::default());
    relay.fail_posts(true);

    let err = alice
        .transport
        .send_public(OutboundMessage::new(b"lost".to_vec()), "status")
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Relay(_)));

    let oversized = OutboundMessage::new(vec![0; alice.transport.max_message_size() as usize + 1]);
    relay.fail_posts(false);
    assert!(alice.transport.send_public(oversized, "status").await.is_err());
}
