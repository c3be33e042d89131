//! Command implementations

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use console::{style, Emoji};
use hushwire_core::memory::{MemoryFilterRegistry, MemoryRelay};
use hushwire_core::{
    BloomFilter, Cursor, IdentityKey, MemoryProcessedCache, OutboundMessage, PeerId,
    ProcessedCache, SledProcessedCache, Topic,
};
use hushwire_transport::prelude::*;
use hushwire_transport::pubkey_to_hex;
use tracing::info;

use crate::config::CliConfig;

static SEND: Emoji<'_, '_> = Emoji("📤 ", "[SEND] ");
static RECV: Emoji<'_, '_> = Emoji("📥 ", "[RECV] ");
static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
static KEY: Emoji<'_, '_> = Emoji("🔑 ", "[KEY] ");

/// Mail server used when none is configured
const DEMO_MAILSERVER: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];

struct Peer {
    identity: IdentityKey,
    transport: Transport,
}

fn peer(
    relay: &Arc<MemoryRelay>,
    config: TransportConfig,
    cache: Arc<dyn ProcessedCache>,
) -> anyhow::Result<Peer> {
    let identity = IdentityKey::generate();
    let registry = Arc::new(MemoryFilterRegistry::new(relay.clone(), identity.clone()));
    let transport = TransportBuilder::new(relay.clone(), registry, cache, identity.clone())
        .config(config)
        .build()?;
    Ok(Peer {
        identity,
        transport,
    })
}

/// Two peers exchanging public and one-to-one messages over one relay
pub async fn demo(
    config: &CliConfig,
    chat: Option<String>,
    count: usize,
    persistent: bool,
) -> anyhow::Result<()> {
    let chat = chat
        .or_else(|| config.public_chats.first().cloned())
        .unwrap_or_else(|| "hushwire".to_string());

    let mut transport_config = config.transport.clone();
    if transport_config.mailservers.is_empty() {
        transport_config
            .mailservers
            .push(PeerId::new(DEMO_MAILSERVER.to_vec()));
    }

    let bob_cache: Arc<dyn ProcessedCache> = if persistent {
        let cache = SledProcessedCache::open(&config.storage_path).with_context(|| {
            format!("Failed to open cache at {}", config.storage_path.display())
        })?;
        Arc::new(cache)
    } else {
        Arc::new(MemoryProcessedCache::new())
    };

    let relay = Arc::new(MemoryRelay::with_capacity(config.envelope_event_buffer));
    let alice = peer(
        &relay,
        transport_config.clone(),
        Arc::new(MemoryProcessedCache::new()),
    )?;
    let bob = peer(&relay, transport_config, bob_cache)?;

    alice.transport.start();
    bob.transport.start();

    let filters = bob.transport.init_filters(&config.public_chats, &[]).await?;
    let joined = bob.transport.join_public(&chat).await?;
    info!("Bob listens on {} filters", filters.len() + 1);
    println!(
        "{} Bob is {}",
        KEY,
        style(pubkey_to_hex(&bob.identity.public_key())).cyan()
    );
    println!("  Chat {} on topic {}", style(&chat).green(), joined.topic);

    for i in 0..count {
        let message = OutboundMessage::new(format!("hello #{}", i + 1).into_bytes());
        let hash = alice.transport.send_public(message, &chat).await?;
        println!("{} Alice -> {}: {}", SEND, chat, style(hash).dim());
    }

    let direct = OutboundMessage::new(b"hi bob, it's alice".to_vec());
    let hash = alice
        .transport
        .send_private_with_partitioned(direct, &bob.identity.public_key())
        .await?;
    println!("{} Alice -> Bob (partitioned): {}", SEND, style(hash).dim());

    let unseen = bob.transport.collect_unseen().await?;
    let mut ids = Vec::new();
    for (filter, messages) in &unseen {
        for message in messages {
            println!(
                "{} {} <- {}",
                RECV,
                style(&filter.chat_id).green(),
                String::from_utf8_lossy(&message.payload)
            );
            ids.push(message.id());
        }
    }

    bob.transport
        .confirm_messages_processed(&ids, bob.transport.current_time_millis())
        .await?;
    let again = bob.transport.collect_unseen().await?;
    println!(
        "{} Confirmed {} messages, {} unseen after confirming",
        CHECK,
        ids.len(),
        again.values().map(Vec::len).sum::<usize>()
    );

    let cancel = CancellationToken::new();
    let cursor = bob
        .transport
        .request_history_from_default(0, 0, Cursor::default(), true, &cancel)
        .await?;
    println!(
        "{} History request completed (cursor: {} bytes)",
        CHECK,
        cursor.as_bytes().len()
    );

    let publish_only = alice
        .transport
        .filters()
        .iter()
        .filter(|f| !f.listen)
        .count();
    println!(
        "  Alice holds {} publish-only filters until the next cleanup",
        publish_only
    );

    alice.transport.stop().await;
    bob.transport.stop().await;
    Ok(())
}

/// Print the bloom filter of topics and chat names
pub fn bloom(topics: &[String], chats: &[String]) -> anyhow::Result<()> {
    let mut all = Vec::with_capacity(topics.len() + chats.len());
    for topic in topics {
        let parsed =
            Topic::from_str(topic).with_context(|| format!("Invalid topic {}", topic))?;
        all.push(parsed);
    }
    all.extend(chats.iter().map(|chat| Topic::from_chat_id(chat)));

    let bloom = BloomFilter::from_topics(&all);
    println!("{}", bloom);
    Ok(())
}

/// Print the topic of each chat name
pub fn topic(chats: &[String]) {
    for chat in chats {
        println!("{}: {}", style(chat).green(), Topic::from_chat_id(chat));
    }
}
