//! Inventories shared between servers through one store and channel.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Node, config, eventually, player, stack, stored, wait_event};
use inventory_core::{InventorySnapshot, SyncGroupKey, TeamId};
use sync_runtime::{
    ChangeCause, MemoryChannel, MemoryStore, PublishOutcome, SyncEvent, SyncHooks,
};

// ============================================================================
// Single player moving between servers
// ============================================================================

#[tokio::test]
async fn test_item_follows_player_between_servers() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let lobby = Node::start(config("lobby"), &store, &channel).await;
    let survival = Node::start(config("survival"), &store, &channel).await;

    let steve = player(1);
    let key = SyncGroupKey::for_player(steve);
    let with_sword = InventorySnapshot::new().with_slot(0, stack("minecraft:diamond_sword"));

    // First login anywhere: the inventory seeds the group.
    lobby.host.connect(steve, with_sword.clone());
    let joined = lobby.handle.join(steve).await.unwrap();
    assert_eq!(joined.version, 0);
    assert!(joined.seeded);
    eventually(|| store.version(&key) == 1).await;

    lobby.handle.leave(steve).await.unwrap();
    let lobby_copy = lobby.host.disconnect(steve).unwrap();

    // The sword shows up on the other server.
    survival.host.connect(steve, InventorySnapshot::new());
    let joined = survival.handle.join(steve).await.unwrap();
    assert_eq!(joined.version, 1);
    assert_eq!(survival.host.inventory(steve), Some(with_sword.clone()));

    let outcome = survival
        .edit(steve, ChangeCause::Drop, |inv| {
            inv.clear_slot(0);
        })
        .await;
    assert_eq!(outcome, PublishOutcome::Committed { version: 2 });
    survival.handle.leave(steve).await.unwrap();

    // Back on the lobby the stale local copy is replaced.
    lobby.host.connect(steve, lobby_copy);
    let joined = lobby.handle.join(steve).await.unwrap();
    assert_eq!(joined.version, 2);
    assert!(lobby.host.inventory(steve).unwrap().slot(0).is_none());

    lobby.stop().await;
    survival.stop().await;
}

// ============================================================================
// Team groups
// ============================================================================

#[tokio::test]
async fn test_team_edits_reach_teammates_on_other_servers() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let mut cfg = config("s1");
    cfg.teams_enabled = true;
    let s1 = Node::start(cfg.clone(), &store, &channel).await;
    cfg.server_id = "s2".into();
    let s2 = Node::start(cfg, &store, &channel).await;

    let red = TeamId::new("red");
    let key = SyncGroupKey::for_team(&red);
    let (alex, sam) = (player(1), player(2));
    s1.teams.assign(alex, red.clone());
    s2.teams.assign(sam, red.clone());

    s1.host
        .connect(alex, InventorySnapshot::new().with_slot(0, stack("minecraft:torch")));
    let joined = s1.handle.join(alex).await.unwrap();
    assert_eq!(joined.key, key);
    eventually(|| store.version(&key) == 1).await;

    s2.host.connect(sam, InventorySnapshot::new());
    let joined = s2.handle.join(sam).await.unwrap();
    assert_eq!(joined.version, 1);
    assert!(s2.host.inventory(sam).unwrap().slot(0).is_some());

    let outcome = s1
        .edit(alex, ChangeCause::Pickup, |inv| {
            inv.set_slot(1, stack("minecraft:apple"));
        })
        .await;
    assert_eq!(outcome, PublishOutcome::Committed { version: 2 });
    eventually(|| {
        s2.host
            .inventory(sam)
            .is_some_and(|inv| inv.slot(0).is_some() && inv.slot(1).is_some())
    })
    .await;

    let outcome = s2
        .edit(sam, ChangeCause::Drop, |inv| {
            inv.clear_slot(0);
        })
        .await;
    assert_eq!(outcome, PublishOutcome::Committed { version: 3 });
    eventually(|| {
        s1.host
            .inventory(alex)
            .is_some_and(|inv| inv.slot(0).is_none() && inv.slot(1).is_some())
    })
    .await;

    s1.stop().await;
    s2.stop().await;
}

#[tokio::test]
async fn test_death_clears_items_for_teammates_on_other_servers() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let mut cfg = config("s1");
    cfg.teams_enabled = true;
    let s1 = Node::start(cfg.clone(), &store, &channel).await;
    cfg.server_id = "s2".into();
    let s2 = Node::start(cfg, &store, &channel).await;

    let blue = TeamId::new("blue");
    let key = SyncGroupKey::for_team(&blue);
    let (alex, sam) = (player(1), player(2));
    s1.teams.assign(alex, blue.clone());
    s2.teams.assign(sam, blue);

    s1.host.connect(
        alex,
        InventorySnapshot::new()
            .with_slot(0, stack("minecraft:torch"))
            .with_slot(7, stack("minecraft:golden_apple")),
    );
    s1.handle.join(alex).await.unwrap();
    eventually(|| store.version(&key) == 1).await;
    s2.host.connect(sam, InventorySnapshot::new().with_currency(300));
    s2.handle.join(sam).await.unwrap();
    assert!(s2.host.inventory(sam).unwrap().slot(7).is_some());
    let mut events = s1.engine.subscribe_events();

    let outcome = s1.handle.player_died(alex).await.unwrap();
    assert_eq!(outcome, PublishOutcome::Committed { version: 2 });
    wait_event(&mut events, |e| {
        matches!(e, SyncEvent::SharedDeath { player, .. } if *player == alex)
    })
    .await;

    assert!(s1.host.inventory(alex).unwrap().main.is_empty());
    assert!(stored(&store, &key).unwrap().main.is_empty());
    eventually(|| s2.host.inventory(sam).is_some_and(|inv| inv.main.is_empty())).await;
    // Currency is not a synchronized section by default.
    assert_eq!(s2.host.inventory(sam).unwrap().currency, Some(300));

    s1.stop().await;
    s2.stop().await;
}

// ============================================================================
// Stored state expiry
// ============================================================================

#[tokio::test]
async fn test_versions_keep_rising_after_stored_state_expires() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let mut cfg = config("a");
    cfg.fallback_to_global = true;
    let a = Node::start(cfg.clone(), &store, &channel).await;
    cfg.server_id = "b".into();
    let b = Node::start(cfg, &store, &channel).await;

    let key = SyncGroupKey::global();
    let (pa, pb) = (player(1), player(2));
    a.host.connect(pa, InventorySnapshot::new());
    b.host.connect(pb, InventorySnapshot::new());
    a.handle.join(pa).await.unwrap();
    b.handle.join(pb).await.unwrap();

    for slot in 0..3 {
        a.edit(pa, ChangeCause::Pickup, |inv| {
            inv.set_slot(slot, stack("minecraft:cobblestone"));
        })
        .await;
    }
    eventually(|| b.host.inventory(pb).is_some_and(|inv| inv.slot(2).is_some())).await;

    store.evict(&key);
    let outcome = a
        .edit(pa, ChangeCause::Pickup, |inv| {
            inv.set_slot(9, stack("minecraft:lantern"));
        })
        .await;

    assert_eq!(outcome, PublishOutcome::Committed { version: 4 });
    assert_eq!(store.version(&key), 4);
    eventually(|| b.host.inventory(pb).is_some_and(|inv| inv.slot(9).is_some())).await;
    let status = b.handle.group_status(key).await.unwrap().unwrap();
    assert_eq!(status.last_applied, 4);

    a.stop().await;
    b.stop().await;
}

// ============================================================================
// Concurrent writers
// ============================================================================

#[tokio::test]
async fn test_concurrent_edits_converge() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let mut cfg = config("east");
    cfg.fallback_to_global = true;
    let east = Node::start(cfg.clone(), &store, &channel).await;
    cfg.server_id = "west".into();
    let west = Node::start(cfg, &store, &channel).await;

    let key = SyncGroupKey::global();
    let (a, b) = (player(1), player(2));
    east.host.connect(a, InventorySnapshot::new());
    west.host.connect(b, InventorySnapshot::new());
    east.handle.join(a).await.unwrap();
    west.handle.join(b).await.unwrap();

    let (first, second) = tokio::join!(
        east.edit(a, ChangeCause::Pickup, |inv| {
            inv.set_slot(0, stack("minecraft:apple"));
        }),
        west.edit(b, ChangeCause::Pickup, |inv| {
            inv.set_slot(5, stack("minecraft:bread"));
        }),
    );
    let mut versions = [first.version().unwrap(), second.version().unwrap()];
    versions.sort_unstable();
    assert_eq!(versions, [1, 2]);

    let both = |inv: &InventorySnapshot| inv.slot(0).is_some() && inv.slot(5).is_some();
    eventually(|| east.host.inventory(a).is_some_and(|inv| both(&inv))).await;
    eventually(|| west.host.inventory(b).is_some_and(|inv| both(&inv))).await;
    assert_eq!(store.version(&key), 2);
    assert!(both(&stored(&store, &key).unwrap()));

    east.stop().await;
    west.stop().await;
}

// ============================================================================
// Applying remote state never echoes back
// ============================================================================

#[tokio::test]
async fn test_applied_state_is_not_republished() {
    let store = MemoryStore::new();
    let channel = MemoryChannel::new();
    let mut cfg = config("origin");
    cfg.fallback_to_global = true;
    let origin = Node::start(cfg.clone(), &store, &channel).await;
    cfg.server_id = "mirror".into();
    let mirror = Node::start(cfg, &store, &channel).await;

    // The mirror host reports every write, including the engine's own.
    mirror.host.report_applies(true);
    let hooks: Arc<dyn SyncHooks> = Arc::new(mirror.handle.clone());
    mirror.host.attach(hooks);

    let key = SyncGroupKey::global();
    let (a, b) = (player(1), player(2));
    origin.host.connect(a, InventorySnapshot::new());
    mirror.host.connect(b, InventorySnapshot::new());
    origin.handle.join(a).await.unwrap();
    mirror.handle.join(b).await.unwrap();
    let mut events = mirror.engine.subscribe_events();

    origin
        .edit(a, ChangeCause::Pickup, |inv| {
            inv.set_slot(3, stack("minecraft:emerald"));
        })
        .await;
    wait_event(&mut events, |e| {
        matches!(e, SyncEvent::Applied { version: 1, .. })
    })
    .await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.version(&key), 1);
    assert!(mirror.handle.detector().suppressed_count() >= 1);
    let status = mirror.handle.group_status(key).await.unwrap().unwrap();
    assert_eq!(status.last_applied, 1);
    assert!(!status.pending_changes);
    assert!(!status.busy);

    origin.stop().await;
    mirror.stop().await;
}
