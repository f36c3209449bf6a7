//! Sync worker that owns every group's state.
//!
//! Commands from [`SyncHandle`](crate::api::SyncHandle) and completions from
//! remote tasks are processed one at a time on this task, so group state is
//! never shared. Each group runs at most one remote operation at a time;
//! changes arriving meanwhile are queued and coalesced into the next publish.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use inventory_core::{InventorySnapshot, PlayerId, SyncGroupKey, SyncSections, VersionedState};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::group::{GroupState, JoinReply, Phase, PublishReply};
use super::tasks::{self, Committed, Completion, FetchFailure, PublishFailure, TaskContext};
use crate::api::{
    GroupStatus, JoinOutcome, NotificationOutcome, PublishOutcome, Result, SwitchOutcome,
    SyncError,
};
use crate::detector::{ChangeCause, ChangeEvent};
use crate::events::SyncEvent;
use crate::host::InventoryHost;
use crate::registry::SyncRegistry;
use crate::remote::Notification;
use crate::resolver::GroupResolver;

/// Commands that can be sent to the sync worker.
pub(crate) enum Command {
    Join {
        player: PlayerId,
        reply: oneshot::Sender<Result<JoinOutcome>>,
    },
    Leave {
        player: PlayerId,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Re-resolve a player's group after a team change.
    MembershipChanged {
        player: PlayerId,
        reply: oneshot::Sender<Result<SwitchOutcome>>,
    },
    /// A player's inventory changed; `reply` waits for the covering publish.
    LocalChange {
        event: ChangeEvent,
        reply: Option<PublishReply>,
    },
    Publish {
        key: SyncGroupKey,
        snapshot: InventorySnapshot,
        reply: PublishReply,
    },
    PlayerDied {
        player: PlayerId,
        reply: PublishReply,
    },
    Notification {
        notification: Notification,
        reply: Option<oneshot::Sender<Result<NotificationOutcome>>>,
    },
    QueryGroup {
        key: SyncGroupKey,
        reply: oneshot::Sender<Result<Option<GroupStatus>>>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// A group change waiting for the player's pending edits to reach the old
/// group.
struct PendingSwitch {
    from: SyncGroupKey,
    to: SyncGroupKey,
    reply: oneshot::Sender<Result<SwitchOutcome>>,
}

fn reply_to<T>(reply: oneshot::Sender<T>, value: T, command: &'static str) {
    if reply.send(value).is_err() {
        debug!(target: "sync::worker", command, "reply channel closed (caller dropped)");
    }
}

pub(crate) struct SyncWorker {
    ctx: Arc<TaskContext>,
    host: Arc<dyn InventoryHost>,
    resolver: GroupResolver,
    registry: SyncRegistry,
    sections: SyncSections,
    shared_death: bool,
    groups: HashMap<SyncGroupKey, GroupState>,
    switches: HashMap<PlayerId, PendingSwitch>,
    command_rx: mpsc::Receiver<Command>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    next_op: u64,
}

impl SyncWorker {
    pub fn new(
        ctx: Arc<TaskContext>,
        host: Arc<dyn InventoryHost>,
        resolver: GroupResolver,
        registry: SyncRegistry,
        sections: SyncSections,
        shared_death: bool,
        command_rx: mpsc::Receiver<Command>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        info!(
            target: "sync::worker",
            writer = %ctx.writer,
            sections = ?sections,
            shared_death,
            "sync worker initialized"
        );

        Self {
            ctx,
            host,
            resolver,
            registry,
            sections,
            shared_death,
            groups: HashMap::new(),
            switches: HashMap::new(),
            command_rx,
            completion_tx,
            completion_rx,
            next_op: 0,
        }
    }

    /// Main worker loop. Completions are handled ahead of new commands so a
    /// group's state is current before the next request looks at it.
    pub async fn run(mut self) {
        loop {
            let flow = tokio::select! {
                biased;
                Some(completion) = self.completion_rx.recv() => {
                    self.handle_completion(completion);
                    ControlFlow::Continue(())
                }
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        self.close_all();
                        ControlFlow::Break(())
                    }
                },
            };
            if flow.is_break() {
                break;
            }
            self.drain_deferred();
        }
        info!(target: "sync::worker", "sync worker stopped");
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Join { player, reply } => self.join(player, reply),
            Command::Leave { player, reply } => {
                self.leave(player);
                reply_to(reply, Ok(()), "Leave");
            }
            Command::MembershipChanged { player, reply } => self.membership_changed(player, reply),
            Command::LocalChange { event, reply } => self.local_change(event, reply),
            Command::Publish {
                key,
                snapshot,
                reply,
            } => self.publish(key, snapshot, reply),
            Command::PlayerDied { player, reply } => self.player_died(player, reply),
            Command::Notification {
                notification,
                reply,
            } => {
                let outcome = self.notification(notification);
                if let Some(reply) = reply {
                    reply_to(reply, Ok(outcome), "Notification");
                }
            }
            Command::QueryGroup { key, reply } => {
                let status = self.groups.get(&key).map(GroupState::status);
                reply_to(reply, Ok(status), "QueryGroup");
            }
            Command::Shutdown { reply } => {
                self.close_all();
                reply_to(reply, Ok(()), "Shutdown");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Baseline { key, op, result } => self.baseline_loaded(key, op, result),
            Completion::Fetched { key, op, result } => self.fetched(key, op, result),
            Completion::Published { key, op, result } => self.published(key, op, result),
        }
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    fn join(&mut self, player: PlayerId, reply: oneshot::Sender<Result<JoinOutcome>>) {
        if let Some(key) = self.registry.group_of(player) {
            let result = match self.groups.get(&key) {
                Some(group) if group.members.contains(&player) && !self.switches.contains_key(&player) => {
                    Ok(JoinOutcome {
                        key,
                        version: group.last_applied,
                        seeded: false,
                    })
                }
                _ => Err(SyncError::GroupSwitchInProgress { player }),
            };
            reply_to(reply, result, "Join");
            return;
        }

        let key = self.resolver.resolve(player);
        debug!(target: "sync::worker", %player, %key, "player joining");
        self.enter_group(player, key, JoinReply::Join(reply));
    }

    fn leave(&mut self, player: PlayerId) {
        let Some(key) = self.registry.group_of(player) else {
            return;
        };
        self.registry.unbind(player);
        if let Some(switch) = self.switches.remove(&player) {
            reply_to(
                switch.reply,
                Err(SyncError::SessionClosed { player }),
                "MembershipChanged",
            );
        }
        debug!(target: "sync::worker", %player, %key, "player left");
        self.remove_member(&key, player);
    }

    fn membership_changed(
        &mut self,
        player: PlayerId,
        reply: oneshot::Sender<Result<SwitchOutcome>>,
    ) {
        let Some(from) = self.registry.group_of(player) else {
            reply_to(
                reply,
                Err(SyncError::SessionClosed { player }),
                "MembershipChanged",
            );
            return;
        };
        let joining = self
            .groups
            .get(&from)
            .is_some_and(|group| !group.members.contains(&player));
        if joining || self.switches.contains_key(&player) {
            reply_to(
                reply,
                Err(SyncError::GroupSwitchInProgress { player }),
                "MembershipChanged",
            );
            return;
        }

        let to = self.resolver.resolve(player);
        if to == from {
            reply_to(reply, Ok(SwitchOutcome::Unchanged { key: from }), "MembershipChanged");
            return;
        }

        debug!(target: "sync::worker", %player, %from, %to, "group switch requested");
        self.registry.set_switching(player, true);
        // Whatever the player changed before the switch still belongs to the
        // old group.
        if let Some(group) = self.groups.get_mut(&from) {
            group.queued.dirty.insert(player);
        }
        self.switches.insert(
            player,
            PendingSwitch {
                from: from.clone(),
                to,
                reply,
            },
        );
        self.drive(&from);
    }

    /// Binds `player` to `key`, fetching the group's state first if this is
    /// the group's first local member.
    fn enter_group(&mut self, player: PlayerId, key: SyncGroupKey, reply: JoinReply) {
        self.registry.bind(player, key.clone());
        if reply.is_switch() {
            self.registry.set_switching(player, true);
        }

        if let Some(group) = self.groups.get_mut(&key) {
            if matches!(group.phase, Phase::Baseline { .. }) {
                group.joining.push((player, reply));
                return;
            }
            let seeded = group.admit(player, self.host.as_ref(), &self.registry, self.sections);
            let version = group.last_applied;
            self.finish_entry(player, &key, version, seeded, reply);
            self.drive(&key);
            return;
        }

        let op = self.next_op();
        let mut group = GroupState::new(key.clone());
        group.joining.push((player, reply));
        group.phase = Phase::Baseline { op };
        group.task = Some(self.spawn_fetch(key.clone(), op, true));
        self.groups.insert(key, group);
    }

    fn finish_entry(
        &mut self,
        player: PlayerId,
        key: &SyncGroupKey,
        version: u64,
        seeded: bool,
        reply: JoinReply,
    ) {
        match reply {
            JoinReply::Join(reply) => {
                info!(target: "sync::worker", %player, %key, version, seeded, "player joined");
                let outcome = JoinOutcome {
                    key: key.clone(),
                    version,
                    seeded,
                };
                reply_to(reply, Ok(outcome), "Join");
            }
            JoinReply::Switch { from, reply } => {
                self.registry.set_switching(player, false);
                info!(target: "sync::worker", %player, %from, to = %key, version, "player switched group");
                self.ctx.emit(SyncEvent::GroupSwitched {
                    player,
                    from: from.clone(),
                    to: key.clone(),
                });
                let outcome = SwitchOutcome::Switched {
                    from,
                    to: key.clone(),
                    version,
                };
                reply_to(reply, Ok(outcome), "MembershipChanged");
            }
        }
    }

    fn remove_member(&mut self, key: &SyncGroupKey, player: PlayerId) {
        let Some(group) = self.groups.get_mut(key) else {
            return;
        };
        group.members.remove(&player);
        group.known.remove(&player);
        group.queued.dirty.remove(&player);
        if let Some(index) = group.joining.iter().position(|(p, _)| *p == player) {
            let (_, reply) = group.joining.remove(index);
            reply.fail(SyncError::SessionClosed { player });
        }

        if group.members.is_empty()
            && group.joining.is_empty()
            && let Some(group) = self.groups.remove(key)
        {
            group.close();
            info!(target: "sync::worker", %key, "group closed");
            self.ctx.emit(SyncEvent::GroupClosed { key: key.clone() });
        }
    }

    /// Moves switching players whose edits have reached their old group.
    fn complete_switches(&mut self, key: &SyncGroupKey) {
        let Some(group) = self.groups.get(key) else {
            return;
        };
        let in_flight = match &group.phase {
            Phase::Publishing { sources, .. } => Some(sources),
            _ => None,
        };
        let ready: Vec<PlayerId> = self
            .switches
            .iter()
            .filter(|(player, switch)| {
                switch.from == *key
                    && !group.queued.dirty.contains(*player)
                    && !in_flight.is_some_and(|sources| sources.contains_key(*player))
            })
            .map(|(player, _)| *player)
            .collect();

        for player in ready {
            let Some(switch) = self.switches.remove(&player) else {
                continue;
            };
            self.remove_member(&switch.from, player);
            self.enter_group(
                player,
                switch.to,
                JoinReply::Switch {
                    from: switch.from,
                    reply: switch.reply,
                },
            );
        }
    }

    fn close_all(&mut self) {
        for (player, switch) in self.switches.drain() {
            reply_to(
                switch.reply,
                Err(SyncError::SessionClosed { player }),
                "MembershipChanged",
            );
        }
        for (_, group) in self.groups.drain() {
            group.close();
        }
    }

    // ========================================================================
    // Local changes
    // ========================================================================

    /// Group a player's edits currently go to.
    fn active_group(&self, player: PlayerId) -> Result<SyncGroupKey> {
        let Some(key) = self.registry.group_of(player) else {
            return Err(SyncError::SessionClosed { player });
        };
        if self.switches.contains_key(&player) || self.registry.is_switching(player) {
            return Err(SyncError::GroupSwitchInProgress { player });
        }
        match self.groups.get(&key) {
            Some(group) if group.members.contains(&player) => Ok(key),
            _ => Err(SyncError::InactiveGroup { key }),
        }
    }

    fn local_change(&mut self, event: ChangeEvent, reply: Option<PublishReply>) {
        let player = event.player;
        let key = match self.active_group(player) {
            Ok(key) => key,
            Err(err) => {
                Self::reject(reply, err);
                return;
            }
        };
        let Some(group) = self.groups.get_mut(&key) else {
            return;
        };

        trace!(target: "sync::worker", %player, %key, cause = %event.cause, "local change queued");
        group.queued.dirty.insert(player);
        if let Some(reply) = reply {
            group.queued.waiters.push(reply);
        }
        self.drive(&key);
    }

    fn player_died(&mut self, player: PlayerId, reply: PublishReply) {
        if !self.shared_death {
            self.local_change(ChangeEvent::new(player, ChangeCause::Death), Some(reply));
            return;
        }
        let key = match self.active_group(player) {
            Ok(key) => key,
            Err(err) => {
                reply_to(reply, Err(err), "PlayerDied");
                return;
            }
        };
        let Some(group) = self.groups.get_mut(&key) else {
            return;
        };

        info!(target: "sync::worker", %player, %key, "shared death, clearing group items");
        group.queued.dirty.insert(player);
        group.queued.clear_items = true;
        group.queued.waiters.push(reply);
        self.ctx.emit(SyncEvent::SharedDeath {
            key: key.clone(),
            player,
        });
        self.drive(&key);
    }

    fn publish(&mut self, key: SyncGroupKey, snapshot: InventorySnapshot, reply: PublishReply) {
        let Some(group) = self
            .groups
            .get_mut(&key)
            .filter(|group| !group.members.is_empty())
        else {
            reply_to(reply, Err(SyncError::InactiveGroup { key }), "Publish");
            return;
        };

        group.queued.explicit = Some(snapshot);
        group.queued.waiters.push(reply);
        self.drive(&key);
    }

    fn reject(reply: Option<PublishReply>, err: SyncError) {
        match reply {
            Some(reply) => reply_to(reply, Err(err), "LocalChange"),
            None => trace!(target: "sync::worker", error = %err, "local change dropped"),
        }
    }

    /// Changes parked by the detector while the command queue was full.
    fn drain_deferred(&mut self) {
        for player in self.registry.take_deferred() {
            self.local_change(ChangeEvent::new(player, ChangeCause::Other), None);
        }
    }

    // ========================================================================
    // Remote updates
    // ========================================================================

    fn notification(&mut self, notification: Notification) -> NotificationOutcome {
        let Notification {
            key,
            version,
            origin,
        } = notification;
        let Some(group) = self.groups.get_mut(&key) else {
            trace!(target: "sync::worker", %key, version, "notification for untracked group");
            return NotificationOutcome::Untracked;
        };

        if version <= group.last_applied {
            let last_applied = group.last_applied;
            trace!(target: "sync::worker", %key, version, last_applied, "stale notification");
            self.ctx.emit(SyncEvent::Discarded {
                key,
                version,
                last_applied,
            });
            return NotificationOutcome::Stale { last_applied };
        }

        group.remote_hint = group.remote_hint.max(version);
        debug!(target: "sync::worker", %key, version, %origin, "remote update scheduled");
        self.drive(&key);
        NotificationOutcome::Scheduled
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    fn next_op(&mut self) -> u64 {
        self.next_op += 1;
        self.next_op
    }

    /// Starts the group's next remote operation if it has none running:
    /// a fetch when a newer version was announced, otherwise a publish of
    /// the queued changes. Then lets switching players move on.
    fn drive(&mut self, key: &SyncGroupKey) {
        if self.start_fetch(key) {
            return;
        }
        self.start_publish(key);
        self.complete_switches(key);
    }

    /// Returns true when the group is busy or a fetch was started.
    fn start_fetch(&mut self, key: &SyncGroupKey) -> bool {
        let Some(group) = self.groups.get(key) else {
            return true;
        };
        if !group.phase.is_idle() {
            return true;
        }
        if group.remote_hint <= group.last_applied {
            return false;
        }

        let target = group.remote_hint;
        let op = self.next_op();
        let task = self.spawn_fetch(key.clone(), op, false);
        if let Some(group) = self.groups.get_mut(key) {
            group.phase = Phase::Fetching { op, target };
            group.task = Some(task);
        }
        true
    }

    fn start_publish(&mut self, key: &SyncGroupKey) {
        let op = self.next_op + 1;
        let Some(group) = self.groups.get_mut(key) else {
            return;
        };
        if !group.phase.is_idle() || group.queued.is_empty() {
            return;
        }

        let candidate = group.take_candidate(self.host.as_ref(), self.sections);
        let Some(snapshot) = candidate.snapshot else {
            let version = group.last_applied;
            trace!(target: "sync::worker", %key, version, "nothing to publish");
            for waiter in candidate.waiters {
                reply_to(waiter, Ok(PublishOutcome::Unchanged { version }), "LocalChange");
            }
            return;
        };

        let (base_version, base) = (group.last_applied, group.base.clone());
        group.phase = Phase::Publishing {
            op,
            sources: candidate.sources,
            waiters: candidate.waiters,
        };
        self.next_op = op;
        let task = self.spawn_publish(key.clone(), op, base_version, base, snapshot);
        if let Some(group) = self.groups.get_mut(key) {
            group.task = Some(task);
        }
    }

    fn spawn_fetch(&self, key: SyncGroupKey, op: u64, baseline: bool) -> JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = tasks::fetch(&ctx, &key).await;
            let completion = if baseline {
                Completion::Baseline { key, op, result }
            } else {
                Completion::Fetched { key, op, result }
            };
            let _ = completion_tx.send(completion);
        })
    }

    fn spawn_publish(
        &self,
        key: SyncGroupKey,
        op: u64,
        base_version: u64,
        base: InventorySnapshot,
        candidate: InventorySnapshot,
    ) -> JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = tasks::publish(&ctx, &key, base_version, &base, candidate).await;
            let _ = completion_tx.send(Completion::Published { key, op, result });
        })
    }

    /// Ends the group's running operation if `op` is still the current one.
    fn finish_phase(&mut self, key: &SyncGroupKey, op: u64) -> Option<Phase> {
        let group = self.groups.get_mut(key)?;
        if group.phase.op() != Some(op) {
            debug!(target: "sync::worker", %key, op, "stale completion ignored");
            return None;
        }
        group.task = None;
        Some(std::mem::replace(&mut group.phase, Phase::Idle))
    }

    // ========================================================================
    // Completions
    // ========================================================================

    fn baseline_loaded(
        &mut self,
        key: SyncGroupKey,
        op: u64,
        result: std::result::Result<Option<VersionedState>, FetchFailure>,
    ) {
        if self.finish_phase(&key, op).is_none() {
            return;
        }
        let Some(group) = self.groups.get_mut(&key) else {
            return;
        };
        let joining = std::mem::take(&mut group.joining);

        match result {
            Ok(Some(state)) => {
                group.last_applied = state.version;
                group.base = state.snapshot;
            }
            Ok(None) => {}
            Err(FetchFailure::Decode { version, error }) => {
                warn!(
                    target: "sync::worker",
                    %key,
                    version,
                    error = %error,
                    "stored state unreadable, keeping local inventories"
                );
                group.unreadable = Some(version);
                self.ctx.emit(SyncEvent::DecodeFailed {
                    key: key.clone(),
                    version,
                    error: error.to_string(),
                });
            }
            Err(FetchFailure::Remote(err)) => {
                warn!(target: "sync::worker", %key, error = %err, "baseline fetch failed");
                for (player, reply) in joining {
                    self.registry.unbind(player);
                    reply.fail(SyncError::RemoteUnavailable(err.clone()));
                }
                if let Some(group) = self.groups.remove(&key) {
                    group.close();
                }
                return;
            }
        }

        let version = group.last_applied;
        let entered: Vec<_> = joining
            .into_iter()
            .map(|(player, reply)| {
                let seeded =
                    group.admit(player, self.host.as_ref(), &self.registry, self.sections);
                (player, seeded, reply)
            })
            .collect();

        self.ctx.emit(SyncEvent::BaselineLoaded {
            key: key.clone(),
            version,
            seeded: entered.iter().any(|(_, seeded, _)| *seeded),
        });
        for (player, seeded, reply) in entered {
            self.finish_entry(player, &key, version, seeded, reply);
        }
        self.drive(&key);
    }

    fn fetched(
        &mut self,
        key: SyncGroupKey,
        op: u64,
        result: std::result::Result<Option<VersionedState>, FetchFailure>,
    ) {
        let Some(Phase::Fetching { target, .. }) = self.finish_phase(&key, op) else {
            return;
        };
        let Some(group) = self.groups.get_mut(&key) else {
            return;
        };
        // A notification that arrived during the fetch may announce a
        // version beyond what was read.
        if group.remote_hint <= target {
            group.remote_hint = 0;
        }

        match result {
            Ok(Some(state)) if state.version > group.last_applied => {
                let members =
                    group.reconcile(&state.snapshot, self.host.as_ref(), &self.registry, self.sections);
                group.last_applied = state.version;
                group.base = state.snapshot;
                group.unreadable = None;
                debug!(
                    target: "sync::worker",
                    %key,
                    version = state.version,
                    writer = %state.writer,
                    members,
                    "remote state applied"
                );
                self.ctx.emit(SyncEvent::Applied {
                    key: key.clone(),
                    version: state.version,
                    members,
                });
            }
            Ok(Some(state)) => {
                self.ctx.emit(SyncEvent::Discarded {
                    key: key.clone(),
                    version: state.version,
                    last_applied: group.last_applied,
                });
            }
            Ok(None) => {
                debug!(target: "sync::worker", %key, announced = target, "announced state no longer stored");
            }
            Err(FetchFailure::Decode { version, error }) => {
                warn!(
                    target: "sync::worker",
                    %key,
                    version,
                    last_applied = group.last_applied,
                    error = %error,
                    "remote state unreadable, keeping last applied"
                );
                self.ctx.emit(SyncEvent::DecodeFailed {
                    key: key.clone(),
                    version,
                    error: error.to_string(),
                });
            }
            Err(FetchFailure::Remote(err)) => {
                warn!(target: "sync::worker", %key, announced = target, error = %err, "remote fetch failed");
            }
        }

        self.drive(&key);
    }

    fn published(
        &mut self,
        key: SyncGroupKey,
        op: u64,
        result: std::result::Result<Committed, PublishFailure>,
    ) {
        let Some(Phase::Publishing {
            sources, waiters, ..
        }) = self.finish_phase(&key, op)
        else {
            return;
        };
        let Some(group) = self.groups.get_mut(&key) else {
            return;
        };

        match result {
            Ok(committed) => {
                let members = group.reconcile(
                    &committed.state,
                    self.host.as_ref(),
                    &self.registry,
                    self.sections,
                );
                group.last_applied = committed.version;
                group.base = committed.state;
                group.unreadable = None;

                let outcome = if committed.wrote {
                    info!(
                        target: "sync::worker",
                        %key,
                        version = committed.version,
                        conflicts = committed.conflicts,
                        "state published"
                    );
                    self.ctx.emit(SyncEvent::Published {
                        key: key.clone(),
                        version: committed.version,
                        conflicts: committed.conflicts,
                    });
                    PublishOutcome::Committed {
                        version: committed.version,
                    }
                } else {
                    PublishOutcome::Unchanged {
                        version: committed.version,
                    }
                };
                self.ctx.emit(SyncEvent::Applied {
                    key: key.clone(),
                    version: committed.version,
                    members,
                });
                for waiter in waiters {
                    reply_to(waiter, Ok(outcome), "LocalChange");
                }
            }
            Err(failure) => {
                warn!(target: "sync::worker", %key, error = %failure, "publish failed");
                group.restore_sources(sources);
                self.ctx.emit(SyncEvent::PublishFailed {
                    key: key.clone(),
                    reason: failure.to_string(),
                });
                for waiter in waiters {
                    reply_to(waiter, Err(failure.to_error(&key)), "LocalChange");
                }
            }
        }

        self.drive(&key);
    }
}
