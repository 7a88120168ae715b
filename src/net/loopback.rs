//! In-process transport: the authoritative tick loop and scripted bot
//! clients, connected by tokio channels carrying codec-encoded payloads.

use std::future::Future;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, Tuning};
use crate::game::{Command, EntityId, PlayerSnapshot, Snapshot};
use crate::sync::{ClientEvent, ClientSync, ServerSync};
use crate::util::time::{tick_duration, NetworkClock};
use crate::wire::codec::{decode_command_batch, decode_snapshot};
use crate::wire::{ClientMsg, PlayerInput, ServerMsg};

use super::NetError;

/// Frames per second the bots render at
const BOT_FRAME_RATE: u32 = 60;

/// Channels a client uses to reach the server
#[derive(Clone)]
pub struct ServerHandle {
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub snapshot_tx: broadcast::Sender<ServerMsg>,
}

/// The authoritative server behind a loopback transport
pub struct LoopbackServer {
    sync: ServerSync,
    input_rx: mpsc::Receiver<PlayerInput>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    tick_rate: u32,
    snapshot_interval: f64,
    last_snapshot: f64,
    ticks: u64,
    clock: NetworkClock,
}

impl LoopbackServer {
    pub fn new(tick_rate: u32, tuning: Tuning, seed: u64, clock: NetworkClock) -> (Self, ServerHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (snapshot_tx, _) = broadcast::channel(64);

        let handle = ServerHandle {
            input_tx,
            snapshot_tx: snapshot_tx.clone(),
        };

        let server = Self {
            sync: ServerSync::new(tuning, seed),
            input_rx,
            snapshot_tx,
            tick_rate,
            snapshot_interval: tuning.client_server_delay,
            last_snapshot: f64::NEG_INFINITY,
            ticks: 0,
            clock,
        };

        (server, handle)
    }

    /// Run the tick loop until `shutdown` flips. Returns the final server
    /// state and the number of ticks run.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> (ServerSync, u64) {
        info!(tick_rate = self.tick_rate, "Server loop started");

        let mut ticker = interval(tick_duration(self.tick_rate));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            let now = self.clock.now();
            self.process_inputs(now);
            self.sync.tick(now);
            self.ticks += 1;

            if now - self.last_snapshot >= self.snapshot_interval {
                self.last_snapshot = now;
                let snapshot = self.sync.produce_outbound_snapshot(now);
                match ServerMsg::snapshot(&snapshot) {
                    // No subscribers is not an error
                    Ok(msg) => {
                        let _ = self.snapshot_tx.send(msg);
                    }
                    Err(e) => error!(error = %e, "Failed to encode snapshot"),
                }
            }
        }

        info!(ticks = self.ticks, "Server loop stopped");
        (self.sync, self.ticks)
    }

    /// Drain everything the transport has delivered so far
    fn process_inputs(&mut self, now: f64) {
        while let Ok(PlayerInput { entity_id, msg }) = self.input_rx.try_recv() {
            match msg {
                ClientMsg::Connect => {
                    self.sync.on_connect(entity_id, now);
                    let _ = self.snapshot_tx.send(ServerMsg::Welcome {
                        entity_id,
                        server_time: now,
                    });
                }
                ClientMsg::Commands { payload } => match decode_command_batch(payload) {
                    Ok(commands) => {
                        // Unknown senders are logged by the sync layer
                        let _ = self.sync.apply_inbound_commands(entity_id, &commands);
                    }
                    Err(e) => warn!(entity_id = %entity_id, error = %e, "Rejected command batch"),
                },
                ClientMsg::Respawn => {
                    if let Err(e) = self.sync.request_respawn(entity_id) {
                        warn!(entity_id = %entity_id, error = %e, "Respawn refused");
                    }
                }
                ClientMsg::Disconnect => self.sync.on_disconnect(entity_id),
            }
        }
    }
}

/// Scripted input: wanders, turns, draws the revolver and fires now and then
struct BotScript {
    rng: ChaCha8Rng,
    move_h: f32,
    move_v: f32,
    turn: f32,
    next_change: f64,
    armed: bool,
}

impl BotScript {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            move_h: 0.0,
            move_v: 0.0,
            turn: 0.0,
            next_change: f64::NEG_INFINITY,
            armed: false,
        }
    }

    fn next(&mut self, now: f64) -> Command {
        if now >= self.next_change {
            self.move_h = self.rng.gen_range(-1.0..=1.0);
            self.move_v = self.rng.gen_range(-1.0..=1.0);
            self.turn = self.rng.gen_range(-2.0..=2.0);
            self.next_change = now + self.rng.gen_range(0.5..1.5);
        }

        let fire_edge = self.armed && self.rng.gen_bool(0.02);
        let command = Command {
            timestamp: now,
            move_h: self.move_h,
            move_v: self.move_v,
            mouse_dx: self.turn,
            fire: fire_edge,
            fire_edge,
            equip_secondary: !self.armed,
            ..Command::default()
        };
        self.armed = true;
        command
    }
}

/// What a bot ended up seeing
#[derive(Debug, Clone, Serialize)]
pub struct BotReport {
    pub id: EntityId,
    pub predicted: Option<PlayerSnapshot>,
    pub remotes: usize,
    pub snapshots_stored: usize,
    pub remote_shots_seen: usize,
    pub latency: Option<f64>,
}

/// A scripted client driving [`ClientSync`] over the loopback transport
pub struct Bot {
    client: ClientSync,
    input_tx: mpsc::Sender<PlayerInput>,
    snapshot_rx: broadcast::Receiver<ServerMsg>,
    script: BotScript,
    clock: NetworkClock,
    respawn_requested: bool,
    remote_shots_seen: usize,
}

impl Bot {
    pub fn new(id: EntityId, tuning: Tuning, handle: &ServerHandle, seed: u64, clock: NetworkClock) -> Self {
        Self {
            client: ClientSync::new(id, tuning),
            input_tx: handle.input_tx.clone(),
            snapshot_rx: handle.snapshot_tx.subscribe(),
            script: BotScript::new(seed),
            clock,
            respawn_requested: false,
            remote_shots_seen: 0,
        }
    }

    async fn send(&mut self, msg: ClientMsg) -> bool {
        let input = PlayerInput {
            entity_id: self.client.local_id(),
            msg,
        };
        self.input_tx.send(input).await.is_ok()
    }

    /// Run frames until `shutdown` flips or the server goes away
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> BotReport {
        let id = self.client.local_id();
        if !self.send(ClientMsg::Connect).await {
            warn!(entity_id = %id, "Server gone before connect");
            return self.report();
        }

        let mut frames = interval(tick_duration(BOT_FRAME_RATE));
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame = self.clock.now();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = frames.tick() => {}
            }

            let now = self.clock.now();
            let delta = now - last_frame;
            last_frame = now;

            if !self.receive(now) {
                break;
            }

            let dead = self.client.local().map(|state| state.is_dead);
            if dead == Some(true) && !self.respawn_requested {
                self.respawn_requested = self.send(ClientMsg::Respawn).await;
            } else if dead == Some(false) {
                self.respawn_requested = false;
            }

            let command = self.script.next(now);
            if let Some(batch) = self.client.push_command(command, delta) {
                if !self.send(ClientMsg::commands(&batch)).await {
                    break;
                }
            }

            self.client.tick(now, delta as f32);

            for event in self.client.drain_events() {
                match event {
                    ClientEvent::RemoteShot(_) => self.remote_shots_seen += 1,
                    other => debug!(entity_id = %id, event = ?other, "Client event"),
                }
            }
        }

        let _ = self.input_tx.try_send(PlayerInput {
            entity_id: id,
            msg: ClientMsg::Disconnect,
        });
        self.report()
    }

    /// Drain delivered server messages. Returns `false` once the server
    /// has shut its side down.
    fn receive(&mut self, now: f64) -> bool {
        loop {
            match self.snapshot_rx.try_recv() {
                Ok(ServerMsg::Snapshot { sent_at, payload }) => match decode_snapshot(payload, sent_at) {
                    Ok(snapshot) => {
                        self.client.apply_inbound_snapshot(snapshot, now);
                    }
                    Err(e) => warn!(error = %e, "Dropping undecodable snapshot"),
                },
                Ok(ServerMsg::Welcome { entity_id, server_time }) => {
                    if entity_id == self.client.local_id() {
                        debug!(entity_id = %entity_id, server_time, "Connected");
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return true,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(entity_id = %self.client.local_id(), skipped, "Client fell behind the snapshot stream");
                }
                Err(broadcast::error::TryRecvError::Closed) => return false,
            }
        }
    }

    fn report(&self) -> BotReport {
        BotReport {
            id: self.client.local_id(),
            predicted: self.client.local().map(|state| state.to_snapshot()),
            remotes: self.client.remotes().len(),
            snapshots_stored: self.client.store().len(),
            remote_shots_seen: self.remote_shots_seen,
            latency: self.client.latency(),
        }
    }
}

/// Outcome of a loopback run
#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    pub ticks: u64,
    pub final_snapshot: Option<Snapshot>,
    pub bots: Vec<BotReport>,
}

/// Run a server and `config.demo_bots` bots until `config.demo_seconds`
/// elapse or `shutdown` resolves.
pub async fn run_demo(config: &Config, shutdown: impl Future<Output = ()>) -> Result<DemoReport, NetError> {
    let clock = NetworkClock::System;
    let seed: u64 = rand::random();
    let (server, handle) = LoopbackServer::new(config.server_tick_rate, config.tuning, seed, clock.clone());
    let (stop_tx, stop_rx) = watch::channel(false);

    info!(bots = config.demo_bots, seconds = config.demo_seconds, "Starting loopback demo");
    let server_task = tokio::spawn(server.run(stop_rx.clone()));

    let bot_tasks: Vec<_> = (0..config.demo_bots as u64)
        .map(|i| {
            let bot = Bot::new(Uuid::new_v4(), config.tuning, &handle, seed.wrapping_add(i + 1), clock.clone());
            tokio::spawn(bot.run(stop_rx.clone()))
        })
        .collect();
    drop(handle);

    tokio::select! {
        _ = sleep(Duration::from_secs(config.demo_seconds)) => {
            info!("Demo time elapsed");
        }
        _ = shutdown => {}
    }
    let _ = stop_tx.send(true);

    let mut bots = Vec::with_capacity(bot_tasks.len());
    for task in bot_tasks {
        bots.push(task.await?);
    }
    let (sync, ticks) = server_task.await?;

    Ok(DemoReport {
        ticks,
        final_snapshot: sync.history().latest().cloned(),
        bots,
    })
}
