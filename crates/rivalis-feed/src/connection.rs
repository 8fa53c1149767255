use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use rivalis_types::events::{FeedCommand, FeedEvent, FeedPayload, FeedTarget};
use rivalis_types::models::ConversationKey;

use crate::DEFAULT_WINDOW;
use crate::chat::ChatService;
use crate::diff::{Keyed, diff};
use crate::leaderboard::LeaderboardService;
use crate::ranking::ModeFilter;
use crate::subscription::{CancelHandle, Subscription};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Largest window a feed client may ask for.
const MAX_WINDOW: u32 = 200;

/// Events queued for one client before forwarders wait. A waiting forwarder
/// keeps only the newest window of its subscription.
const OUTBOUND_BUFFER: usize = 32;

/// Services a feed connection subscribes through.
#[derive(Clone)]
pub struct FeedServices {
    pub chat: ChatService,
    pub leaderboard: LeaderboardService,
}

/// Handle a single `/feed` WebSocket connection until it closes.
pub async fn handle_connection(socket: WebSocket, services: FeedServices) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id = Uuid::new_v4().to_string();

    info!("Feed connection {} opened", connection_id);

    let ready = FeedEvent::Ready { connection_id: connection_id.clone() };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    let (out_tx, mut out_rx) = mpsc::channel::<FeedEvent>(OUTBOUND_BUFFER);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward subscription output -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = out_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let conn_id_recv = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut active: HashMap<String, CancelHandle> = HashMap::new();

        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<FeedCommand>(&text) {
                    Ok(cmd) => handle_command(&services, cmd, &mut active, &out_tx).await,
                    Err(e) => {
                        let preview: String = text.chars().take(200).collect();
                        warn!("Feed connection {} bad command: {} -- raw: {}", conn_id_recv, e, preview);
                        let _ = out_tx
                            .send(FeedEvent::Error { message: format!("bad command: {}", e) })
                            .await;
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        active
    });

    // Wait for either task to finish
    let active = tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            None
        }
        res = &mut recv_task => {
            send_task.abort();
            res.ok()
        }
    };

    // Subscriptions owned by an aborted reader end as soon as their
    // forwarders see the output channel close.
    if let Some(active) = active {
        for handle in active.values() {
            handle.cancel();
        }
    }
    info!("Feed connection {} closed", connection_id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &FeedEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode feed event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

async fn handle_command(
    services: &FeedServices,
    cmd: FeedCommand,
    active: &mut HashMap<String, CancelHandle>,
    out: &mpsc::Sender<FeedEvent>,
) {
    match cmd {
        FeedCommand::Subscribe { subscription_id, target, incremental } => {
            if let Some(previous) = active.remove(&subscription_id) {
                previous.cancel();
            }
            debug!("Feed subscribe {} -> {:?}", subscription_id, target);

            let handle = match target {
                FeedTarget::Global { limit } => {
                    let sub = services.chat.subscribe_global(window(limit)).await;
                    forward(sub, subscription_id.clone(), incremental, FeedPayload::Messages, out)
                }
                FeedTarget::Conversation { user_a, user_b, limit } => {
                    let key = ConversationKey::new(&user_a, &user_b);
                    let sub = services.chat.subscribe_conversation(key, window(limit)).await;
                    forward(sub, subscription_id.clone(), incremental, FeedPayload::Messages, out)
                }
                FeedTarget::Outbox { user_id, limit } => {
                    let sub = services.chat.subscribe_outbox(&user_id, window(limit)).await;
                    forward(sub, subscription_id.clone(), incremental, FeedPayload::Messages, out)
                }
                FeedTarget::Leaderboard { mode } => {
                    let filter = ModeFilter::from_option(mode.as_deref());
                    let sub = services.leaderboard.subscribe_rankings(filter).await;
                    forward(sub, subscription_id.clone(), incremental, FeedPayload::Rankings, out)
                }
            };
            active.insert(subscription_id, handle);
        }

        FeedCommand::Unsubscribe { subscription_id } => match active.remove(&subscription_id) {
            Some(handle) => {
                handle.cancel();
                let _ = out.send(FeedEvent::Unsubscribed { subscription_id }).await;
            }
            None => {
                let _ = out
                    .send(FeedEvent::Error {
                        message: format!("unknown subscription '{}'", subscription_id),
                    })
                    .await;
            }
        },
    }
}

fn window(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_WINDOW).clamp(1, MAX_WINDOW)
}

/// Push every window of `sub` to the client. The first window always goes
/// out as a snapshot; later ones as diffs when `incremental` is set.
///
/// The subscription is cancelled once the output channel closes, even if
/// its stream never changes again.
fn forward<T>(
    sub: Subscription<T>,
    subscription_id: String,
    incremental: bool,
    wrap: fn(Vec<T>) -> FeedPayload,
    out: &mpsc::Sender<FeedEvent>,
) -> CancelHandle
where
    T: Keyed + Clone + PartialEq + Send + Sync + 'static,
{
    let out = out.clone();
    let (mut updates, cancel) = sub.into_parts();
    let cancel_on_exit = cancel.clone();

    tokio::spawn(async move {
        let mut last = updates.borrow_and_update().clone();
        let snapshot = FeedEvent::Snapshot {
            subscription_id: subscription_id.clone(),
            revision: last.revision,
            payload: wrap(last.records.clone()),
        };
        if out.send(snapshot).await.is_err() {
            cancel_on_exit.cancel();
            return;
        }

        loop {
            tokio::select! {
                _ = out.closed() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let next = updates.borrow_and_update().clone();
            let event = if incremental {
                let d = diff(&last.records, &next.records);
                FeedEvent::Diff {
                    subscription_id: subscription_id.clone(),
                    revision: next.revision,
                    added: wrap(d.added),
                    changed: wrap(d.changed),
                    removed: d.removed,
                }
            } else {
                FeedEvent::Snapshot {
                    subscription_id: subscription_id.clone(),
                    revision: next.revision,
                    payload: wrap(next.records.clone()),
                }
            };
            if out.send(event).await.is_err() {
                break;
            }
            last = next;
        }

        cancel_on_exit.cancel();
    });

    cancel
}
