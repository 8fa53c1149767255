use std::time::Duration;

use rivalis_db::Database;
use rivalis_feed::{
    ChatService, ConversationStrategy, EventStore, LeaderboardService, ModeFilter, Subscription,
    Window,
};
use rivalis_types::models::{
    Author, ConversationKey, NewDirectMessage, NewGlobalMessage, NewScoreEvent, Recipient,
};

fn open_store() -> anyhow::Result<EventStore> {
    let path = std::env::temp_dir().join(format!("rivalis_flow_{}.db", uuid::Uuid::new_v4()));
    Ok(EventStore::new(Database::open(&path)?))
}

fn author(id: &str) -> Author {
    Author {
        user_id: id.to_string(),
        nickname: id.to_uppercase(),
        avatar_url: format!("https://avatars.test/{}.png", id),
    }
}

fn dm(from: &str, to: &str, text: &str) -> NewDirectMessage {
    NewDirectMessage {
        author: author(from),
        recipient: Recipient { user_id: to.to_string(), nickname: to.to_uppercase() },
        text: text.to_string(),
    }
}

async fn wait_for<T, P>(sub: &mut Subscription<T>, done: P) -> Window<T>
where
    T: Clone,
    P: Fn(&Window<T>) -> bool,
{
    let current = sub.current();
    if done(&current) {
        return current;
    }
    loop {
        let window = tokio::time::timeout(Duration::from_secs(5), sub.next())
            .await
            .expect("timed out waiting for window")
            .expect("subscription ended");
        if done(&window) {
            return window;
        }
    }
}

#[tokio::test]
async fn global_room_keeps_latest_fifty_live() -> anyhow::Result<()> {
    let chat = ChatService::new(open_store()?, 50, ConversationStrategy::RawWindow);
    let mut room = chat.subscribe_global(50).await;

    for i in 0..55 {
        let sent = chat
            .send_global_message(NewGlobalMessage { author: author("ana"), text: format!("m{}", i) })
            .await?;
        sent.retention.wait().await?;
    }

    let window = wait_for(&mut room, |w| {
        w.records.last().map(|m| m.text.as_str()) == Some("m54")
    })
    .await;
    assert_eq!(window.records.len(), 50);
    assert_eq!(window.records[0].text, "m5");
    assert!(window.records.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    assert_eq!(chat.recent_global(100).await, window.records);
    room.cancel();
    Ok(())
}

#[tokio::test]
async fn conversation_is_symmetric_between_participants() -> anyhow::Result<()> {
    let chat = ChatService::new(open_store()?, 50, ConversationStrategy::PairIndex);
    let mut from_ana = chat.subscribe_conversation(ConversationKey::new("ana", "ben"), 20).await;
    let mut from_ben = chat.subscribe_conversation(ConversationKey::new("ben", "ana"), 20).await;

    chat.send_direct_message(dm("ana", "ben", "hi")).await?;
    chat.send_direct_message(dm("cal", "ana", "unrelated")).await?;
    chat.send_direct_message(dm("ben", "ana", "hey")).await?;

    let a = wait_for(&mut from_ana, |w| w.records.len() == 2).await;
    let b = wait_for(&mut from_ben, |w| w.records.len() == 2).await;
    assert_eq!(a.records, b.records);

    let texts: Vec<&str> = a.records.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["hi", "hey"]);

    from_ana.cancel();
    from_ben.cancel();
    Ok(())
}

#[tokio::test]
async fn scores_feed_mode_rankings() -> anyhow::Result<()> {
    let board = LeaderboardService::new(open_store()?);
    let mut solo = board.subscribe_rankings(ModeFilter::Only("solo".into())).await;

    for (user, mode, score) in [("ana", "solo", 7), ("ben", "burnouts", 40), ("ben", "solo", 9)] {
        board
            .submit_score(NewScoreEvent {
                user_id: user.to_string(),
                user_name: user.to_uppercase(),
                game_mode: mode.to_string(),
                score,
                metadata: serde_json::json!({ "duration": 60 }),
            })
            .await?;
    }

    let window = wait_for(&mut solo, |w| w.records.len() == 2).await;
    let summary: Vec<(&str, i64)> =
        window.records.iter().map(|r| (r.user_id.as_str(), r.total)).collect();
    assert_eq!(summary, vec![("ben", 9), ("ana", 7)]);

    let everything = board.rankings(&ModeFilter::All).await;
    assert_eq!(everything[0].user_id, "ben");
    assert_eq!(everything[0].total, 49);

    solo.cancel();
    Ok(())
}
