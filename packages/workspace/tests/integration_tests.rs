//! Multi-actor scenarios over a shared bus

use chrono::Utc;
use folio_editor::{EditorIntent, Key};
use folio_model::*;
use folio_workspace::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

fn page() -> Page {
    let mut page = Page::new(PageId::from("roadmap"), "Roadmap", WorkspaceId::from("ws"), "ana", Utc::now());
    page.content = vec![
        Block::new(BlockId::from("h"), BlockType::Heading1, "Roadmap"),
        Block::new(BlockId::from("p"), BlockType::Paragraph, "Q3"),
    ];
    page
}

fn open(bus: &CollabBus, clock: &ManualClock, actor: &str) -> PageSession {
    PageSession::new(
        page(),
        ActorContext::new(actor, "ws"),
        bus.clone(),
        CollabConfig::default(),
        Arc::new(clock.clone()),
    )
    .unwrap()
}

fn mutations(tap: &mut tokio::sync::broadcast::Receiver<CollabMessage>) -> Vec<MutationEvent> {
    let mut events = Vec::new();
    loop {
        match tap.try_recv() {
            Ok(CollabMessage::Mutation(event)) => events.push(event),
            Ok(CollabMessage::Presence(_)) => {}
            Err(TryRecvError::Empty) => break,
            Err(error) => panic!("tap failed: {error}"),
        }
    }
    events
}

#[test]
fn test_three_actors_converge() {
    let bus = CollabBus::new(256);
    let clock = ManualClock::new(10_000);
    let mut sessions: Vec<PageSession> = ["ana", "ben", "cy"].iter().map(|a| open(&bus, &clock, a)).collect();

    // Everyone inserts after the heading at once
    for (i, session) in sessions.iter_mut().enumerate() {
        session.handle(EditorIntent::Focus(BlockId::from("h"))).unwrap();
        session.handle(EditorIntent::key(Key::Enter)).unwrap();
        session.handle(EditorIntent::Input(format!("note {i}"))).unwrap();
    }
    clock.advance(10);
    sessions[1]
        .edit(|doc| doc.change_type(&BlockId::from("p"), BlockType::Quote))
        .unwrap();
    sessions[2].edit(|doc| doc.delete(&BlockId::from("h"))).unwrap();

    for _ in 0..2 {
        for session in sessions.iter_mut() {
            session.drain_remote().unwrap();
        }
    }

    let reference = sessions[0].document().blocks().to_vec();
    assert_eq!(reference.len(), 4);
    assert!(reference.iter().all(|b| b.id != BlockId::from("h")));
    assert!(reference.iter().any(|b| b.block_type == BlockType::Quote && b.content == "Q3"));
    for session in &sessions[1..] {
        assert_eq!(session.document().blocks(), reference.as_slice());
    }
}

#[test]
fn test_duplicate_and_reordered_delivery() {
    let bus = CollabBus::new(256);
    let mut tap = bus.subscribe();
    let clock = ManualClock::new(10_000);
    let mut ana = open(&bus, &clock, "ana");

    ana.handle(EditorIntent::Focus(BlockId::from("p"))).unwrap();
    ana.handle(EditorIntent::key(Key::Enter)).unwrap();
    ana.handle(EditorIntent::Input("late".into())).unwrap();
    clock.advance(1);
    ana.edit(|doc| doc.move_block(&BlockId::from("h"), 2)).unwrap();
    let events = mutations(&mut tap);
    assert!(events.len() >= 3);

    // Reverse order, every event twice
    let mut replica = ReplicatedPage::from_blocks(PageId::from("roadmap"), &page().content);
    for event in events.iter().rev() {
        replica.apply_event(event);
        assert!(!replica.apply_event(event));
    }
    assert_eq!(replica.render(), ana.document().blocks());
}

#[test]
fn test_messages_survive_json_transport() {
    let bus = CollabBus::new(256);
    let mut tap = bus.subscribe();
    let clock = ManualClock::new(10_000);
    let mut ana = open(&bus, &clock, "ana");

    ana.edit(|doc| {
        doc.update_content(
            &BlockId::from("p"),
            "Q3 goals",
            &BlockProperties::default(),
        )
    })
    .unwrap();

    // A second process sees the same events through JSON
    let other_bus = CollabBus::new(16);
    let mut ben = open(&other_bus, &clock, "ben");
    for event in mutations(&mut tap) {
        let json = CollabMessage::Mutation(event).to_json().unwrap();
        let decoded = CollabMessage::from_json(&json).unwrap();
        assert!(ben.apply_remote(&decoded).unwrap());
    }
    assert_eq!(ben.document().blocks(), ana.document().blocks());
}

#[tokio::test(start_paused = true)]
async fn test_file_backed_session_survives_save_failures() {
    let dir = tempfile::tempdir().unwrap();
    let files = FileStore::new(dir.path());
    files.save_page(&page()).await.unwrap();

    let bus = CollabBus::default();
    let clock = ManualClock::new(10_000);
    let mut ana = PageSession::load(
        Arc::new(files.clone()),
        &PageId::from("roadmap"),
        ActorContext::new("ana", "ws"),
        bus.clone(),
        CollabConfig::default(),
        Arc::new(clock.clone()),
    )
    .await
    .unwrap();

    ana.handle(EditorIntent::Focus(BlockId::from("p"))).unwrap();
    ana.handle(EditorIntent::Input("Q3 and Q4".into())).unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(ana.flush().await, Some(SaveStatus::Saved));

    let reloaded = files.load_page(&PageId::from("roadmap")).await.unwrap();
    assert_eq!(reloaded.content[1].content, "Q3 and Q4");

    // A store that is down keeps the edit locally
    let flaky = InMemoryStore::new();
    flaky.insert_page(reloaded).await;
    flaky.fail_next_saves(1_000);
    let mut ben = PageSession::load(
        Arc::new(flaky.clone()),
        &PageId::from("roadmap"),
        ActorContext::new("ben", "ws"),
        CollabBus::default(),
        CollabConfig::default(),
        Arc::new(clock),
    )
    .await
    .unwrap();
    ben.edit(|doc| doc.insert(2, BlockType::Paragraph, "offline")).unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(matches!(ben.save_status(), Some(SaveStatus::Unsaved { attempts: 5, .. })));
    assert_eq!(ben.document().blocks()[2].content, "offline");

    flaky.fail_next_saves(0);
    ben.retry_save();
    assert_eq!(ben.flush().await, Some(SaveStatus::Saved));
    assert_eq!(flaky.load_page(&PageId::from("roadmap")).await.unwrap().content.len(), 3);
}
