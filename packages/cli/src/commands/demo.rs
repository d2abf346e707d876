use crate::config::Config;
use anyhow::Result;
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use folio_editor::{EditorIntent, Key};
use folio_model::{ActorContext, Block, BlockId, BlockType, Page, PageId, WorkspaceId};
use folio_workspace::{
    CollabBus, DocumentStore, FileStore, PageSession, PeerState, SaveStatus, SystemClock, WallClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Args)]
pub struct DemoArgs {
    /// Directory for the demo page (defaults to a temporary folder)
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    /// Name of the second actor
    #[arg(long, default_value = "ben")]
    pub peer: String,
}

/// Two actors edit one page over an in-process bus and save to disk
pub fn collab_demo(args: DemoArgs, cwd: &str, config: &Config) -> Result<()> {
    let root = match &args.store {
        Some(dir) => PathBuf::from(cwd).join(dir),
        None => std::env::temp_dir().join("folio-demo"),
    };
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(root, &config.default_actor, &args.peer, config))
}

fn block_line(block: &Block) -> String {
    let marker = match (block.block_type, block.properties.checked) {
        (BlockType::Checkbox, Some(true)) => "[x]".to_string(),
        (BlockType::Checkbox, _) => "[ ]".to_string(),
        (block_type, _) => format!("{:?}", block_type),
    };
    format!("{} {}", marker.dimmed(), block.content)
}

async fn join(
    store: &Arc<dyn DocumentStore>,
    page_id: &PageId,
    actor: &str,
    bus: &CollabBus,
    config: &Config,
    wall: &Arc<dyn WallClock>,
) -> Result<PageSession> {
    let context = ActorContext::new(actor, "demo").with_display_name(actor);
    let session = PageSession::load(
        store.clone(),
        page_id,
        context,
        bus.clone(),
        config.collab.clone(),
        wall.clone(),
    )
    .await?;
    Ok(session)
}

async fn run(root: PathBuf, first: &str, second: &str, config: &Config) -> Result<()> {
    println!("{}", "🤝 Folio collaboration demo".bright_blue().bold());
    println!("   Store: {}", root.display());
    println!();

    let store = FileStore::new(&root);
    let page_id = PageId::from("demo");
    let mut page = Page::new(page_id.clone(), "Launch plan", WorkspaceId::from("demo"), first, Utc::now());
    page.content = vec![
        Block::new(BlockId::from("title"), BlockType::Heading1, "Launch plan"),
        Block::new(BlockId::from("intro"), BlockType::Paragraph, "Draft"),
    ];
    store.save_page(&page).await?;

    let bus = CollabBus::new(config.collab.bus_capacity);
    let wall: Arc<dyn WallClock> = Arc::new(SystemClock);
    let store: Arc<dyn DocumentStore> = Arc::new(store);
    let mut a = join(&store, &page_id, first, &bus, config, &wall).await?;
    let mut b = join(&store, &page_id, second, &bus, config, &wall).await?;
    a.start_heartbeat();
    b.start_heartbeat();

    // Both type at the same time, into different places
    a.handle(EditorIntent::Focus(BlockId::from("intro")))?;
    a.handle(EditorIntent::Input("Ship the beta on Friday".into()))?;
    b.handle(EditorIntent::Focus(BlockId::from("title")))?;
    b.handle(EditorIntent::key(Key::Enter))?;
    b.handle(EditorIntent::Input("/".into()))?;
    b.handle(EditorIntent::Input("/to-do".into()))?;
    b.handle(EditorIntent::key(Key::Enter))?;
    b.handle(EditorIntent::Input("Write release notes".into()))?;

    let merged_a = a.drain_remote()?;
    let merged_b = b.drain_remote()?;
    info!(merged_a, merged_b, "Exchanged edits");

    for session in [&a, &b] {
        println!("{}", format!("{}'s view", session.actor()).bold());
        for block in session.document().blocks() {
            println!("   {}", block_line(block));
        }
        for peer in session.presence().peers() {
            let place = match &peer.state {
                PeerState::Active(cursor) => format!(
                    "in {} at {}",
                    cursor.block_id.as_ref().map(|id| id.as_str()).unwrap_or("-"),
                    cursor.position
                ),
                PeerState::Connected => "on the page".to_string(),
                PeerState::Disconnected => "away".to_string(),
            };
            println!("   {} {} is {}", "•".cyan(), peer.display_name, place);
        }
        println!();
    }

    let converged = a.document().blocks() == b.document().blocks();
    let status = a.close().await;
    let _ = b.close().await;

    if converged {
        println!("{} Both actors see the same page", "✓".green());
    } else {
        println!("{} Replicas diverged", "✗".red());
    }
    match status {
        Some(SaveStatus::Saved) => println!("{} Saved to {}", "✓".green(), root.display()),
        Some(other) => println!("{} Save status: {:?}", "⚠️".yellow(), other),
        None => {}
    }

    if !converged {
        anyhow::bail!("replicas diverged");
    }
    Ok(())
}
