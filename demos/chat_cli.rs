use chat_session_rs::{ClientIdentity, ConnectionState, SessionManager, SessionOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Interactive chat against a live backend.
///
/// Reads `CHAT_ENDPOINT`, `CHAT_USER_ID` and optionally `CHAT_USER_ROLES`
/// (comma separated) and `CHAT_CALL_TYPE` from the environment or `.env`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing, RUST_LOG overrides
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let endpoint = std::env::var("CHAT_ENDPOINT").expect("CHAT_ENDPOINT must be set in .env");
    let user_id = std::env::var("CHAT_USER_ID").expect("CHAT_USER_ID must be set in .env");
    let roles = std::env::var("CHAT_USER_ROLES").unwrap_or_default();
    let call_type = std::env::var("CHAT_CALL_TYPE").unwrap_or_else(|_| "chat".to_string());

    let identity = ClientIdentity::new(user_id)
        .with_roles(roles.split(',').map(str::trim).filter(|r| !r.is_empty()))
        .with_call_type(call_type);

    let manager = SessionManager::builder(&endpoint, identity)
        .options(SessionOptions::default())
        .build()?;

    println!("📡 Connecting to: {}", endpoint);
    println!("   trace id: {}\n", manager.trace_id());

    // Print inbound messages as they arrive
    let mut inbound = manager.messages();
    tokio::spawn(async move {
        while let Some(body) = inbound.recv().await {
            println!("⬅️  {}", String::from_utf8_lossy(&body));
        }
    });

    // Report state changes
    let mut states = manager.state_changes();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            match state {
                ConnectionState::Connected => println!("✅ Connected"),
                ConnectionState::Connecting => println!("⏳ Connecting..."),
                ConnectionState::Disconnected => println!("⚠️  Disconnected"),
                ConnectionState::Abandoned => println!("❌ Gave up reconnecting"),
            }
        }
    });

    manager.connect(None).await?;

    println!("Type a message and press enter. Ctrl-D or Ctrl-C to quit.\n");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => manager.publish(&serde_json::json!({ "question": line }))?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("\nDisconnecting...");
    let snapshot = manager.snapshot().await?;
    if snapshot.queued > 0 {
        println!("   {} payload(s) were never delivered", snapshot.queued);
    }
    manager.disconnect().await?;
    println!("Disconnected!");

    Ok(())
}
