//! Line-oriented chat loop.
//!
//! Each line is sent to the actor as a message. Lines starting with `/` are
//! commands: `/status`, `/clear`, `/curate`, `/help`, `/quit`.

use tokio::io::{self, AsyncBufReadExt, BufReader};
use whisper_core::{DialogueRequest, DialogueResponse, ReplySource, WhisperService};

pub async fn run(service: &WhisperService, actor: &str, session: &str) -> anyhow::Result<()> {
    let name = service
        .orchestrator()
        .personas()
        .get(actor)
        .map(|p| p.display_name.clone())
        .unwrap_or_else(|| actor.to_string());

    println!("=== 與 {name} 對話 ===");
    println!("Session: {session}");
    print_commands();
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            match command.split_whitespace().next() {
                Some("quit") | Some("exit") => {
                    println!("再見！");
                    break;
                }
                Some("status") => {
                    let status = service.status();
                    println!(
                        "[STATUS] cache: {}, sessions: {}, personas: {}, shared: {}, prompts: {:?}",
                        status.cache_size,
                        status.sessions_active,
                        status.personas_loaded,
                        status.shared_cache_enabled,
                        status.prompt_richness
                    );
                }
                Some("clear") => {
                    service.clear_cache().await;
                    println!("[CLEARED] Reply cache emptied");
                }
                Some("curate") => match service.curate_session(session).await {
                    Ok(candidates) if candidates.is_empty() => {
                        println!("[CURATE] Nothing worth remembering yet");
                    }
                    Ok(candidates) => {
                        for c in candidates {
                            println!(
                                "[CURATE] {:.2} {} ({:?})",
                                c.importance_score, c.summary, c.source
                            );
                        }
                    }
                    Err(e) => println!("[ERROR] {e}"),
                },
                Some("help") => print_commands(),
                _ => println!("[ERROR] Unknown command: /{command}"),
            }
            continue;
        }

        let request = DialogueRequest::new(actor, line).with_session(session);
        match service.generate(request).await {
            Ok(response) => print_reply(&name, &response),
            Err(e) => println!("[ERROR] {e}"),
        }
    }

    Ok(())
}

fn print_reply(name: &str, response: &DialogueResponse) {
    let marker = match &response.source {
        ReplySource::LocalCache | ReplySource::SharedCache => " [cached]",
        ReplySource::Fallback { .. } => " [fallback]",
        ReplySource::Generated => "",
    };
    println!("{name}：{}", response.reply);
    println!("  ({} ms{marker})", response.elapsed_ms);
}

fn print_commands() {
    println!("Commands:");
    println!("  /status  - Show cache and session counts");
    println!("  /clear   - Empty the reply cache");
    println!("  /curate  - Pick memories from this conversation");
    println!("  /quit    - Exit");
}
