//! Terminal chat with the town's NPCs.
//!
//! Run with:
//! ```bash
//! cargo run -p whisper -- --actor npc-1
//! ```
//!
//! Uses the Gemini HTTP API by default; pass `--cli` to shell out to the
//! `gemini` command instead.

mod repl;

use anyhow::{bail, Context};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use whisper_core::{
    CliBackend, GeminiBackend, GenerationBackend, InMemoryMemoryStore, JsonlMemoryStore,
    LongTermMemory, PersonaStore, PromptRichness, WhisperConfig, WhisperService,
};

const WARM_UP_MESSAGES: &[&str] = &["你好", "最近怎麼樣", "你喜歡什麼", "hello"];

/// Parsed command-line options.
#[derive(Debug)]
struct Options {
    actor: Option<String>,
    personas: PathBuf,
    session: Option<String>,
    memories: Option<PathBuf>,
    use_cli: bool,
    minimal: bool,
    warm_up: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let options = parse_args(&args);
    let Some(actor) = options.actor.clone() else {
        eprintln!("Error: --actor <ID> is required.");
        eprintln!("Run with --help for usage.");
        std::process::exit(2);
    };

    let mut config = WhisperConfig::from_env().context("reading WHISPER_* settings")?;
    if options.minimal {
        config = config.with_prompt_richness(PromptRichness::Minimal);
    }

    let personas = PersonaStore::load_dir(&options.personas)
        .await
        .with_context(|| format!("loading personas from {}", options.personas.display()))?;
    if !personas.contains(&actor) {
        bail!(
            "unknown actor {actor:?}; available: {}",
            personas.ids().join(", ")
        );
    }

    let backend: Arc<dyn GenerationBackend> = if options.use_cli {
        Arc::new(CliBackend::gemini_from_env())
    } else {
        match GeminiBackend::from_env() {
            Ok(backend) => Arc::new(backend),
            Err(_) => {
                eprintln!("Error: GEMINI_API_KEY environment variable not set.");
                eprintln!("Set it in .env, export it, or pass --cli to use the gemini command.");
                std::process::exit(1);
            }
        }
    };

    let memory: Arc<dyn LongTermMemory> = match &options.memories {
        Some(dir) => Arc::new(JsonlMemoryStore::new(dir)),
        None => Arc::new(InMemoryMemoryStore::new()),
    };

    let service = WhisperService::local(config, personas, backend, memory);

    if options.warm_up {
        let warmed = service.warm_up(WARM_UP_MESSAGES).await;
        println!("[warm-up] {warmed} replies cached");
    }

    let session = options
        .session
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    repl::run(&service, &actor, &session).await
}

fn parse_args(args: &[String]) -> Options {
    let mut options = Options {
        actor: None,
        personas: PathBuf::from("personas"),
        session: None,
        memories: None,
        use_cli: false,
        minimal: false,
        warm_up: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--actor" => {
                if let Some(actor) = args.get(i + 1) {
                    options.actor = Some(actor.clone());
                    i += 1;
                }
            }
            "--personas" => {
                if let Some(dir) = args.get(i + 1) {
                    options.personas = PathBuf::from(dir);
                    i += 1;
                }
            }
            "--session" => {
                if let Some(id) = args.get(i + 1) {
                    options.session = Some(id.clone());
                    i += 1;
                }
            }
            "--memories" => {
                if let Some(dir) = args.get(i + 1) {
                    options.memories = Some(PathBuf::from(dir));
                    i += 1;
                }
            }
            "--cli" => options.use_cli = true,
            "--minimal" => options.minimal = true,
            "--warm-up" => options.warm_up = true,
            other => eprintln!("Ignoring unknown argument: {other}"),
        }
        i += 1;
    }

    options
}

fn print_help() {
    println!("whisper - chat with the town's NPCs");
    println!();
    println!("USAGE:");
    println!("  whisper --actor <ID> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help           Show this help message");
    println!("  --actor <ID>         Actor to talk to, e.g. npc-1");
    println!("  --personas <DIR>     Directory of persona JSON files (default: personas)");
    println!("  --session <ID>       Session id to use (default: random)");
    println!("  --memories <DIR>     Append curated memories to <DIR>/<actor>.jsonl");
    println!("  --cli                Use the gemini command instead of the HTTP API");
    println!("  --minimal            Use short prompts for faster replies");
    println!("  --warm-up            Pre-generate replies to common greetings");
    println!();
    println!("ENVIRONMENT:");
    println!("  GEMINI_API_KEY       API key for Gemini");
    println!("  WHISPER_*            Service settings (see WhisperConfig::from_env)");
    println!("  RUST_LOG             Log filter, e.g. whisper_core=debug");
    println!();
    println!("EXAMPLES:");
    println!("  whisper --actor npc-1");
    println!("  whisper --actor npc-2 --personas whisper/personas --cli --minimal");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("whisper")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_defaults() {
        let options = parse_args(&args(&[]));
        assert!(options.actor.is_none());
        assert_eq!(options.personas, PathBuf::from("personas"));
        assert!(!options.use_cli && !options.minimal && !options.warm_up);
    }

    #[test]
    fn test_parse_all_flags() {
        let options = parse_args(&args(&[
            "--actor", "npc-2", "--personas", "p", "--session", "s1", "--memories", "m",
            "--cli", "--minimal", "--warm-up",
        ]));
        assert_eq!(options.actor.as_deref(), Some("npc-2"));
        assert_eq!(options.personas, PathBuf::from("p"));
        assert_eq!(options.session.as_deref(), Some("s1"));
        assert_eq!(options.memories, Some(PathBuf::from("m")));
        assert!(options.use_cli && options.minimal && options.warm_up);
    }

    #[tokio::test]
    async fn test_shipped_personas_load() {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("personas");
        let personas = PersonaStore::load_dir(&dir).await.unwrap();
        assert_eq!(personas.ids(), vec!["npc-1", "npc-2", "npc-3"]);
        for id in personas.ids() {
            let profile = personas.get(&id).unwrap();
            assert!(!profile.fallback_lines.is_empty(), "{id} has no fallback lines");
        }
    }
}
